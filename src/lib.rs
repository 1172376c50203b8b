// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # glyphscribe
//!
//! A glyph decision engine for journal vaults: assigns symbolic tags ("glyphs")
//! from a fixed lexicon to markdown notes using a locally hosted LLM, constrains
//! and re-validates the model's proposal with engine-owned rules, merges the
//! result into each note's YAML front-matter, and records every decision in an
//! append-only ledger.
//!
//! ## Architecture
//!
//! - **Lexicon** (`lexicon`): immutable glyph catalog, built-in or TOML-defined
//! - **Completion provider** (`llm`): Ollama REST client behind a provider trait
//! - **Prompt builder** (`prompt`): catalog + rules + output grammar in one prompt
//! - **Response parser** (`response`): strict grammar decoder with bounded tolerance
//! - **Permission gate** (`gate`): content-based eligibility rules the model
//!   cannot talk its way past
//! - **Metadata merger** (`header`): front-matter merge that never touches
//!   fields it doesn't own
//! - **Ledger** (`ledger`): append-only JSONL audit trail, one record per pass
//! - **Engine** (`engine`): sequential per-note orchestration with a per-note
//!   error boundary
//!
//! ## Library usage
//!
//! ```no_run
//! use glyphscribe::engine::{Engine, EngineConfig};
//! use glyphscribe::lexicon::Lexicon;
//! use glyphscribe::llm::{OllamaClient, OllamaConfig};
//!
//! let lexicon = Lexicon::builtin();
//! let mut client = OllamaClient::new(OllamaConfig::default());
//! client.probe();
//! let config = EngineConfig::new("/path/to/vault".into());
//! let engine = Engine::new(lexicon, Box::new(client), config);
//! let summary = engine.process_vault().unwrap();
//! println!("{} notes updated", summary.updated);
//! ```

pub mod engine;
pub mod error;
pub mod gate;
pub mod header;
pub mod ledger;
pub mod lexicon;
pub mod llm;
pub mod prompt;
pub mod response;
pub mod vault;
