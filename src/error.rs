//! Top-level diagnostic error type for the glyphscribe engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives
//! (error codes, help text, source chains); this module wraps them into one
//! enum so callers can hold a single error type without losing the diagnostics.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the glyphscribe engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum ScribeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lexicon(#[from] crate::lexicon::LexiconError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] crate::llm::LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Prompt(#[from] crate::prompt::PromptError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Response(#[from] crate::response::ResponseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Header(#[from] crate::header::HeaderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Vault(#[from] crate::vault::VaultError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] crate::engine::EngineError),
}

/// Convenience alias for functions returning glyphscribe results.
pub type ScribeResult<T> = std::result::Result<T, ScribeError>;
