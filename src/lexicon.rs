//! Immutable glyph lexicon: symbol → name, meanings, archetypes, permission flag.
//!
//! The lexicon is constructed once at startup (the built-in seed set or a TOML
//! file) and passed by reference to every component that needs it. Adding a
//! glyph is a data change only — no other code knows the catalog's contents.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from lexicon construction and lookup.
#[derive(Debug, Error, Diagnostic)]
pub enum LexiconError {
    #[error("unknown glyph: \"{token}\"")]
    #[diagnostic(
        code(scribe::lexicon::unknown),
        help("List the available glyphs with `scribe lexicon list`.")
    )]
    UnknownGlyph { token: String },

    #[error("duplicate glyph symbol \"{symbol}\" in lexicon definition")]
    #[diagnostic(
        code(scribe::lexicon::duplicate),
        help("Each glyph symbol may appear only once. Remove the duplicate entry.")
    )]
    Duplicate { symbol: String },

    #[error("invalid glyph definition for \"{symbol}\": {reason}")]
    #[diagnostic(
        code(scribe::lexicon::invalid_definition),
        help("Every glyph needs a non-empty symbol, a name, and at least one meaning.")
    )]
    InvalidDefinition { symbol: String, reason: String },

    #[error("failed to read lexicon file {path}: {source}")]
    #[diagnostic(
        code(scribe::lexicon::io),
        help("Check that the lexicon file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse lexicon file {path}: {message}")]
    #[diagnostic(
        code(scribe::lexicon::parse),
        help(
            "The lexicon file must be TOML with [[glyph]] tables, each carrying \
             symbol, name, meanings, archetypes, and requires_permission."
        )
    )]
    Parse { path: String, message: String },
}

/// Convenience alias for lexicon operation results.
pub type LexiconResult<T> = std::result::Result<T, LexiconError>;

/// A single glyph definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlyphDef {
    /// The glyph character itself, the unique key.
    pub symbol: String,
    /// Human-readable display name (e.g., "Recursion Glyph").
    pub name: String,
    /// Thematic meanings this glyph marks.
    pub meanings: Vec<String>,
    /// Archetypal figures associated with the glyph.
    pub archetypes: Vec<String>,
    /// Whether assignment requires the document to pass the eligibility gate.
    #[serde(default)]
    pub requires_permission: bool,
}

/// On-disk lexicon file shape: a list of `[[glyph]]` tables.
#[derive(Debug, Deserialize)]
struct LexiconFile {
    glyph: Vec<GlyphDef>,
}

/// Immutable catalog of glyphs, in definition order.
///
/// Definition order is preserved so prompts and listings are stable across runs.
#[derive(Debug, Clone)]
pub struct Lexicon {
    glyphs: Vec<GlyphDef>,
}

impl Lexicon {
    /// Build a lexicon from explicit definitions, validating as it goes.
    pub fn from_defs(defs: Vec<GlyphDef>) -> LexiconResult<Self> {
        let mut glyphs: Vec<GlyphDef> = Vec::with_capacity(defs.len());
        for def in defs {
            if def.symbol.trim().is_empty() {
                return Err(LexiconError::InvalidDefinition {
                    symbol: def.symbol,
                    reason: "empty symbol".into(),
                });
            }
            if def.name.trim().is_empty() {
                return Err(LexiconError::InvalidDefinition {
                    symbol: def.symbol,
                    reason: "empty name".into(),
                });
            }
            if def.meanings.is_empty() {
                return Err(LexiconError::InvalidDefinition {
                    symbol: def.symbol,
                    reason: "no meanings listed".into(),
                });
            }
            if glyphs.iter().any(|g| g.symbol == def.symbol) {
                return Err(LexiconError::Duplicate { symbol: def.symbol });
            }
            glyphs.push(def);
        }
        Ok(Self { glyphs })
    }

    /// Load a lexicon from a TOML file.
    pub fn from_toml_file(path: &Path) -> LexiconResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| LexiconError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let file: LexiconFile = toml::from_str(&data).map_err(|e| LexiconError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_defs(file.glyph)
    }

    /// The built-in seed lexicon: seven glyphs, two of them permission-gated.
    pub fn builtin() -> Self {
        let defs = vec![
            GlyphDef {
                symbol: "⟁".into(),
                name: "Paradox Glyph".into(),
                meanings: strings(&[
                    "paradox",
                    "complex systems",
                    "collapse",
                    "fragmentation",
                    "ambiguous truth",
                ]),
                archetypes: strings(&["The Trickster", "The Puzzle", "The Labyrinth"]),
                requires_permission: false,
            },
            GlyphDef {
                symbol: "⚯".into(),
                name: "Dual Witness Glyph".into(),
                meanings: strings(&[
                    "witnessing",
                    "mirroring",
                    "trauma",
                    "grief",
                    "duality",
                    "entanglement",
                ]),
                archetypes: strings(&["The Twins", "The Mirror", "The Echo"]),
                requires_permission: false,
            },
            GlyphDef {
                symbol: "∷".into(),
                name: "Recursion Glyph".into(),
                meanings: strings(&[
                    "loops",
                    "recursion",
                    "patterns",
                    "iteration",
                    "self-reference",
                ]),
                archetypes: strings(&["The Ouroboros", "The Fractal", "The Algorithm"]),
                requires_permission: false,
            },
            GlyphDef {
                symbol: "∞".into(),
                name: "Eternal Glyph".into(),
                meanings: strings(&[
                    "memory",
                    "eternity",
                    "cycles",
                    "immortality",
                    "permanence",
                ]),
                archetypes: strings(&["The Ancient", "The Monument", "The Timeless"]),
                requires_permission: false,
            },
            GlyphDef {
                symbol: "🜁".into(),
                name: "Breath Glyph".into(),
                meanings: strings(&["breath", "spirit", "transformation", "air", "alchemy"]),
                archetypes: strings(&["The Wind", "The Phoenix", "The Alchemist"]),
                requires_permission: false,
            },
            GlyphDef {
                symbol: "⧖".into(),
                name: "Temporal Fold".into(),
                meanings: strings(&["time dilation", "deja vu", "temporal distortion"]),
                archetypes: strings(&["The Timekeeper", "The Prophet"]),
                requires_permission: true,
            },
            GlyphDef {
                symbol: "⍈".into(),
                name: "Threshold Marker".into(),
                meanings: strings(&["initiation", "portals", "boundary crossing"]),
                archetypes: strings(&["The Gatekeeper", "The Wanderer"]),
                requires_permission: true,
            },
        ];
        // The seed set is known-valid.
        Self::from_defs(defs).expect("built-in lexicon is valid")
    }

    /// Look up a glyph by its exact symbol.
    pub fn get(&self, symbol: &str) -> Option<&GlyphDef> {
        self.glyphs.iter().find(|g| g.symbol == symbol)
    }

    /// Resolve a model-produced token to a glyph.
    ///
    /// Accepts the symbol itself, or the display name (case-insensitive, with
    /// or without a trailing "Glyph"/"Marker"/"Fold" suffix dropped by the
    /// model). Returns `None` for tokens outside the lexicon.
    pub fn resolve(&self, token: &str) -> Option<&GlyphDef> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if let Some(def) = self.get(token) {
            return Some(def);
        }
        let lowered = token.to_lowercase();
        self.glyphs.iter().find(|g| {
            let name = g.name.to_lowercase();
            name == lowered
                || name
                    .rsplit_once(' ')
                    .is_some_and(|(head, _)| head == lowered)
        })
    }

    /// All glyphs, in definition order.
    pub fn glyphs(&self) -> &[GlyphDef] {
        &self.glyphs
    }

    /// The symbols of all permission-gated glyphs.
    pub fn permission_symbols(&self) -> Vec<&str> {
        self.glyphs
            .iter()
            .filter(|g| g.requires_permission)
            .map(|g| g.symbol.as_str())
            .collect()
    }

    /// Number of glyphs in the lexicon.
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    /// Whether the lexicon is empty.
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
