//! Response parsing: model completion text → candidate glyph assignment.
//!
//! The parser is a strict grammar decoder with two explicitly bounded
//! tolerances, not a best-effort scraper:
//!
//! 1. `GLYPH <symbol> :: <rationale>` lines, allowing leading bullets or
//!    numbering, a missing `GLYPH` keyword, an optional `[qualifies: ...]`
//!    claim before the `::`, and a display name in place of the symbol.
//! 2. Fallback: a bare delimited glyph list (commas or newlines) where *every*
//!    token resolves to a lexicon glyph. Anything less regular is rejected.
//!
//! Unknown glyphs are dropped with a warning rather than failing the document;
//! a completion with no recognizable grammar at all is an `UnparsableResponse`.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lexicon::Lexicon;

/// Maximum number of non-permission glyphs in any assignment.
pub const MAX_FREE_GLYPHS: usize = 3;

/// Errors from response parsing.
#[derive(Debug, Error, Diagnostic)]
pub enum ResponseError {
    #[error("no recognizable glyph grammar in completion: \"{preview}\"")]
    #[diagnostic(
        code(scribe::response::unparsable),
        help(
            "The model did not produce any 'GLYPH <symbol> :: <rationale>' line \
             or a bare glyph list. The document is retried a bounded number of \
             times, then skipped."
        )
    )]
    Unparsable { preview: String },
}

/// A rule violation detected and auto-corrected during parsing or gating.
///
/// Violations are not errors: the result is corrected (truncated, emptied) and
/// the violation travels with it into the ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintViolation {
    /// The model proposed more non-permission glyphs than allowed.
    TooManyCandidates { proposed: usize, kept: usize },
    /// The validated result exceeded the stream's total glyph cap.
    StreamCapExceeded {
        stream: String,
        proposed: usize,
        kept: usize,
    },
    /// A shared stream ended up with no permission glyph after gating.
    SharedStreamWithoutPermissionGlyph,
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyCandidates { proposed, kept } => {
                write!(f, "proposed {proposed} non-permission glyphs, kept {kept}")
            }
            Self::StreamCapExceeded {
                stream,
                proposed,
                kept,
            } => write!(f, "{stream} stream cap exceeded: {proposed} glyphs, kept {kept}"),
            Self::SharedStreamWithoutPermissionGlyph => {
                write!(f, "shared stream carries no permission glyph")
            }
        }
    }
}

/// One glyph proposed by the model, before validation.
#[derive(Debug, Clone)]
pub struct CandidateGlyph {
    /// Lexicon symbol (always resolved, never a raw model token).
    pub symbol: String,
    /// The model's free-text rationale for this glyph.
    pub rationale: String,
    /// The model's self-claimed qualifying condition, if any. Advisory only.
    pub claim: Option<String>,
}

/// The model's proposed assignment for one document, after decoding.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    /// Proposed glyphs in model-stated order, deduplicated, capped.
    pub glyphs: Vec<CandidateGlyph>,
    /// Rule violations detected and corrected during decoding.
    pub violations: Vec<ConstraintViolation>,
    /// Model tokens that did not resolve to any lexicon glyph.
    pub dropped: Vec<String>,
}

/// Decode a raw completion into a [`Candidate`].
pub fn parse_completion(raw: &str, lexicon: &Lexicon) -> Result<Candidate, ResponseError> {
    let mut candidate = Candidate::default();
    let mut saw_grammar_line = false;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((head, rationale)) = line.split_once("::") else {
            continue;
        };
        saw_grammar_line = true;

        let (token, claim) = split_claim(strip_line_decoration(head));
        match lexicon.resolve(&token) {
            Some(def) => push_glyph(
                &mut candidate,
                def.symbol.clone(),
                rationale.trim().to_string(),
                claim,
            ),
            None => {
                tracing::warn!(token = %token, "dropping glyph not present in lexicon");
                candidate.dropped.push(token);
            }
        }
    }

    // Fallback: a bare delimited glyph list, every token a lexicon glyph.
    if !saw_grammar_line {
        if let Some(symbols) = parse_bare_list(raw, lexicon) {
            for symbol in symbols {
                push_glyph(&mut candidate, symbol, String::new(), None);
            }
            saw_grammar_line = !candidate.glyphs.is_empty();
        }
    }

    if !saw_grammar_line {
        return Err(ResponseError::Unparsable {
            preview: preview(raw),
        });
    }

    enforce_free_cap(&mut candidate, lexicon);
    Ok(candidate)
}

/// Append a glyph unless its symbol was already proposed (first occurrence wins).
fn push_glyph(candidate: &mut Candidate, symbol: String, rationale: String, claim: Option<String>) {
    if candidate.glyphs.iter().any(|g| g.symbol == symbol) {
        tracing::debug!(symbol = %symbol, "ignoring duplicate glyph proposal");
        return;
    }
    candidate.glyphs.push(CandidateGlyph {
        symbol,
        rationale,
        claim,
    });
}

/// Truncate non-permission glyphs beyond [`MAX_FREE_GLYPHS`], in model order.
fn enforce_free_cap(candidate: &mut Candidate, lexicon: &Lexicon) {
    let is_free = |symbol: &str| {
        lexicon
            .get(symbol)
            .is_some_and(|def| !def.requires_permission)
    };
    let proposed = candidate
        .glyphs
        .iter()
        .filter(|g| is_free(&g.symbol))
        .count();
    if proposed <= MAX_FREE_GLYPHS {
        return;
    }

    let mut kept = 0usize;
    candidate.glyphs.retain(|g| {
        if !is_free(&g.symbol) {
            return true;
        }
        kept += 1;
        kept <= MAX_FREE_GLYPHS
    });
    candidate.violations.push(ConstraintViolation::TooManyCandidates {
        proposed,
        kept: MAX_FREE_GLYPHS,
    });
}

/// Strip bullets, numbering, and the optional GLYPH keyword from a line head.
fn strip_line_decoration(head: &str) -> &str {
    let mut rest = head.trim();
    rest = rest.trim_start_matches(['-', '*', '•', '>']).trim_start();
    // Numbered lists: "1." or "1)".
    if let Some(stripped) = rest
        .split_once(['.', ')'])
        .filter(|(num, _)| !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()))
        .map(|(_, tail)| tail)
    {
        rest = stripped.trim_start();
    }
    let lowered = rest.to_lowercase();
    if let Some(tail) = lowered.strip_prefix("glyph") {
        // Keep the keyword only if it is part of a display name ("Recursion Glyph"
        // never *starts* with it, so a leading "glyph" is always the marker).
        if tail.starts_with([' ', ':', '\t']) || tail.is_empty() {
            rest = rest[5..].trim_start_matches([':', ' ', '\t']);
        }
    }
    rest.trim()
}

/// Split an optional `[qualifies: ...]` claim off the token.
fn split_claim(token: &str) -> (String, Option<String>) {
    let Some(open) = token.find('[') else {
        return (clean_token(token), None);
    };
    let close = token[open..].find(']').map(|i| open + i);
    let content = match close {
        Some(close) => token[open + 1..close].trim(),
        None => token[open + 1..].trim(),
    };
    // "[qualifies: non-linear time]" → "non-linear time".
    let claim = match content.to_lowercase().strip_prefix("qualifies") {
        Some(_) => content["qualifies".len()..].trim_start_matches([':', ' ']).trim(),
        None => content,
    }
    .to_string();
    let mut bare = token[..open].to_string();
    if let Some(close) = close {
        bare.push_str(&token[close + 1..]);
    }
    let claim = if claim.is_empty() { None } else { Some(claim) };
    (clean_token(&bare), claim)
}

/// Trim surrounding quotes and stray punctuation from a glyph token.
fn clean_token(token: &str) -> String {
    token
        .trim()
        .trim_matches(['"', '\'', '`', '.', ',', ':', ';'])
        .trim()
        .to_string()
}

/// Try to read the completion as a bare glyph list. All tokens must resolve.
fn parse_bare_list(raw: &str, lexicon: &Lexicon) -> Option<Vec<String>> {
    let mut symbols = Vec::new();
    for token in raw.split([',', '\n']) {
        let token = clean_token(strip_line_decoration(token));
        if token.is_empty() {
            continue;
        }
        let def = lexicon.resolve(&token)?;
        symbols.push(def.symbol.clone());
    }
    if symbols.is_empty() { None } else { Some(symbols) }
}

/// First line of the completion, bounded, for error messages.
fn preview(raw: &str) -> String {
    let first = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut p: String = first.chars().take(60).collect();
    if first.chars().count() > 60 {
        p.push('…');
    }
    p
}
