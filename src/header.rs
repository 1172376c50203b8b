//! Front-matter parsing and the metadata merge.
//!
//! The merge owns exactly four header keys and nothing else: every other field
//! passes through untouched, whatever its shape. The four owned keys are fully
//! overwritten on each run — there is no partial merge within them.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::gate::Validated;
use crate::lexicon::Lexicon;
use crate::vault::StreamType;

/// Header keys written (and fully overwritten) by the engine.
pub const OWNED_KEYS: [&str; 4] = [
    "glyphstream",
    "glyph_metadata",
    "last_processed",
    "stream_type",
];

/// Errors from header parsing and serialization.
#[derive(Debug, Error, Diagnostic)]
pub enum HeaderError {
    #[error("corrupt front matter in \"{doc}\": {reason}")]
    #[diagnostic(
        code(scribe::header::corrupt),
        help(
            "The YAML front matter could not be parsed as a mapping. The document \
             is skipped and nothing is written, so the existing data is untouched."
        )
    )]
    Corrupt { doc: String, reason: String },

    #[error("failed to serialize header for \"{doc}\": {message}")]
    #[diagnostic(
        code(scribe::header::serialize),
        help("A header value could not be rendered back to YAML. This is a bug; please report it.")
    )]
    Serialize { doc: String, message: String },
}

/// Split a raw note into (header mapping, body).
///
/// A note with no opening `---` fence has an empty header. A fence that never
/// closes, or front matter that is valid YAML but not a mapping, is corrupt.
pub fn parse_note(raw: &str, doc: &str) -> Result<(Mapping, String), HeaderError> {
    let Some(after) = raw.strip_prefix("---") else {
        return Ok((Mapping::new(), raw.to_string()));
    };
    let Some(after) = after.strip_prefix('\n') else {
        // "---something" is ordinary first-line text, not a fence.
        return Ok((Mapping::new(), raw.to_string()));
    };

    let Some((yaml, body)) = split_closing_fence(after) else {
        return Err(HeaderError::Corrupt {
            doc: doc.to_string(),
            reason: "front-matter fence is never closed".into(),
        });
    };

    let header = parse_mapping(yaml, doc)?;
    Ok((header, body.to_string()))
}

/// Find the closing `---` fence. Returns (yaml text, body after the fence).
fn split_closing_fence(after: &str) -> Option<(&str, &str)> {
    // Degenerate case: the fence closes immediately (empty front matter).
    if let Some(rest) = after.strip_prefix("---") {
        if rest.is_empty() {
            return Some(("", ""));
        }
        if let Some(body) = rest.strip_prefix('\n') {
            return Some(("", body));
        }
    }

    let mut search = 0;
    while let Some(pos) = after[search..].find("\n---") {
        let abs = search + pos;
        let tail = &after[abs + 4..];
        if tail.is_empty() {
            return Some((&after[..abs + 1], ""));
        }
        if let Some(body) = tail.strip_prefix('\n') {
            return Some((&after[..abs + 1], body));
        }
        // A line like "----": not a fence, keep searching.
        search = abs + 4;
    }
    None
}

fn parse_mapping(yaml: &str, doc: &str) -> Result<Mapping, HeaderError> {
    let value: Value = serde_yaml::from_str(yaml).map_err(|e| HeaderError::Corrupt {
        doc: doc.to_string(),
        reason: e.to_string(),
    })?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(m) => Ok(m),
        other => Err(HeaderError::Corrupt {
            doc: doc.to_string(),
            reason: format!("front matter is not a mapping (found {})", kind_of(&other)),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// Merge a validated result into an existing header.
///
/// Pure function: the input mapping is cloned, fields outside [`OWNED_KEYS`]
/// are carried over bit-identical, and the four owned keys are overwritten
/// with freshly computed values.
pub fn merge(
    existing: &Mapping,
    validated: &Validated,
    lexicon: &Lexicon,
    stream: StreamType,
    processed_at: DateTime<Utc>,
) -> Mapping {
    let mut header = existing.clone();

    let glyphstream: Vec<Value> = validated
        .glyphs
        .iter()
        .map(|g| Value::String(g.symbol.clone()))
        .collect();

    let mut metadata = Mapping::new();
    for glyph in &validated.glyphs {
        let Some(def) = lexicon.get(&glyph.symbol) else {
            continue;
        };
        let mut entry = Mapping::new();
        entry.insert("name".into(), Value::String(def.name.clone()));
        entry.insert(
            "meanings".into(),
            Value::Sequence(def.meanings.iter().cloned().map(Value::String).collect()),
        );
        entry.insert(
            "archetypes".into(),
            Value::Sequence(def.archetypes.iter().cloned().map(Value::String).collect()),
        );
        entry.insert("rationale".into(), Value::String(glyph.rationale.clone()));
        metadata.insert(Value::String(glyph.symbol.clone()), Value::Mapping(entry));
    }

    header.insert("glyphstream".into(), Value::Sequence(glyphstream));
    header.insert("glyph_metadata".into(), Value::Mapping(metadata));
    header.insert(
        "last_processed".into(),
        Value::String(processed_at.to_rfc3339()),
    );
    header.insert(
        "stream_type".into(),
        Value::String(stream.as_str().to_string()),
    );
    header
}

/// Render a header + body back into note text.
pub fn render(header: &Mapping, body: &str, doc: &str) -> Result<String, HeaderError> {
    let yaml = serde_yaml::to_string(header).map_err(|e| HeaderError::Serialize {
        doc: doc.to_string(),
        message: e.to_string(),
    })?;
    Ok(format!("---\n{yaml}---\n\n{}\n", body.trim()))
}
