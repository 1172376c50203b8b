//! Prompt construction: glyph catalog + assignment rules + output grammar.
//!
//! The prompt is the only thing the model ever sees, so everything the parser
//! later relies on — the catalog, the caps, the exact line grammar — is spelled
//! out here. Building a prompt has no side effects.

use miette::Diagnostic;
use thiserror::Error;

use crate::lexicon::Lexicon;
use crate::vault::StreamType;

/// Notes shorter than this are skipped without calling the model.
pub const MIN_CONTENT_CHARS: usize = 50;

/// Only this many leading characters of a note are sent to the model.
pub const MAX_CONTENT_CHARS: usize = 3000;

/// Errors from prompt construction.
#[derive(Debug, Error, Diagnostic)]
pub enum PromptError {
    #[error("document too short to analyze: {chars} chars (minimum {minimum})")]
    #[diagnostic(
        code(scribe::prompt::empty_document),
        help("Very short notes carry too little signal for glyph assignment and are skipped.")
    )]
    EmptyDocument { chars: usize, minimum: usize },
}

/// Render the full instruction prompt for one note.
///
/// Fails only when the content is below [`MIN_CONTENT_CHARS`]; the caller
/// skips the document instead of sending it to the model.
pub fn build_prompt(
    content: &str,
    lexicon: &Lexicon,
    stream: StreamType,
) -> Result<String, PromptError> {
    let trimmed = content.trim();
    let chars = trimmed.chars().count();
    if chars < MIN_CONTENT_CHARS {
        return Err(PromptError::EmptyDocument {
            chars,
            minimum: MIN_CONTENT_CHARS,
        });
    }

    let excerpt = truncate_chars(trimmed, MAX_CONTENT_CHARS);

    let mut catalog = String::new();
    for glyph in lexicon.glyphs() {
        catalog.push_str(&format!(
            "{} ({}): {} | archetypes: {}",
            glyph.symbol,
            glyph.name,
            glyph.meanings.join(", "),
            glyph.archetypes.join(", "),
        ));
        if glyph.requires_permission {
            catalog.push_str(" [REQUIRES PERMISSION]");
        }
        catalog.push('\n');
    }

    let stream_rule = match stream {
        StreamType::Personal => "This entry is a personal stream: select at most 3 glyphs.",
        StreamType::Shared => {
            "This entry is a shared stream: select at most 7 glyphs, at most 3 of them \
             non-permission, and include at least one permission glyph if the entry qualifies."
        }
    };

    Ok(format!(
        "You assign symbolic glyphs to a journal entry.\n\
         \n\
         Available glyphs:\n\
         {catalog}\
         \n\
         Rules:\n\
         - {stream_rule}\n\
         - A glyph marked [REQUIRES PERMISSION] may only be chosen when the entry itself \
         exhibits shared-trauma language, an explicit threshold or rite-of-passage narrative, \
         or non-linear time references. These claims are independently re-checked.\n\
         - Choose only glyphs from the catalog above.\n\
         \n\
         Respond with one line per chosen glyph, in order of relevance, and nothing else:\n\
         GLYPH <symbol> :: <one-sentence rationale>\n\
         For a permission glyph, append the qualifying condition in brackets before the '::', \
         e.g. GLYPH ⧖ [qualifies: non-linear time] :: <rationale>\n\
         \n\
         Journal entry:\n\
         \n\
         {excerpt}\n"
    ))
}

/// Truncate to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
