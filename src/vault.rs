//! Document source: enumerating, reading, and writing vault notes.
//!
//! A vault is a directory tree of markdown notes. Enumeration is a sorted
//! recursive walk so every run visits documents in the same order. Writes go
//! through a temp-file-and-rename so an interrupted run never leaves a note
//! half-written.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::header::{self, HeaderError};

/// Errors from vault operations.
#[derive(Debug, Error, Diagnostic)]
pub enum VaultError {
    #[error("vault root {path} is not a directory")]
    #[diagnostic(
        code(scribe::vault::bad_root),
        help("Point --vault at the directory containing your markdown notes.")
    )]
    BadRoot { path: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(scribe::vault::io),
        help("Check file permissions and that the vault is on a writable filesystem.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Header(#[from] HeaderError),
}

/// Convenience alias for vault operation results.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

/// Whether a note belongs to a personal or shared stream.
///
/// Shared streams are marked by the author with a `shared_experience` tag in
/// the note's existing header; everything else is personal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Personal,
    Shared,
}

impl StreamType {
    /// Classification label written to the `stream_type` header key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Shared => "shared",
        }
    }

    /// Classify a note from its existing header.
    pub fn of_header(header: &Mapping) -> Self {
        if header_tags(header)
            .iter()
            .any(|t| t == "shared_experience")
        {
            Self::Shared
        } else {
            Self::Personal
        }
    }
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read the `tags` header field, tolerating a sequence or a comma-separated string.
fn header_tags(header: &Mapping) -> Vec<String> {
    match header.get("tags") {
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// One note loaded from the vault.
#[derive(Debug, Clone)]
pub struct Note {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Vault-relative identifier used in the ledger.
    pub id: String,
    /// Parsed front-matter header (empty mapping if the note has none).
    pub header: Mapping,
    /// Note body without the front matter.
    pub body: String,
}

impl Note {
    /// The note's stream classification.
    pub fn stream_type(&self) -> StreamType {
        StreamType::of_header(&self.header)
    }

    /// Content fingerprint: SHA-256 of the trimmed body, hex-encoded.
    ///
    /// The body is trimmed so that whitespace normalization during a header
    /// rewrite does not change the fingerprint.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.body)
    }
}

/// SHA-256 hex fingerprint of trimmed note content.
pub fn fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.trim().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Enumerate all markdown notes under the root, sorted by path.
///
/// Hidden files and directories (leading `.`) are skipped, as is anything
/// without a `.md` extension.
pub fn walk_vault(root: &Path) -> VaultResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(VaultError::BadRoot {
            path: root.display().to_string(),
        });
    }
    let mut notes = Vec::new();
    walk_dir(root, &mut notes)?;
    notes.sort();
    Ok(notes)
}

fn walk_dir(dir: &Path, notes: &mut Vec<PathBuf>) -> VaultResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| VaultError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            walk_dir(&path, notes)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            notes.push(path);
        }
    }
    Ok(())
}

/// Load a note from disk, parsing its front matter.
pub fn read_note(root: &Path, path: &Path) -> VaultResult<Note> {
    let raw = std::fs::read_to_string(path).map_err(|e| VaultError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let id = note_id(root, path);
    let (header, body) = header::parse_note(&raw, &id)?;
    Ok(Note {
        path: path.to_path_buf(),
        id,
        header,
        body,
    })
}

/// Vault-relative identifier for a note path.
pub fn note_id(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Write a note back to disk with a new header, atomically.
///
/// The full note text is serialized to a `.tmp` sibling in the same directory
/// and renamed over the original, so a crash mid-write never leaves a
/// half-written note behind.
pub fn write_note(note: &Note, header: &Mapping) -> VaultResult<()> {
    let rendered = header::render(header, &note.body, &note.id)?;

    let mut tmp = note.path.clone().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, rendered).map_err(|e| VaultError::Io {
        path: tmp.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp, &note.path).map_err(|e| VaultError::Io {
        path: note.path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn walk_finds_markdown_sorted_skips_hidden() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "b.md", "b");
        write(dir.path(), "a.md", "a");
        write(dir.path(), "notes/deep.md", "deep");
        write(dir.path(), ".obsidian/config.md", "hidden dir");
        write(dir.path(), ".hidden.md", "hidden file");
        write(dir.path(), "image.png", "not markdown");

        let found = walk_vault(dir.path()).unwrap();
        let ids: Vec<_> = found.iter().map(|p| note_id(dir.path(), p)).collect();
        assert_eq!(ids, vec!["a.md", "b.md", "notes/deep.md"]);
    }

    #[test]
    fn walk_rejects_missing_root() {
        let err = walk_vault(Path::new("/nonexistent/vault")).unwrap_err();
        assert!(matches!(err, VaultError::BadRoot { .. }));
    }

    #[test]
    fn read_note_parses_header_and_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "notes/day.md",
            "---\ntitle: Day\ntags: [shared_experience]\n---\n\nWhat a day.\n",
        );
        let note = read_note(dir.path(), &path).unwrap();
        assert_eq!(note.id, "notes/day.md");
        assert_eq!(note.stream_type(), StreamType::Shared);
        assert_eq!(note.body.trim(), "What a day.");
    }

    #[test]
    fn stream_type_defaults_to_personal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(dir.path(), "plain.md", "no header at all, just text\n");
        let note = read_note(dir.path(), &path).unwrap();
        assert_eq!(note.stream_type(), StreamType::Personal);
    }

    #[test]
    fn tags_as_comma_string_are_recognized() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "s.md",
            "---\ntags: journal, shared_experience\n---\nbody\n",
        );
        let note = read_note(dir.path(), &path).unwrap();
        assert_eq!(note.stream_type(), StreamType::Shared);
    }

    #[test]
    fn fingerprint_is_stable_under_whitespace_normalization() {
        assert_eq!(fingerprint("body text"), fingerprint("\n\nbody text\n"));
        assert_ne!(fingerprint("body text"), fingerprint("other text"));
        // Known length: 32 bytes hex-encoded.
        assert_eq!(fingerprint("x").len(), 64);
    }

    #[test]
    fn write_note_replaces_atomically_and_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(dir.path(), "n.md", "---\ntitle: T\n---\n\nbody\n");
        let note = read_note(dir.path(), &path).unwrap();

        let mut header = note.header.clone();
        header.insert("extra".into(), Value::String("field".into()));
        write_note(&note, &header).unwrap();

        let reread = read_note(dir.path(), &path).unwrap();
        assert_eq!(reread.header.get("title").unwrap().as_str(), Some("T"));
        assert_eq!(reread.header.get("extra").unwrap().as_str(), Some("field"));
        assert_eq!(reread.body.trim(), "body");
        // No temp file left behind.
        assert!(!dir.path().join("n.md.tmp").exists());
    }
}
