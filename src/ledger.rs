//! Append-only assignment ledger: one JSON record per line, per processing pass.
//!
//! The ledger is the ground truth for reconstructing assignment history even if
//! headers are later edited or lost. Records are appended with `O_APPEND` and
//! never rewritten; "current" state is the latest record per document id.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::{Denial, Validated};
use crate::response::ConstraintViolation;

/// Errors from ledger operations.
#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("failed to append to ledger {path}: {source}")]
    #[diagnostic(
        code(scribe::ledger::append),
        help("Check that the ledger file's directory exists and is writable.")
    )]
    Append {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read ledger {path}: {source}")]
    #[diagnostic(
        code(scribe::ledger::io),
        help("Check that the ledger file is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt ledger record at {path}:{line}: {message}")]
    #[diagnostic(
        code(scribe::ledger::corrupt),
        help(
            "The ledger is append-only JSON Lines; a record failed to parse. \
             The file may have been edited by hand."
        )
    )]
    Corrupt {
        path: String,
        line: usize,
        message: String,
    },

    #[error("failed to serialize ledger record for \"{doc}\": {message}")]
    #[diagnostic(code(scribe::ledger::serialize), help("This is a bug; please report it."))]
    Serialize { doc: String, message: String },
}

/// Convenience alias for ledger operation results.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// What happened to a document in one processing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    /// Glyphs assigned and the header rewritten.
    Updated,
    /// Document not processed (unchanged, too short, or corrupt header).
    Skipped,
    /// Processed, but the validated result contained no glyphs.
    NoMatch,
    /// Processing was attempted and failed.
    Failed,
}

impl std::fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Updated => "updated",
            Self::Skipped => "skipped",
            Self::NoMatch => "no_match",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Vault-relative document id.
    pub doc: String,
    /// SHA-256 fingerprint of the content at processing time.
    pub fingerprint: String,
    /// When this pass happened.
    pub timestamp: DateTime<Utc>,
    /// Identifier shared by all records of one run.
    pub run_id: String,
    /// Outcome of the pass.
    pub action: LedgerAction,
    /// Validated glyph symbols, in assignment order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glyphs: Vec<String>,
    /// Per-glyph rationale as produced by the model.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rationales: BTreeMap<String, String>,
    /// Constraint violations detected and auto-corrected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ConstraintViolation>,
    /// Permission glyphs denied by the gate, with reasons.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denials: Vec<Denial>,
    /// Why the document was skipped or failed, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LedgerRecord {
    /// Start a record for one pass over one document.
    pub fn new(
        doc: impl Into<String>,
        fingerprint: impl Into<String>,
        run_id: impl Into<String>,
        action: LedgerAction,
    ) -> Self {
        Self {
            doc: doc.into(),
            fingerprint: fingerprint.into(),
            timestamp: Utc::now(),
            run_id: run_id.into(),
            action,
            glyphs: Vec::new(),
            rationales: BTreeMap::new(),
            violations: Vec::new(),
            denials: Vec::new(),
            reason: None,
        }
    }

    /// Attach a validated result (glyphs, rationales, violations, denials).
    pub fn with_result(mut self, validated: &Validated) -> Self {
        self.glyphs = validated.symbols();
        self.rationales = validated
            .glyphs
            .iter()
            .map(|g| (g.symbol.clone(), g.rationale.clone()))
            .collect();
        self.violations = validated.violations.clone();
        self.denials = validated.denials.clone();
        self
    }

    /// Attach a skip/failure reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Handle to the append-only ledger file.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Create a handle. The file is created lazily on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The ledger file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Never overwrites existing records.
    pub fn append(&self, record: &LedgerRecord) -> LedgerResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::Append {
                path: self.path.display().to_string(),
                source: e,
            })?;
        }
        let line = serde_json::to_string(record).map_err(|e| LedgerError::Serialize {
            doc: record.doc.clone(),
            message: e.to_string(),
        })?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::Append {
                path: self.path.display().to_string(),
                source: e,
            })?;
        writeln!(file, "{line}").map_err(|e| LedgerError::Append {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    /// Read the full history, oldest first. A missing file is an empty history.
    pub fn read_all(&self) -> LedgerResult<Vec<LedgerRecord>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LedgerError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                });
            }
        };
        let mut records = Vec::new();
        for (idx, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: LedgerRecord =
                serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                    path: self.path.display().to_string(),
                    line: idx + 1,
                    message: e.to_string(),
                })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Latest record per document id — the reconstructed "current" state.
    pub fn latest_per_doc(&self) -> LedgerResult<BTreeMap<String, LedgerRecord>> {
        let mut latest = BTreeMap::new();
        for record in self.read_all()? {
            latest.insert(record.doc.clone(), record);
        }
        Ok(latest)
    }
}
