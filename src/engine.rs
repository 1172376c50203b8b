//! Run orchestration: the sequential per-note decision loop.
//!
//! One note at a time: build prompt → complete → parse → gate → merge header
//! and append the ledger record, both from the same gated result so header and
//! ledger never disagree. Every per-note error is caught at the note boundary;
//! a failing note never aborts the run. The one escalation is the model host
//! going down for several notes in a row.

use std::path::PathBuf;

use chrono::Utc;
use miette::Diagnostic;
use thiserror::Error;

use crate::error::ScribeResult;
use crate::gate;
use crate::header;
use crate::ledger::{Ledger, LedgerAction, LedgerRecord};
use crate::lexicon::Lexicon;
use crate::llm::CompletionProvider;
use crate::prompt::{self, PromptError};
use crate::response::{self, ResponseError};
use crate::vault;

/// Errors that abort a whole run.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("model host presumed down: {consecutive} consecutive provider failures")]
    #[diagnostic(
        code(scribe::engine::provider_down),
        help(
            "Every recent completion request failed. Check that Ollama is running \
             and reachable, then re-run; already-processed notes are skipped."
        )
    )]
    ProviderDown { consecutive: usize },
}

/// Configuration for one engine run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory of the vault to process.
    pub vault_root: PathBuf,
    /// Ledger file; defaults to `glyph_assignments.jsonl` in the vault root.
    pub ledger_path: PathBuf,
    /// Reprocess notes even when their content is unchanged.
    pub force: bool,
    /// Report what would happen without writing headers or ledger records.
    pub dry_run: bool,
    /// Re-prompts after an unparsable completion (attempts = retries + 1).
    pub max_retries: usize,
    /// Consecutive provider failures before the run aborts.
    pub provider_failure_limit: usize,
}

impl EngineConfig {
    /// Defaults for a vault root.
    pub fn new(vault_root: PathBuf) -> Self {
        let ledger_path = vault_root.join("glyph_assignments.jsonl");
        Self {
            vault_root,
            ledger_path,
            force: false,
            dry_run: false,
            max_retries: 2,
            provider_failure_limit: 3,
        }
    }
}

/// Outcome of one note pass, for the run summary.
#[derive(Debug, Clone)]
pub struct NoteOutcome {
    pub doc: String,
    pub action: LedgerAction,
    /// Skip/failure reason, when there is one.
    pub detail: Option<String>,
    /// Whether the failure was the completion provider (drives escalation).
    provider_failure: bool,
}

/// Counts and per-note outcomes for a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: String,
    pub updated: usize,
    pub no_match: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<NoteOutcome>,
}

impl RunSummary {
    /// Notes that got a fresh assignment written.
    pub fn processed(&self) -> usize {
        self.updated
    }

    fn tally(&mut self, outcome: NoteOutcome) {
        match outcome.action {
            LedgerAction::Updated => self.updated += 1,
            LedgerAction::NoMatch => self.no_match += 1,
            LedgerAction::Skipped => self.skipped += 1,
            LedgerAction::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// The glyph decision engine.
pub struct Engine {
    lexicon: Lexicon,
    provider: Box<dyn CompletionProvider>,
    config: EngineConfig,
}

impl Engine {
    /// Assemble an engine from its collaborators.
    pub fn new(
        lexicon: Lexicon,
        provider: Box<dyn CompletionProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            lexicon,
            provider,
            config,
        }
    }

    /// Process every markdown note under the vault root, sequentially.
    pub fn process_vault(&self) -> ScribeResult<RunSummary> {
        let run_id = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let ledger = Ledger::new(&self.config.ledger_path);
        let previous = ledger.latest_per_doc()?;

        let paths = vault::walk_vault(&self.config.vault_root)?;
        tracing::info!(
            vault = %self.config.vault_root.display(),
            notes = paths.len(),
            run_id = %run_id,
            "starting glyph assignment run"
        );

        let mut summary = RunSummary {
            run_id: run_id.clone(),
            ..Default::default()
        };
        let mut consecutive_provider_failures = 0usize;

        for path in &paths {
            let id = vault::note_id(&self.config.vault_root, path);
            tracing::info!(note = %id, "analyzing");

            let outcome = self.process_note(path, &id, &previous, &ledger, &run_id)?;
            if outcome.provider_failure {
                consecutive_provider_failures += 1;
                if consecutive_provider_failures >= self.config.provider_failure_limit {
                    return Err(EngineError::ProviderDown {
                        consecutive: consecutive_provider_failures,
                    }
                    .into());
                }
            } else {
                consecutive_provider_failures = 0;
            }
            summary.tally(outcome);
        }

        tracing::info!(
            updated = summary.updated,
            no_match = summary.no_match,
            skipped = summary.skipped,
            failed = summary.failed,
            "run complete"
        );
        Ok(summary)
    }

    /// Process one note. Per-note problems become ledger records and outcomes;
    /// only ledger-append failures (which break the audit trail) propagate.
    fn process_note(
        &self,
        path: &std::path::Path,
        id: &str,
        previous: &std::collections::BTreeMap<String, LedgerRecord>,
        ledger: &Ledger,
        run_id: &str,
    ) -> ScribeResult<NoteOutcome> {
        let note = match vault::read_note(&self.config.vault_root, path) {
            Ok(note) => note,
            Err(e) => {
                let reason = format!("{e}");
                self.record(
                    ledger,
                    LedgerRecord::new(id, "", run_id, LedgerAction::Failed).with_reason(&reason),
                )?;
                tracing::warn!(note = %id, error = %reason, "note unreadable, skipping");
                return Ok(NoteOutcome {
                    doc: id.to_string(),
                    action: LedgerAction::Failed,
                    detail: Some(reason),
                    provider_failure: false,
                });
            }
        };

        let fingerprint = note.fingerprint();

        // Already carries a glyphstream and the content is unchanged: skip.
        if !self.config.force
            && note.header.contains_key("glyphstream")
            && previous
                .get(id)
                .is_some_and(|r| r.fingerprint == fingerprint)
        {
            self.record(
                ledger,
                LedgerRecord::new(id, &fingerprint, run_id, LedgerAction::Skipped)
                    .with_reason("unchanged"),
            )?;
            return Ok(NoteOutcome {
                doc: id.to_string(),
                action: LedgerAction::Skipped,
                detail: Some("unchanged".into()),
                provider_failure: false,
            });
        }

        let stream = note.stream_type();
        let prompt = match prompt::build_prompt(&note.body, &self.lexicon, stream) {
            Ok(prompt) => prompt,
            Err(e @ PromptError::EmptyDocument { .. }) => {
                let reason = format!("{e}");
                self.record(
                    ledger,
                    LedgerRecord::new(id, &fingerprint, run_id, LedgerAction::Skipped)
                        .with_reason(&reason),
                )?;
                return Ok(NoteOutcome {
                    doc: id.to_string(),
                    action: LedgerAction::Skipped,
                    detail: Some(reason),
                    provider_failure: false,
                });
            }
        };

        // Completion + parse, with a bounded retry on grammar failures.
        let mut attempt = 0usize;
        let candidate = loop {
            attempt += 1;
            let completion = match self.provider.complete(&prompt) {
                Ok(text) => text,
                Err(e) => {
                    let reason = format!("provider unavailable: {e}");
                    self.record(
                        ledger,
                        LedgerRecord::new(id, &fingerprint, run_id, LedgerAction::Failed)
                            .with_reason(&reason),
                    )?;
                    return Ok(NoteOutcome {
                        doc: id.to_string(),
                        action: LedgerAction::Failed,
                        detail: Some(reason),
                        provider_failure: true,
                    });
                }
            };
            match response::parse_completion(&completion, &self.lexicon) {
                Ok(candidate) => break candidate,
                Err(e @ ResponseError::Unparsable { .. }) => {
                    if attempt <= self.config.max_retries {
                        tracing::warn!(note = %id, attempt, "unparsable completion, retrying");
                        continue;
                    }
                    let reason = format!("{e} (after {attempt} attempts)");
                    self.record(
                        ledger,
                        LedgerRecord::new(id, &fingerprint, run_id, LedgerAction::Failed)
                            .with_reason(&reason),
                    )?;
                    return Ok(NoteOutcome {
                        doc: id.to_string(),
                        action: LedgerAction::Failed,
                        detail: Some(reason),
                        provider_failure: false,
                    });
                }
            }
        };

        let validated = gate::gate(candidate, &note.body, &self.lexicon, stream);

        if validated.glyphs.is_empty() {
            self.record(
                ledger,
                LedgerRecord::new(id, &fingerprint, run_id, LedgerAction::NoMatch)
                    .with_result(&validated),
            )?;
            return Ok(NoteOutcome {
                doc: id.to_string(),
                action: LedgerAction::NoMatch,
                detail: None,
                provider_failure: false,
            });
        }

        let merged = header::merge(&note.header, &validated, &self.lexicon, stream, Utc::now());

        if !self.config.dry_run {
            if let Err(e) = vault::write_note(&note, &merged) {
                // The ledger record is appended regardless of the header write.
                let reason = format!("header write failed: {e}");
                self.record(
                    ledger,
                    LedgerRecord::new(id, &fingerprint, run_id, LedgerAction::Failed)
                        .with_result(&validated)
                        .with_reason(&reason),
                )?;
                return Ok(NoteOutcome {
                    doc: id.to_string(),
                    action: LedgerAction::Failed,
                    detail: Some(reason),
                    provider_failure: false,
                });
            }
        }

        self.record(
            ledger,
            LedgerRecord::new(id, &fingerprint, run_id, LedgerAction::Updated)
                .with_result(&validated),
        )?;
        tracing::info!(note = %id, glyphs = ?validated.symbols(), "assigned");
        Ok(NoteOutcome {
            doc: id.to_string(),
            action: LedgerAction::Updated,
            detail: None,
            provider_failure: false,
        })
    }

    fn record(&self, ledger: &Ledger, record: LedgerRecord) -> ScribeResult<()> {
        if self.config.dry_run {
            return Ok(());
        }
        ledger.append(&record)?;
        Ok(())
    }
}
