//! End-to-end integration tests for the glyphscribe engine.
//!
//! These tests exercise the full pipeline — prompt, scripted completion,
//! parsing, gating, header merge, and ledger append — against real temp
//! vaults, validating that headers and the audit ledger stay in agreement.

use std::path::{Path, PathBuf};

use glyphscribe::engine::{Engine, EngineConfig, RunSummary};
use glyphscribe::error::ScribeError;
use glyphscribe::ledger::{Ledger, LedgerAction};
use glyphscribe::lexicon::Lexicon;
use glyphscribe::llm::ScriptedProvider;
use glyphscribe::response::ConstraintViolation;
use glyphscribe::vault;

const CASUAL_BODY: &str = "Made coffee, answered mail, walked to the market. \
A quiet and ordinary day with nothing remarkable in it.";

const FOLDED_TIME_BODY: &str = "That week keeps replaying: the same corridor, the same \
words, a wave of deja vu every time the door opens. Time folded in on itself and I \
lived the goodbye twice.";

fn write_note(dir: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

fn run_engine(vault_root: &Path, provider: ScriptedProvider, force: bool) -> RunSummary {
    let mut config = EngineConfig::new(vault_root.to_path_buf());
    config.force = force;
    Engine::new(Lexicon::builtin(), Box::new(provider), config)
        .process_vault()
        .unwrap()
}

fn ledger_for(vault_root: &Path) -> Ledger {
    Ledger::new(vault_root.join("glyph_assignments.jsonl"))
}

#[test]
fn run_assigns_glyphs_and_merges_header() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_note(
        dir.path(),
        "morning.md",
        &format!("---\ntitle: Morning\ntags: [draft]\n---\n\n{CASUAL_BODY}\n"),
    );

    let provider = ScriptedProvider::new()
        .with_response("GLYPH ∷ :: the same route as every day\nGLYPH 🜁 :: cold morning air");
    let summary = run_engine(dir.path(), provider, false);

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.failed, 0);

    let note = vault::read_note(dir.path(), &path).unwrap();
    // Pre-existing fields untouched.
    assert_eq!(note.header.get("title").unwrap().as_str(), Some("Morning"));
    let tags: Vec<_> = note.header.get("tags").unwrap()
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["draft"]);
    // Owned fields freshly written.
    let stream: Vec<_> = note.header.get("glyphstream").unwrap()
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(stream, vec!["∷", "🜁"]);
    assert_eq!(note.header.get("stream_type").unwrap().as_str(), Some("personal"));
    assert!(note.header.contains_key("last_processed"));
    let meta = note.header.get("glyph_metadata").unwrap().as_mapping().unwrap();
    assert_eq!(
        meta.get("∷").unwrap().as_mapping().unwrap().get("rationale").unwrap().as_str(),
        Some("the same route as every day")
    );

    let records = ledger_for(dir.path()).read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, LedgerAction::Updated);
    assert_eq!(records[0].glyphs, vec!["∷", "🜁"]);
    assert_eq!(records[0].fingerprint, note.fingerprint());
}

#[test]
fn permission_glyph_denied_on_casual_log() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_note(dir.path(), "log.md", &format!("{CASUAL_BODY}\n"));

    let provider = ScriptedProvider::new().with_response(
        "GLYPH ∷ :: routine repeats\n\
         GLYPH ⧖ [qualifies: non-linear time] :: the day felt loopy\n\
         GLYPH 🜁 :: crisp air",
    );
    let summary = run_engine(dir.path(), provider, false);
    assert_eq!(summary.updated, 1);

    let note = vault::read_note(dir.path(), &path).unwrap();
    let stream: Vec<_> = note.header.get("glyphstream").unwrap()
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(stream, vec!["∷", "🜁"], "⧖ must be gated out");

    let records = ledger_for(dir.path()).read_all().unwrap();
    assert_eq!(records[0].denials.len(), 1);
    assert_eq!(records[0].denials[0].symbol, "⧖");
    assert!(records[0].denials[0].reason.contains("eligibility check failed"));
}

#[test]
fn permission_glyph_granted_with_qualifying_content() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_note(dir.path(), "fold.md", &format!("{FOLDED_TIME_BODY}\n"));

    let provider = ScriptedProvider::new()
        .with_response("GLYPH ⧖ [qualifies: non-linear time] :: the entry relives its timeline");
    let summary = run_engine(dir.path(), provider, false);
    assert_eq!(summary.updated, 1);

    let note = vault::read_note(dir.path(), &path).unwrap();
    let stream: Vec<_> = note.header.get("glyphstream").unwrap()
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(stream, vec!["⧖"]);

    let records = ledger_for(dir.path()).read_all().unwrap();
    assert!(records[0].denials.is_empty());
}

#[test]
fn unparsable_completion_retries_then_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let original = format!("---\ntitle: Day\n---\n\n{CASUAL_BODY}\n");
    let path = write_note(dir.path(), "day.md", &original);

    // Three attempts, none parseable.
    let provider = ScriptedProvider::new()
        .with_response("It was a lovely day overall.")
        .with_response("I would rate this entry a seven.")
        .with_response("No glyphs come to mind.");
    let summary = run_engine(dir.path(), provider, false);

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.updated, 0);

    // Header untouched.
    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, original);

    let records = ledger_for(dir.path()).read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, LedgerAction::Failed);
    let reason = records[0].reason.as_deref().unwrap();
    assert!(reason.contains("no recognizable glyph grammar"));
    assert!(reason.contains("after 3 attempts"));
}

#[test]
fn provider_failure_logged_and_run_continues() {
    let dir = tempfile::TempDir::new().unwrap();
    write_note(dir.path(), "a.md", &format!("{CASUAL_BODY}\n"));
    write_note(dir.path(), "b.md", &format!("{CASUAL_BODY}\n"));

    // a.md hits a provider failure; b.md succeeds.
    let provider = ScriptedProvider::new()
        .with_failure("connection refused")
        .with_response("GLYPH ∞ :: cycles of memory");
    let summary = run_engine(dir.path(), provider, false);

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.updated, 1);

    let latest = ledger_for(dir.path()).latest_per_doc().unwrap();
    assert_eq!(latest["a.md"].action, LedgerAction::Failed);
    assert!(latest["a.md"]
        .reason
        .as_deref()
        .unwrap()
        .contains("provider unavailable"));
    assert_eq!(latest["b.md"].action, LedgerAction::Updated);
}

#[test]
fn repeated_provider_failures_abort_the_run() {
    let dir = tempfile::TempDir::new().unwrap();
    for name in ["a.md", "b.md", "c.md", "d.md"] {
        write_note(dir.path(), name, &format!("{CASUAL_BODY}\n"));
    }

    let provider = ScriptedProvider::new()
        .with_failure("host down")
        .with_failure("host down")
        .with_failure("host down");
    let config = EngineConfig::new(dir.path().to_path_buf());
    let err = Engine::new(Lexicon::builtin(), Box::new(provider), config)
        .process_vault()
        .unwrap_err();

    assert!(matches!(err, ScribeError::Engine(_)));
    assert!(format!("{err}").contains("presumed down"));

    // Every attempted note still has an audit trace.
    let records = ledger_for(dir.path()).read_all().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.action == LedgerAction::Failed));
}

#[test]
fn unchanged_note_skipped_on_second_run() {
    let dir = tempfile::TempDir::new().unwrap();
    write_note(dir.path(), "note.md", &format!("{CASUAL_BODY}\n"));

    let provider = ScriptedProvider::new().with_response("GLYPH ∷ :: loops");
    let summary = run_engine(dir.path(), provider, false);
    assert_eq!(summary.updated, 1);

    // Second run: no scripted responses. If the engine called the provider,
    // the run would record a failure instead of a skip.
    let provider = ScriptedProvider::new();
    let summary = run_engine(dir.path(), provider, false);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    let records = ledger_for(dir.path()).read_all().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].action, LedgerAction::Skipped);
    assert_eq!(records[1].reason.as_deref(), Some("unchanged"));
}

#[test]
fn force_reprocesses_unchanged_notes() {
    let dir = tempfile::TempDir::new().unwrap();
    write_note(dir.path(), "note.md", &format!("{CASUAL_BODY}\n"));

    let provider = ScriptedProvider::new().with_response("GLYPH ∷ :: loops");
    run_engine(dir.path(), provider, false);

    let provider = ScriptedProvider::new().with_response("GLYPH ∞ :: memory this time");
    let summary = run_engine(dir.path(), provider, true);
    assert_eq!(summary.updated, 1);

    // Both passes remain in the ledger; the newest wins reconstruction.
    let records = ledger_for(dir.path()).read_all().unwrap();
    assert_eq!(records.len(), 2);
    let latest = ledger_for(dir.path()).latest_per_doc().unwrap();
    assert_eq!(latest["note.md"].glyphs, vec!["∞"]);
}

#[test]
fn shared_stream_without_permission_glyph_is_no_match() {
    let dir = tempfile::TempDir::new().unwrap();
    let original = format!(
        "---\ntags: [shared_experience]\n---\n\n{CASUAL_BODY}\n"
    );
    let path = write_note(dir.path(), "shared.md", &original);

    let provider = ScriptedProvider::new().with_response("GLYPH ∷ :: loops\nGLYPH 🜁 :: air");
    let summary = run_engine(dir.path(), provider, false);

    assert_eq!(summary.no_match, 1);
    assert_eq!(summary.updated, 0);

    // Header untouched: no assignment was written.
    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, original);

    let records = ledger_for(dir.path()).read_all().unwrap();
    assert_eq!(records[0].action, LedgerAction::NoMatch);
    assert!(records[0]
        .violations
        .contains(&ConstraintViolation::SharedStreamWithoutPermissionGlyph));
}

#[test]
fn shared_stream_with_eligible_permission_glyph_updates() {
    let dir = tempfile::TempDir::new().unwrap();
    let body = "We both lost something that winter. Together we crossed into a year \
                neither of us recognized, and we survived it side by side.";
    let path = write_note(
        dir.path(),
        "shared.md",
        &format!("---\ntags: [shared_experience]\n---\n\n{body}\n"),
    );

    let provider = ScriptedProvider::new().with_response(
        "GLYPH ⚯ :: witnessing each other\nGLYPH ⍈ [qualifies: threshold] :: the crossing",
    );
    let summary = run_engine(dir.path(), provider, false);
    assert_eq!(summary.updated, 1);

    let note = vault::read_note(dir.path(), &path).unwrap();
    let stream: Vec<_> = note.header.get("glyphstream").unwrap()
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(stream, vec!["⚯", "⍈"]);
    assert_eq!(note.header.get("stream_type").unwrap().as_str(), Some("shared"));
}

#[test]
fn short_note_skipped_without_model_call() {
    let dir = tempfile::TempDir::new().unwrap();
    write_note(dir.path(), "stub.md", "tiny note\n");

    // Empty script: a provider call would turn into a failure.
    let summary = run_engine(dir.path(), ScriptedProvider::new(), false);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    let records = ledger_for(dir.path()).read_all().unwrap();
    assert_eq!(records[0].action, LedgerAction::Skipped);
    assert!(records[0].reason.as_deref().unwrap().contains("too short"));
}

#[test]
fn corrupt_header_skips_note_and_writes_nothing() {
    let dir = tempfile::TempDir::new().unwrap();
    let original = format!("---\ntitle: [unclosed\n---\n\n{CASUAL_BODY}\n");
    let path = write_note(dir.path(), "broken.md", &original);

    let summary = run_engine(dir.path(), ScriptedProvider::new(), false);
    assert_eq!(summary.failed, 1);

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, original, "corrupt note must not be rewritten");

    let records = ledger_for(dir.path()).read_all().unwrap();
    assert_eq!(records[0].action, LedgerAction::Failed);
    assert!(records[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("corrupt front matter"));
}

#[test]
fn deterministic_given_deterministic_provider() {
    let script = "GLYPH ∷ :: loops\nGLYPH ⧖ [qualifies: deja vu] :: folded\nGLYPH 🜁 :: air";

    let run = || {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_note(dir.path(), "note.md", &format!("{CASUAL_BODY}\n"));
        let provider = ScriptedProvider::new().with_response(script);
        run_engine(dir.path(), provider, false);
        let note = vault::read_note(dir.path(), &path).unwrap();
        let stream: Vec<String> = note.header.get("glyphstream").unwrap()
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        let records = ledger_for(dir.path()).read_all().unwrap();
        (stream, records[0].glyphs.clone(), records[0].fingerprint.clone())
    };

    let (stream_a, glyphs_a, fp_a) = run();
    let (stream_b, glyphs_b, fp_b) = run();
    assert_eq!(stream_a, stream_b);
    assert_eq!(glyphs_a, glyphs_b);
    assert_eq!(fp_a, fp_b);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::TempDir::new().unwrap();
    let original = format!("{CASUAL_BODY}\n");
    let path = write_note(dir.path(), "note.md", &original);

    let provider = ScriptedProvider::new().with_response("GLYPH ∷ :: loops");
    let mut config = EngineConfig::new(dir.path().to_path_buf());
    config.dry_run = true;
    let summary = Engine::new(Lexicon::builtin(), Box::new(provider), config)
        .process_vault()
        .unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    assert!(ledger_for(dir.path()).read_all().unwrap().is_empty());
}
