//! glyphscribe CLI: glyph assignment for journal vaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use glyphscribe::engine::{Engine, EngineConfig};
use glyphscribe::gate;
use glyphscribe::ledger::Ledger;
use glyphscribe::lexicon::Lexicon;
use glyphscribe::llm::{OllamaClient, OllamaConfig};
use glyphscribe::vault;

#[derive(Parser)]
#[command(name = "scribe", version, about = "Glyph decision engine for journal vaults")]
struct Cli {
    /// Lexicon TOML file; the built-in seed lexicon is used when omitted.
    #[arg(long, global = true)]
    lexicon: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign glyphs to every markdown note in a vault.
    Run {
        /// Vault root directory.
        #[arg(long)]
        vault: PathBuf,

        /// Ledger file (defaults to glyph_assignments.jsonl in the vault).
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Ollama model name.
        #[arg(long, default_value = "llama3.2")]
        model: String,

        /// Ollama base URL.
        #[arg(long, default_value = "http://localhost:11434")]
        ollama_url: String,

        /// Reprocess notes even when their content is unchanged.
        #[arg(long)]
        force: bool,

        /// Report what would happen without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect the glyph lexicon.
    Lexicon {
        #[command(subcommand)]
        action: LexiconAction,
    },

    /// Show assignment history from the ledger.
    History {
        /// Vault root directory (locates the default ledger).
        #[arg(long)]
        vault: PathBuf,

        /// Ledger file override.
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Only show records for this document id.
        #[arg(long)]
        doc: Option<String>,

        /// Show only the latest record per document.
        #[arg(long)]
        latest: bool,
    },

    /// Print the permission-eligibility report for one file, without the model.
    Check {
        /// Markdown file to assess.
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum LexiconAction {
    /// List all glyphs.
    List,
    /// Show details of one glyph (by symbol or name).
    Show {
        /// Glyph symbol or display name.
        glyph: String,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let lexicon = match &cli.lexicon {
        Some(path) => Lexicon::from_toml_file(path).into_diagnostic()?,
        None => Lexicon::builtin(),
    };

    match cli.command {
        Commands::Run {
            vault,
            ledger,
            model,
            ollama_url,
            force,
            dry_run,
        } => {
            let mut client = OllamaClient::new(OllamaConfig {
                base_url: ollama_url.clone(),
                model,
                ..Default::default()
            });
            if !client.probe() {
                miette::bail!(
                    help = "Start Ollama with `ollama serve`, or pass --ollama-url.",
                    "no Ollama host reachable at {ollama_url}"
                );
            }
            client.ensure_model().into_diagnostic()?;

            let mut config = EngineConfig::new(vault);
            if let Some(ledger) = ledger {
                config.ledger_path = ledger;
            }
            config.force = force;
            config.dry_run = dry_run;
            let ledger_path = config.ledger_path.clone();

            let engine = Engine::new(lexicon, Box::new(client), config);
            let summary = engine.process_vault().into_diagnostic()?;

            println!("Run {} complete:", summary.run_id);
            println!("  updated:  {}", summary.updated);
            println!("  no match: {}", summary.no_match);
            println!("  skipped:  {}", summary.skipped);
            println!("  failed:   {}", summary.failed);
            for outcome in &summary.outcomes {
                if let Some(detail) = &outcome.detail {
                    println!("  {} — {}: {}", outcome.doc, outcome.action, detail);
                }
            }
            println!("Ledger: {}", ledger_path.display());
        }

        Commands::Lexicon { action } => match action {
            LexiconAction::List => {
                println!("Glyphs ({}):", lexicon.len());
                for glyph in lexicon.glyphs() {
                    let gated = if glyph.requires_permission {
                        " [requires permission]"
                    } else {
                        ""
                    };
                    println!(
                        "  {} {} — {}{}",
                        glyph.symbol,
                        glyph.name,
                        glyph.meanings.join(", "),
                        gated
                    );
                }
            }
            LexiconAction::Show { glyph } => {
                let def = lexicon
                    .resolve(&glyph)
                    .ok_or_else(|| glyphscribe::lexicon::LexiconError::UnknownGlyph {
                        token: glyph.clone(),
                    })
                    .into_diagnostic()?;
                println!("Glyph: {} ({})", def.symbol, def.name);
                println!("  meanings:   {}", def.meanings.join(", "));
                println!("  archetypes: {}", def.archetypes.join(", "));
                println!("  permission: {}", def.requires_permission);
            }
        },

        Commands::History {
            vault,
            ledger,
            doc,
            latest,
        } => {
            let path = ledger.unwrap_or_else(|| vault.join("glyph_assignments.jsonl"));
            let ledger = Ledger::new(path);

            let records: Vec<_> = if latest {
                ledger
                    .latest_per_doc()
                    .into_diagnostic()?
                    .into_values()
                    .collect()
            } else {
                ledger.read_all().into_diagnostic()?
            };

            let mut shown = 0usize;
            for record in records
                .iter()
                .filter(|r| doc.as_ref().is_none_or(|d| &r.doc == d))
            {
                let glyphs = if record.glyphs.is_empty() {
                    "-".to_string()
                } else {
                    record.glyphs.join(" ")
                };
                let reason = record
                    .reason
                    .as_ref()
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default();
                println!(
                    "  {} {} [{}] {}{}",
                    record.timestamp.to_rfc3339(),
                    record.doc,
                    record.action,
                    glyphs,
                    reason
                );
                shown += 1;
            }
            if shown == 0 {
                println!("No ledger records found.");
            }
        }

        Commands::Check { file } => {
            let raw = std::fs::read_to_string(&file).into_diagnostic()?;
            let id = file.display().to_string();
            let (header, body) = glyphscribe::header::parse_note(&raw, &id).into_diagnostic()?;
            let report = gate::assess(&body);

            println!("Eligibility report for {id}:");
            let sections = [
                ("shared trauma", &report.shared_trauma),
                ("threshold narrative", &report.threshold),
                ("non-linear time", &report.nonlinear_time),
            ];
            for (name, matches) in sections {
                if matches.is_empty() {
                    println!("  {name}: no markers");
                } else {
                    println!("  {name}: {}", matches.join(" | "));
                }
            }
            if report.qualifies() {
                println!("Qualifies for permission glyphs.");
            } else {
                println!("Does not qualify for permission glyphs.");
            }
            println!("Stream type: {}", vault::StreamType::of_header(&header));
        }
    }

    Ok(())
}
