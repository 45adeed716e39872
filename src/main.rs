//! # Daily Report Sync CLI (`drs`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `drs sync` | Copy recent daily reports from Slack into Notion |
//! | `drs sync --dry-run` | Show the buckets a sync would write |
//! | `drs extract [FILE]` | Print the lines extracted from one report |
//!
//! Credentials come from the environment (or a `.env` file). Non-secret
//! settings may also be given in a TOML file with `--config`.
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use daily_report_sync::config::{self, FileConfig};
use daily_report_sync::sync::{print_report, SyncEngine, SyncOptions};
use report_sync_core::extract::SectionExtractor;

/// Sync daily reports from a Slack channel into a Notion database.
#[derive(Parser)]
#[command(name = "drs", version, about)]
struct Cli {
    /// Optional TOML configuration file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent messages and merge their reports into Notion.
    ///
    /// Safe to repeat: pages, date sections, and lines that already exist
    /// are not written again.
    Sync {
        /// Fetch and bucket, but write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Override the lookback window in days.
        #[arg(long)]
        lookback_days: Option<u32>,
    },

    /// Print the accomplishment lines extracted from a report.
    ///
    /// Reads FILE, or stdin when omitted. Needs no credentials.
    Extract {
        file: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn read_report(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract { file } => {
            let labels = match &cli.config {
                Some(path) => config::read_file_config(path)?.extract,
                None => FileConfig::default().extract,
            };
            let extractor = SectionExtractor::new(&labels)?;
            let text = read_report(file.as_deref())?;
            let lines = extractor.extract_lines(&text);
            if lines.is_empty() {
                eprintln!("No '{}' section found.", labels.start_label);
            }
            for line in lines {
                println!("- {}", line);
            }
        }
        Commands::Sync {
            dry_run,
            lookback_days,
        } => {
            let mut cfg = config::load_config(cli.config.as_deref())?;
            if let Some(days) = lookback_days {
                if days == 0 {
                    bail!("--lookback-days must be >= 1");
                }
                cfg.sync.lookback_days = days;
            }

            let engine = SyncEngine::from_config(&cfg)?;
            let report = engine.run(&SyncOptions { dry_run }).await?;
            print_report(&report, &cfg.slack.channel_id, dry_run);
        }
    }

    Ok(())
}
