//! # Portfolio Companion CLI (`companion`)
//!
//! Commands for refreshing source snapshots, rebuilding the search index,
//! inspecting retrieval, asking questions, and running the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! companion --config ./config/companion.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `companion snapshot [db\|github\|resume\|all]` | Refresh stale snapshots (`--force` for all) |
//! | `companion sources` | Show snapshot files, age and record counts |
//! | `companion chunk` | Chunk current snapshots and print counts |
//! | `companion reindex` | Run one full reindex cycle |
//! | `companion search "<query>"` | Print the context a question would use |
//! | `companion ask "<query>"` | Answer a question |
//! | `companion serve` | HTTP API plus the periodic reindex scheduler |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use portfolio_companion::config::{self, RetrievalMode};
use portfolio_companion::models::Source;
use portfolio_companion::{context, ingest, scheduler, search, server, sources};

#[derive(Parser)]
#[command(
    name = "companion",
    about = "Portfolio Companion: retrieval-augmented answers about a portfolio",
    version,
    long_about = "Portfolio Companion snapshots portfolio records, GitHub repositories and a resume, \
    indexes them into OpenSearch, and answers questions from the most relevant chunks via a \
    completion service, with a persistent answer cache."
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/companion.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh source snapshots.
    ///
    /// Only snapshots that are missing or older than
    /// `[snapshots].max_age_hours` are fetched unless `--force` is given.
    Snapshot {
        /// `db`, `github`, `resume` or `all`.
        #[arg(default_value = "all")]
        source: String,

        /// Refresh even if the snapshot is still fresh.
        #[arg(long)]
        force: bool,
    },

    /// Show snapshot files, age and record counts.
    Sources,

    /// Chunk the current snapshots and print per-source counts.
    Chunk {
        /// Refresh stale snapshots first.
        #[arg(long)]
        refresh: bool,
    },

    /// Regenerate every snapshot and rebuild the index now.
    Reindex,

    /// Print the hits retrieval would select for a question.
    Search {
        query: String,

        /// `simple` or `dynamic`; defaults to `[retrieval].mode`.
        #[arg(long)]
        mode: Option<String>,
    },

    /// Answer a question from the index.
    Ask {
        query: String,

        /// Conversation memory to prefix to the prompt.
        #[arg(long)]
        memory: Option<String>,
    },

    /// Start the HTTP API and the periodic reindex scheduler.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Snapshot { source, force } => {
            let only = match source.as_str() {
                "all" => None,
                other => Some(other.parse::<Source>()?),
            };
            ingest::run_snapshot(&cfg, only, force).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Chunk { refresh } => {
            ingest::run_chunk(&cfg, refresh).await?;
        }
        Commands::Reindex => {
            scheduler::run_reindex(&cfg).await?;
        }
        Commands::Search { query, mode } => {
            let mode = mode.map(|m| m.parse::<RetrievalMode>()).transpose()?;
            search::run_search(&cfg, &query, mode).await?;
        }
        Commands::Ask { query, memory } => {
            context::run_ask(&cfg, &query, memory.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
