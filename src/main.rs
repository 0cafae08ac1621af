//! # Document QA CLI (`docqa`)
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa index [--force]` | Build the index, or reuse the stored one if current |
//! | `docqa search "<query>"` | Print the top-k matching chunks |
//! | `docqa ask "<question>"` | Answer one question with sources |
//! | `docqa chat` | Interactive question loop with conversation history |
//! | `docqa serve` | Start the HTTP server and web UI |
//! | `docqa stats` | Show statistics for the stored index without refreshing it |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use doc_qa::config::{self, Config};
use doc_qa::embedding::create_embedder;
use doc_qa::generation::create_language_model;
use doc_qa::index::VectorIndex;
use doc_qa::pipeline::Assistant;
use doc_qa::{commands, logging, server};

const DEFAULT_CONFIG_PATH: &str = "./config/docqa.toml";

/// Document QA: a retrieval-augmented assistant over local pediatric-care documents.
///
/// Settings come from a TOML file, then `DOCQA_*` environment variables
/// (a `.env` file in the working directory is honoured).
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Document QA: ask questions about a local document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When omitted, `./config/docqa.toml` is used if it exists and
    /// built-in defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or refresh the vector index.
    ///
    /// Reuses the stored index when documents, chunking settings and the
    /// embedding model are unchanged.
    Index {
        /// Re-embed everything even if the stored index is current.
        #[arg(long)]
        force: bool,
    },

    /// Search indexed documents.
    Search {
        query: String,

        /// Number of chunks to return (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a single question.
    Ask { question: String },

    /// Interactive chat on stdin with conversation history.
    Chat,

    /// Start the HTTP server and web UI.
    Serve,

    /// Show index statistics.
    Stats,
}

fn load(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(p) => config::load_config(p),
        None => config::load_or_default(std::path::Path::new(DEFAULT_CONFIG_PATH)),
    };
    config.context("failed to load configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = load(cli.config.as_ref())?;
    logging::init(cfg.debug);
    tracing::info!(
        device = %cfg.device,
        embedding = %cfg.embedding.provider,
        generation = %cfg.generation.provider,
        "starting"
    );
    if cfg.device != "cpu" {
        tracing::warn!(device = %cfg.device, "accelerator requested; local inference runs on CPU");
    }

    let embedder = create_embedder(&cfg.embedding).context("failed to create embedder")?;
    let model = create_language_model(&cfg.generation).context("failed to create language model")?;

    // Stats reports on the stored index as-is instead of refreshing it.
    let (assistant, rebuilt) = if let Commands::Stats = cli.command {
        let stored = VectorIndex::load(&cfg.index.path).with_context(|| {
            format!(
                "no usable index at {}; run `docqa index` first",
                cfg.index.path.display()
            )
        })?;
        (Assistant::new(cfg, embedder, model, stored), false)
    } else {
        let assistant = Assistant::new(cfg, embedder, model, VectorIndex::default());
        let force = matches!(cli.command, Commands::Index { force: true });
        let rebuilt = assistant
            .load_or_rebuild(force)
            .await
            .context("failed to open document index")?;
        (assistant, rebuilt)
    };

    match cli.command {
        Commands::Index { .. } => commands::run_index(&assistant, rebuilt)?,
        Commands::Search { query, k } => commands::run_search(&assistant, &query, k).await?,
        Commands::Ask { question } => commands::run_ask(&assistant, &question).await?,
        Commands::Chat => {
            let stdin = std::io::stdin().lock();
            let stdout = std::io::stdout();
            commands::run_chat(&assistant, stdin, stdout).await?
        }
        Commands::Serve => server::run_server(assistant).await?,
        Commands::Stats => commands::run_stats(&assistant)?,
    }

    Ok(())
}
