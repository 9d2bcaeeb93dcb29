//! # GST Harness CLI (`gsth`)
//!
//! ## Usage
//!
//! ```bash
//! gsth --config ./config/gsth.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gsth run` | Watch the document folder and answer queries from stdin |
//! | `gsth watch` | Only keep the index in sync, until Ctrl-C |
//! | `gsth ask "<query>"` | Classify and answer one query |
//! | `gsth classify "<query>"` | Print the query category |
//! | `gsth ingest <path>` | Index one file |
//! | `gsth remove <id>` | Drop one record |
//! | `gsth stats` | Show what the store holds |
//!
//! Answers are printed to stdout as JSON; logs go to stderr and honour
//! `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gst_harness::classifier::QueryClassifier;
use gst_harness::config::{self, Config};
use gst_harness::embedding::{create_provider, EmbeddingProvider};
use gst_harness::extract::LocalExtractor;
use gst_harness::ingest::{IngestOutcome, IngestionPipeline, PipelineSettings};
use gst_harness::orchestrator::Orchestrator;
use gst_harness::reasoning::{create_reasoning, ReasoningClient};
use gst_harness::store::VectorStore;
use gst_harness::structured::{
    connect_read_only, DisabledStructured, SqlAgent, StructuredQueryEngine,
};

/// GST Harness: a watched GST rule index with a query router over
/// invoice data and rule documents.
#[derive(Parser)]
#[command(
    name = "gsth",
    about = "GST Harness: keep a GST rule index in sync with a folder and answer questions over rules and invoices",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gsth.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the watcher in the background and answer queries read
    /// line by line from stdin.
    ///
    /// Each answer is one JSON object per line. EOF or Ctrl-C stops the
    /// watcher and exits.
    Run,

    /// Keep the index in sync with the watched folder until Ctrl-C.
    Watch,

    /// Classify and answer a single query.
    Ask {
        query: String,
    },

    /// Print the category a query would be routed to.
    Classify {
        query: String,
    },

    /// Extract, embed and index one file. Its filename becomes the id.
    Ingest {
        path: PathBuf,
    },

    /// Delete a record by id. Unknown ids are a no-op.
    Remove {
        id: String,
    },

    /// Show snapshot path, dimension and stored ids.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run => {
            let app = App::build(&cfg)?;
            let pipeline = Arc::new(app.pipeline(&cfg)?);
            let orchestrator = app.orchestrator(&cfg).await?;
            run_interactive(pipeline, &orchestrator).await?;
        }
        Commands::Watch => {
            let app = App::build(&cfg)?;
            let pipeline = Arc::new(app.pipeline(&cfg)?);
            let cancel = CancellationToken::new();
            let handle = pipeline.spawn(cancel.clone());
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            cancel.cancel();
            handle.await??;
        }
        Commands::Ask { query } => {
            let app = App::build(&cfg)?;
            let orchestrator = app.orchestrator(&cfg).await?;
            let response = orchestrator.process(&query).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Classify { query } => {
            let reasoning = create_reasoning(&cfg.reasoning)?;
            let classifier = QueryClassifier::new(reasoning, reasoning_timeout(&cfg));
            println!("{}", classifier.classify(&query).await);
        }
        Commands::Ingest { path } => {
            let app = App::build(&cfg)?;
            let pipeline = app.pipeline(&cfg)?;
            match pipeline.ingest_file(&path).await? {
                IngestOutcome::Indexed {
                    id,
                    chars,
                    truncated,
                } => {
                    let note = if truncated { ", truncated" } else { "" };
                    println!("indexed {} ({} chars{})", id, chars, note);
                }
                IngestOutcome::Skipped { id, reason } => {
                    println!("skipped {}: {}", id, reason);
                }
            }
        }
        Commands::Remove { id } => {
            let store = open_store(&cfg);
            let removed = store.delete(&[id.clone()])?;
            if removed > 0 {
                println!("removed {}", id);
            } else {
                println!("{} not in store", id);
            }
        }
        Commands::Stats => {
            let store = open_store(&cfg);
            println!("Store:      {}", store.path().display());
            println!("Dimensions: {}", store.dims());
            println!("Documents:  {}", store.len());
            for id in store.ids() {
                println!("  {}", id);
            }
        }
    }

    Ok(())
}

/// Collaborators shared by the watcher and the query path.
struct App {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reasoning: Arc<dyn ReasoningClient>,
}

impl App {
    fn build(cfg: &Config) -> anyhow::Result<Self> {
        if !cfg.embedding.is_enabled() {
            warn!("embedding provider disabled; documents get zero vectors");
        }
        if !cfg.reasoning.is_enabled() {
            warn!("reasoning provider disabled; questions cannot be answered");
        }
        Ok(Self {
            store: Arc::new(open_store(cfg)),
            embedder: create_provider(&cfg.embedding, cfg.store.dims)?,
            reasoning: create_reasoning(&cfg.reasoning)?,
        })
    }

    fn pipeline(&self, cfg: &Config) -> anyhow::Result<IngestionPipeline> {
        IngestionPipeline::new(
            self.store.clone(),
            self.embedder.clone(),
            Arc::new(LocalExtractor),
            PipelineSettings::from_config(&cfg.watch),
        )
    }

    async fn orchestrator(&self, cfg: &Config) -> anyhow::Result<Orchestrator> {
        let structured = structured_engine(cfg, self.reasoning.clone()).await?;
        Ok(Orchestrator::new(
            QueryClassifier::new(self.reasoning.clone(), reasoning_timeout(cfg)),
            structured,
            self.store.clone(),
            self.embedder.clone(),
            self.reasoning.clone(),
            cfg.retrieval.top_k,
        ))
    }
}

fn open_store(cfg: &Config) -> VectorStore {
    VectorStore::load(&cfg.store.path, cfg.store.dims)
}

fn reasoning_timeout(cfg: &Config) -> Duration {
    Duration::from_secs(cfg.reasoning.timeout_secs)
}

async fn structured_engine(
    cfg: &Config,
    reasoning: Arc<dyn ReasoningClient>,
) -> anyhow::Result<Arc<dyn StructuredQueryEngine>> {
    match &cfg.structured.db_path {
        Some(path) => {
            let pool = connect_read_only(path).await?;
            Ok(Arc::new(SqlAgent::new(
                pool,
                reasoning,
                cfg.structured.schema.clone(),
            )))
        }
        None => Ok(Arc::new(DisabledStructured)),
    }
}

async fn run_interactive(
    pipeline: Arc<IngestionPipeline>,
    orchestrator: &Orchestrator,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let handle = pipeline.clone().spawn(cancel.clone());
    info!(dir = %pipeline.settings().dir.display(), "ready; reading queries from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }

        let output = match orchestrator.process(query).await {
            Ok(response) => serde_json::to_string(&response)?,
            Err(e) => {
                error!(error = %e, "query failed");
                serde_json::json!({ "error": e.to_string() }).to_string()
            }
        };
        println!("{}", output);
    }

    cancel.cancel();
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("watcher task failed: {}", e)),
    }
}
