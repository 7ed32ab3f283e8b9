//! # manual-assist CLI (`massist`)
//!
//! Ingests equipment service manuals and answers maintenance questions
//! grounded in them.
//!
//! ## Usage
//!
//! ```bash
//! massist --config ./config/massist.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `massist init` | Create the SQLite database and run schema migrations |
//! | `massist ingest <file>` | Run one PDF through the ingestion pipeline |
//! | `massist ask "<question>"` | Answer a question from the indexed manuals |
//! | `massist stats` | Show chunk and document counts |
//! | `massist serve` | Start the HTTP server |
//! | `massist completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! massist init
//! massist ingest ./SD70_service_manual.pdf
//! massist ask "How do I replace the traction motor brush holder?"
//! massist ask "And the torque for those bolts?" --history ./conversation.json
//! massist serve
//! ```

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use manual_assist::auth::Principal;
use manual_assist::config::{self, Config};
use manual_assist::extract::MIME_PDF;
use manual_assist::migrate;
use manual_assist::models::{ConversationTurn, QueryRequest, SourceDocument, StorageEvent};
use manual_assist::prompt::{recent_history, HISTORY_WINDOW};
use manual_assist::server;
use manual_assist::services::Services;
use manual_assist::stats;

/// manual-assist: question answering over equipment service manuals.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/massist.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "massist",
    about = "manual-assist: question answering over equipment service manuals",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/massist.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Ingest one local document.
    ///
    /// The document goes through the same trigger filter as an upload
    /// notification, so it must be a PDF whose name starts with the
    /// configured prefix.
    Ingest {
        /// Path to the document.
        file: PathBuf,

        /// Storage name recorded as the chunks' source document
        /// (default: `<prefix><file name>`).
        #[arg(long)]
        name: Option<String>,

        /// Content type of the document.
        #[arg(long, default_value = MIME_PDF)]
        content_type: String,
    },

    /// Ask a question.
    Ask {
        /// The question.
        question: String,

        /// JSON file with earlier turns: `[{"role": "user", "content": "..."}, ...]`.
        /// Only the most recent six are sent.
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Show index statistics.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "massist", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            name,
            content_type,
        } => {
            run_ingest(&cfg, &file, name, content_type).await?;
        }
        Commands::Ask { question, history } => {
            run_ask(&cfg, question, history.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

async fn run_ingest(
    cfg: &Config,
    file: &Path,
    name: Option<String>,
    content_type: String,
) -> Result<()> {
    let name = match name {
        Some(n) => n,
        None => {
            let file_name = file
                .file_name()
                .and_then(|f| f.to_str())
                .with_context(|| format!("Invalid file name: {}", file.display()))?;
            format!("{}{}", cfg.ingest.prefix, file_name)
        }
    };

    let event = StorageEvent {
        bucket: "local".to_string(),
        name,
        content_type,
    };

    let services = Services::init(cfg).await?;
    let pipeline = services.pipeline();
    if !pipeline.accepts(&event) {
        println!(
            "Ignored {}: not a PDF under '{}'.",
            event.name, cfg.ingest.prefix
        );
        return Ok(());
    }

    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let report = pipeline
        .ingest_document(SourceDocument {
            id: event.name.clone(),
            content,
            content_type: event.content_type,
        })
        .await
        .with_context(|| format!("Ingestion of {} failed", event.name))?;

    println!("Ingested {}", report.document_id);
    println!("  chunks found:    {}", report.chunks_found);
    println!("  chunks written:  {}", report.chunks_written);
    println!("  chunks dropped:  {}", report.chunks_dropped);
    Ok(())
}

async fn run_ask(cfg: &Config, question: String, history: Option<&Path>) -> Result<()> {
    let history: Vec<ConversationTurn> = match history {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read history file: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid history file: {}", path.display()))?
        }
        None => Vec::new(),
    };

    let services = Services::init(cfg).await?;
    let request = QueryRequest {
        question,
        history: recent_history(&history, HISTORY_WINDOW),
    };

    match services
        .orchestrator()
        .answer(Some(&Principal::local()), request)
        .await
    {
        Ok(resp) => {
            println!("{}", resp.response);
            Ok(())
        }
        Err(e) => bail!("{} ({})", e, e.code()),
    }
}
