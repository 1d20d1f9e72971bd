use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use llmrag::{CollectionId, RagContext, RagError, Settings};
use tracing_subscriber::EnvFilter;

mod commands;

/// Ingest documents and ask grounded questions about them.
#[derive(Parser, Debug)]
#[command(name = "llmrag", version, about, long_about = None)]
pub struct Cli {
    /// YAML settings file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed and store a document
    Ingest {
        /// JSON array of {"text", "source_id"} elements, or a plain text file
        file: PathBuf,
        #[command(flatten)]
        target: Target,
        /// Replace the collection even if it is already populated
        #[arg(long)]
        force: bool,
    },

    /// Answer one question from an ingested document
    Ask {
        question: String,
        #[command(flatten)]
        target: Target,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Ask questions interactively
    Chat {
        #[command(flatten)]
        target: Target,
    },

    /// Inspect or delete collections
    Collections {
        #[command(subcommand)]
        command: CollectionCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum CollectionCommands {
    /// List every collection
    List,
    /// Show statistics for one collection
    Stats {
        #[command(flatten)]
        target: Target,
    },
    /// Delete one collection
    Delete {
        #[command(flatten)]
        target: Target,
    },
}

/// The `(document, user)` pair naming a collection.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Document identifier
    #[arg(short, long)]
    document: String,
    /// User or session identifier
    #[arg(short, long, default_value = "default")]
    user: String,
}

impl Target {
    fn collection(&self) -> CollectionId {
        CollectionId::new(&self.document, &self.user)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

fn init_tracing(verbose: bool) {
    let default =
        if verbose { "llmrag=debug,llmrag_cli=debug" } else { "llmrag=info,llmrag_cli=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let context = RagContext::from_settings(settings).await?;
    let outcome = commands::execute(&context, cli.command).await;
    context.close().await?;
    outcome
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<RagError>() {
                Some(rag) => eprintln!("error[{}]: {rag}", rag.kind()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
