use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use agent_mem_gateway::server;
use agent_mem_gateway::state::AppState;
use agent_mem_knowledge::{
    watcher, EmbedderClient, Ingester, KnowledgeStore, LlmClient, Searcher, Settings,
};

#[derive(Parser)]
#[command(name = "agent-mem", version, about = "Local-first knowledge middleware for AI agents")]
struct Cli {
    /// Settings file path (default: nearest config/settings.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the memory tools over stdio
    Serve,
    /// Watch the configured roots and ingest changes
    Watch,
    /// Drop and recreate the schema (required when the embedding dimension changes)
    ResetSchema,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Log to stderr so stdout stays clean for the tool protocol.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let store = KnowledgeStore::connect(&settings.storage.database_url).await?;
    let reset = matches!(cli.command, Command::ResetSchema);
    store
        .ensure_schema(settings.embedding.dimension, reset)
        .await?;
    if reset {
        info!("schema recreated with VECTOR({})", settings.embedding.dimension);
        store.close().await;
        return Ok(());
    }

    let llm = Arc::new(LlmClient::new(&settings));
    let embedder = Arc::new(EmbedderClient::new(&settings));
    let searcher = Arc::new(Searcher::new(
        settings.clone(),
        store.clone(),
        llm.clone(),
        embedder.clone(),
    ));
    let ingester = Arc::new(Ingester::new(
        settings.clone(),
        store.clone(),
        llm,
        embedder,
    ));

    let state = Arc::new(AppState {
        settings: settings.clone(),
        store: store.clone(),
        ingester: ingester.clone(),
        searcher,
    });

    match cli.command {
        Command::Serve => {
            server::serve_stdio(state).await?;
        }
        Command::Watch => {
            watcher::run_watcher(settings, ingester).await?;
        }
        Command::ResetSchema => unreachable!("handled above"),
    }

    // The watcher's event source is gone by the time we get here; drain
    // the pool last.
    store.close().await;
    Ok(())
}
