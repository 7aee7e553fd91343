use std::path::PathBuf;
use std::sync::Arc;

use busybody::config::{Config, StoreBackend};
use busybody::db::Database;
use busybody::db_storage::SqliteStore;
use busybody::document_store::DocumentStore;
use busybody::export;
use busybody::input::read_emails;
use busybody::orchestrator::LookupOrchestrator;
use busybody::person_client::FullContactClient;
use busybody::store::{DuplicatePolicy, FailureFilter, RecordStore};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Email-keyed person enrichment against the FullContact API.
#[derive(Parser, Debug)]
#[command(name = "busybody", version, about)]
struct Cli {
    /// Storage backend (overrides STORE_BACKEND)
    #[arg(long, value_enum)]
    backend: Option<StoreBackend>,

    /// What to do when an email already has a stored identity (overrides DUPLICATE_POLICY)
    #[arg(long)]
    duplicate_policy: Option<DuplicatePolicy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up every email in a CSV file with an `email` column
    Lookup { input: PathBuf },
    /// Retry every pending ledger entry
    Retry,
    /// Write the denormalized identity view as CSV
    ExportUsers { output: PathBuf },
    /// Write the failure ledger as CSV
    ExportFailures {
        output: PathBuf,
        /// Include entries whose retries are complete
        #[arg(long)]
        include_completed: bool,
    },
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.backend {
        StoreBackend::Sqlite => {
            let db = Database::new(&config.database_url).await?;
            tracing::info!("Database connection pool established");
            Arc::new(SqliteStore::new(db.pool, config.duplicate_policy))
        }
        StoreBackend::Document => Arc::new(
            DocumentStore::open(&config.document_store_path, config.duplicate_policy).await?,
        ),
    };
    Ok(store)
}

async fn run(
    command: Command,
    config: &Config,
    store: Arc<dyn RecordStore>,
) -> anyhow::Result<()> {
    match command {
        Command::Lookup { input } => {
            let emails = read_emails(&input)?;
            let summary = orchestrator(config, store)?.run_batch(&emails).await?;
            tracing::info!("Lookup complete: {}", summary);
        }
        Command::Retry => {
            let summary = orchestrator(config, store)?.retry_batch().await?;
            tracing::info!("Retry complete: {}", summary);
        }
        Command::ExportUsers { output } => {
            let rows = store.export_users().await?;
            export::export_users_to(&output, &rows)?;
        }
        Command::ExportFailures {
            output,
            include_completed,
        } => {
            let filter = if include_completed {
                FailureFilter::All
            } else {
                FailureFilter::Active
            };
            let rows = store.export_failures(filter).await?;
            export::export_failures_to(&output, &rows)?;
        }
    }
    Ok(())
}

fn orchestrator(
    config: &Config,
    store: Arc<dyn RecordStore>,
) -> anyhow::Result<LookupOrchestrator> {
    let client = FullContactClient::new(
        &config.base_url,
        config.api_key.clone(),
        config.style,
        config.request_delay,
        config.request_timeout,
    )?;
    tracing::info!("✓ FullContact client initialized: {}", config.base_url);
    Ok(LookupOrchestrator::new(Arc::new(client), store))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busybody=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(policy) = cli.duplicate_policy {
        config.duplicate_policy = policy;
    }

    let store = open_store(&config).await?;
    let outcome = run(cli.command, &config, Arc::clone(&store)).await;

    // Flush even when the command failed
    if let Err(e) = store.close().await {
        tracing::error!("Failed to close store: {}", e);
    }

    outcome
}
