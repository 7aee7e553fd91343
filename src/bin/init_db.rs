//! Creates the sqlite database and its schema.
//!
//! Refuses to touch an existing database file unless `--force` is given.

use busybody::db::{self, Database};
use clap::Parser;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "init_db", about = "Create the busybody sqlite schema")]
struct Args {
    /// Database URL (defaults to DATABASE_URL or the built-in default)
    #[arg(long, env = "DATABASE_URL", default_value = busybody::config::DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Run even if the database file already exists
    #[arg(long)]
    force: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busybody=info,init_db=info".into()),
        )
        .init();

    // Must run before Args::parse for the DATABASE_URL env fallback
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if !args.database_url.starts_with("sqlite:") {
        anyhow::bail!("database URL must start with sqlite:");
    }

    if let Some(path) = db::sqlite_file_path(&args.database_url) {
        if Path::new(path).exists() && !args.force {
            anyhow::bail!(
                "{} already exists; pass --force to re-run the schema bootstrap",
                path
            );
        }
    }

    let db = Database::new(&args.database_url).await?;
    db.pool.close().await;

    tracing::info!("✓ Schema initialized at {}", args.database_url);
    Ok(())
}
