use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Tables for identities, their child records and the failure ledger.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS user (
        user_id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        first_name TEXT,
        last_name TEXT,
        match_likelihood REAL NOT NULL DEFAULT 0.0,
        create_dt TEXT NOT NULL,
        update_dt TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_address (
        user_address_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES user(user_id),
        location_general TEXT,
        city_name TEXT,
        city_is_deduced INTEGER,
        county_name TEXT,
        county_is_deduced INTEGER,
        state_name TEXT,
        state_code TEXT,
        state_is_deduced INTEGER,
        country_name TEXT,
        country_code TEXT,
        country_is_deduced INTEGER,
        continent_name TEXT,
        continent_is_deduced INTEGER,
        address_likelihood REAL,
        create_dt TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_demography (
        user_demography_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES user(user_id),
        gender TEXT,
        age INTEGER,
        age_range_min INTEGER,
        age_range_max INTEGER,
        create_dt TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_organization (
        user_organization_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES user(user_id),
        organization_name TEXT,
        title TEXT,
        start_date TEXT,
        end_date TEXT,
        is_current INTEGER NOT NULL DEFAULT 0,
        is_primary INTEGER NOT NULL DEFAULT 0,
        create_dt TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_topic (
        user_topic_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES user(user_id),
        provider TEXT NOT NULL,
        topic TEXT NOT NULL,
        create_dt TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_model_score (
        user_model_score_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES user(user_id),
        provider TEXT NOT NULL,
        type TEXT NOT NULL,
        score_value REAL,
        create_dt TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_profile (
        user_profile_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES user(user_id),
        profile_type TEXT NOT NULL,
        network_id TEXT,
        network_name TEXT,
        profile_url TEXT,
        profile_id TEXT,
        user_name TEXT,
        user_bio TEXT,
        followers INTEGER,
        following INTEGER,
        user_feed TEXT,
        create_dt TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS failure_log (
        failure_log_id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL,
        initial_status INTEGER NOT NULL,
        message TEXT NOT NULL,
        request_id TEXT NOT NULL,
        create_dt TEXT NOT NULL,
        most_recent_retry_dt TEXT,
        most_recent_retry_status INTEGER,
        retry_count INTEGER NOT NULL DEFAULT 0,
        retry_complete INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_failure_log_request_id ON failure_log (request_id)",
    "CREATE INDEX IF NOT EXISTS idx_failure_log_pending ON failure_log (retry_complete, initial_status)",
    "CREATE INDEX IF NOT EXISTS idx_failure_log_email ON failure_log (email)",
];

pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the sqlite database and bootstraps the schema.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // In-memory databases exist per connection, so keep exactly one alive.
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        initialize_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory database, used by tests.
    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::new("sqlite::memory:").await
    }
}

pub async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await?;
    }
    Ok(())
}

/// Filesystem path behind a `sqlite:` URL, or `None` for in-memory databases.
pub fn sqlite_file_path(database_url: &str) -> Option<&str> {
    let rest = database_url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.contains(":memory:") {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_file_path() {
        assert_eq!(
            sqlite_file_path("sqlite:busybody.sqlite?mode=rwc"),
            Some("busybody.sqlite")
        );
        assert_eq!(sqlite_file_path("sqlite://data/bb.db"), Some("data/bb.db"));
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn test_schema_bootstrap_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        initialize_schema(&db.pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'user%'",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(count, 7);
    }
}
