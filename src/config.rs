use crate::person_client::ResponseStyle;
use crate::store::DuplicatePolicy;
use std::str::FromStr;
use std::time::Duration;

/// Which [`crate::store::RecordStore`] implementation to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Document,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "document" => Ok(StoreBackend::Document),
            other => Err(format!(
                "unknown store backend '{}' (expected sqlite or document)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub style: ResponseStyle,
    pub request_delay: Duration,
    pub request_timeout: Duration,
    pub backend: StoreBackend,
    pub database_url: String,
    pub document_store_path: String,
    pub duplicate_policy: DuplicatePolicy,
}

pub const DEFAULT_BASE_URL: &str = "https://api.fullcontact.com/v2";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:busybody.sqlite?mode=rwc";
pub const DEFAULT_DOCUMENT_STORE_PATH: &str = "busybody.json";

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            api_key: std::env::var("FULLCONTACT_API_KEY")
                .map_err(|_| anyhow::anyhow!("FULLCONTACT_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("FULLCONTACT_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            base_url: {
                let url = var_or("FULLCONTACT_BASE_URL", DEFAULT_BASE_URL);
                let parsed = url::Url::parse(&url).map_err(|e| {
                    anyhow::anyhow!("FULLCONTACT_BASE_URL is not a valid URL: {}", e)
                })?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    anyhow::bail!("FULLCONTACT_BASE_URL must start with http:// or https://");
                }
                url
            },
            style: var_or("FULLCONTACT_STYLE", "dictionary")
                .parse::<ResponseStyle>()
                .map_err(|e: String| anyhow::anyhow!("FULLCONTACT_STYLE: {}", e))?,
            request_delay: Duration::from_millis(
                var_or("REQUEST_DELAY_MS", "1000")
                    .parse::<u64>()
                    .map_err(|_| anyhow::anyhow!("REQUEST_DELAY_MS must be a whole number"))?,
            ),
            request_timeout: var_or("REQUEST_TIMEOUT_SECS", "30")
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("REQUEST_TIMEOUT_SECS must be a whole number"))
                .and_then(|secs| {
                    if secs == 0 {
                        anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
                    }
                    Ok(Duration::from_secs(secs))
                })?,
            backend: var_or("STORE_BACKEND", "sqlite")
                .parse::<StoreBackend>()
                .map_err(|e: String| anyhow::anyhow!("STORE_BACKEND: {}", e))?,
            database_url: {
                let url = var_or("DATABASE_URL", DEFAULT_DATABASE_URL);
                if !url.starts_with("sqlite:") {
                    anyhow::bail!("DATABASE_URL must start with sqlite:");
                }
                url
            },
            document_store_path: var_or("DOCUMENT_STORE_PATH", DEFAULT_DOCUMENT_STORE_PATH),
            duplicate_policy: var_or("DUPLICATE_POLICY", "fail")
                .parse::<DuplicatePolicy>()
                .map_err(|e: String| anyhow::anyhow!("DUPLICATE_POLICY: {}", e))?,
        };

        // Never log the API key
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("FullContact base URL: {}", config.base_url);
        tracing::debug!("Response style: {}", config.style.as_str());
        tracing::debug!(
            "Request delay: {:?}, timeout: {:?}",
            config.request_delay,
            config.request_timeout
        );
        tracing::debug!(
            "Store backend: {:?}, duplicate policy: {:?}",
            config.backend,
            config.duplicate_policy
        );

        Ok(config)
    }
}
