use crate::errors::AppError;
use crate::models::{status_description, LookupResult};
use async_trait::async_trait;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Source of person lookups keyed by email.
///
/// Ordinary non-200 responses are returned as [`LookupResult`]s; only an
/// unreachable or unusable API yields [`AppError::Transport`].
#[async_trait]
pub trait PersonLookupClient: Send + Sync {
    async fn get_person(&self, email: &str) -> Result<LookupResult, AppError>;
}

/// Response layout requested from the person endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseStyle {
    #[default]
    Dictionary,
    List,
}

impl ResponseStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStyle::Dictionary => "dictionary",
            ResponseStyle::List => "list",
        }
    }
}

impl FromStr for ResponseStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dictionary" => Ok(ResponseStyle::Dictionary),
            "list" => Ok(ResponseStyle::List),
            other => Err(format!(
                "unknown response style '{}' (expected dictionary or list)",
                other
            )),
        }
    }
}

/// Client for the FullContact person API.
pub struct FullContactClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    style: ResponseStyle,
    delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl FullContactClient {
    /// Creates a new `FullContactClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://api.fullcontact.com/v2`.
    /// * `api_key` - Sent as the `apiKey` query parameter, never logged.
    /// * `style` - Response layout for social profiles and scores.
    /// * `delay` - Minimum spacing between two successive calls.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        base_url: &str,
        api_key: String,
        style: ResponseStyle,
        delay: Duration,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::Transport(format!("Failed to create FullContact client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/person.json", base_url.trim_end_matches('/')),
            api_key,
            style,
            delay,
            last_call: Mutex::new(None),
        })
    }

    /// Sleeps until `delay` has elapsed since the previous call started.
    async fn throttle(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.delay;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[async_trait]
impl PersonLookupClient for FullContactClient {
    async fn get_person(&self, email: &str) -> Result<LookupResult, AppError> {
        let url = reqwest::Url::parse_with_params(
            &self.endpoint,
            &[
                ("email", email),
                ("apiKey", self.api_key.as_str()),
                ("style", self.style.as_str()),
            ],
        )
        .map_err(|e| AppError::Transport(format!("Invalid person endpoint: {}", e)))?;

        self.throttle().await;
        tracing::debug!("GET {}?email={}&apiKey=***", self.endpoint, email);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Person lookup failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Transport(format!("Failed to read person response: {}", e)))?;

        parse_response(status, &body)
    }
}

/// Turns a raw HTTP status and body into a [`LookupResult`].
pub fn parse_response(status: u16, body: &str) -> Result<LookupResult, AppError> {
    let json = serde_json::from_str::<Value>(body).ok();

    let request_id = json
        .as_ref()
        .and_then(|v| v.get("requestId"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if status == 200 {
        let payload = json.ok_or_else(|| {
            AppError::Transport("Person lookup returned 200 with a non-JSON body".to_string())
        })?;
        return Ok(LookupResult::success(payload, request_id));
    }

    let message = match &json {
        Some(v) => v
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(status_description(status))
            .to_string(),
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status_description(status).to_string(),
    };

    Ok(LookupResult::new(status, None, request_id, message))
}
