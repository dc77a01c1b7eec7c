use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tokio_retry::strategy::jitter;
use tokio_retry::{RetryIf, strategy::ExponentialBackoff};
use tracing::warn;

use crate::clients::SummaryRelay;
use crate::core::checkpoint::format_timestamp;
use crate::core::models::SummaryRecord;
use crate::errors::RecapError;

/// Discord rejects embed descriptions longer than this.
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;

const EMBED_COLOR: u32 = 0x00ff00;

/// Posts persisted summaries to a Discord webhook as an embed.
pub struct WebhookClient {
    http: Client,
    url: String,
}

impl WebhookClient {
    /// # Errors
    ///
    /// Returns `RecapError::ConfigError` if the HTTP client cannot be built.
    pub fn new(url: String, timeout: Duration) -> Result<Self, RecapError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecapError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, url })
    }

    async fn with_retry<F, Fut, T>(&self, operation: F) -> Result<T, RecapError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, RecapError>> + Send,
        T: Send,
    {
        let strategy = ExponentialBackoff::from_millis(10)
            .factor(25)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(2);

        // client errors other than 429 fail on the first answer
        RetryIf::spawn(strategy, operation, RecapError::is_transient)
            .await
            .map_err(|e| match e {
                RecapError::RelayError(_) => e,
                RecapError::ApiError { status, .. } => {
                    RecapError::RelayError(format!("webhook answered {status}"))
                }
                other => RecapError::RelayError(other.to_string()),
            })
    }
}

/// Builds the embed payload for one summary record.
#[must_use]
pub fn build_embed_payload(record: &SummaryRecord) -> Value {
    let description = clip_chars(&record.summary, EMBED_DESCRIPTION_LIMIT);

    json!({
        "embeds": [{
            "title": format!("{} channel summary", record.channel_name),
            "description": description,
            "color": EMBED_COLOR,
            "timestamp": format_timestamp(record.summary_timestamp),
            "fields": [
                {
                    "name": "Messages",
                    "value": record.messages_count.to_string(),
                    "inline": true
                },
                {
                    "name": "Period",
                    "value": format!(
                        "{} to {}",
                        record.period_start.format("%Y-%m-%d %H:%M UTC"),
                        record.period_end.format("%Y-%m-%d %H:%M UTC")
                    ),
                    "inline": true
                }
            ]
        }]
    })
}

fn clip_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(limit.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

#[async_trait]
impl SummaryRelay for WebhookClient {
    async fn relay(&self, record: &SummaryRecord) -> Result<(), RecapError> {
        let payload = build_embed_payload(record);

        self.with_retry(|| async {
            let resp = self
                .http
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| RecapError::HttpError(format!("webhook request failed: {e}")))?;

            let status = resp.status();
            if status.is_success() {
                return Ok(());
            }
            warn!("Webhook answered {} for {}", status, record.channel_name);
            if status == StatusCode::TOO_MANY_REQUESTS {
                Err(RecapError::RateLimited(format!("webhook answered {status}")))
            } else if status.is_server_error() {
                Err(RecapError::ApiError {
                    status: status.as_u16(),
                    message: "webhook unavailable".into(),
                })
            } else {
                Err(RecapError::RelayError(format!("webhook answered {status}")))
            }
        })
        .await
    }
}
