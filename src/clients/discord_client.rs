//! Discord REST client
//!
//! Reads channel history and the guild channel directory over the v10 REST
//! API, honouring `429` rate-limit answers with a bounded number of retries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clients::MessageSource;
use crate::core::config::AppConfig;
use crate::core::models::{
    ChannelId, DirectoryEntry, GroupId, MessagePage, PageCursor, SourceMessage,
};
use crate::errors::RecapError;

/// Discord serves at most this many messages per history request.
pub const DISCORD_PAGE_LIMIT: usize = 100;

/// First millisecond of the Discord snowflake epoch (2015-01-01T00:00:00Z).
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

const TEXT_CHANNEL_TYPE: u8 = 0;

/// Upper bound on a single rate-limit wait, whatever the server asks for.
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct ApiAuthor {
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct ApiAttachment {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    #[serde(default)]
    content: String,
    timestamp: String,
    author: ApiAuthor,
    #[serde(default)]
    attachments: Vec<ApiAttachment>,
    #[serde(default)]
    webhook_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: Option<f64>,
}

impl ApiMessage {
    fn into_source(self) -> Result<SourceMessage, RecapError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| RecapError::ApiError {
                status: 200,
                message: format!("message {} has invalid timestamp: {e}", self.id),
            })?
            .with_timezone(&Utc);

        Ok(SourceMessage {
            author_is_bot: self.author.bot || self.webhook_id.is_some(),
            author: self
                .author
                .global_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(self.author.username),
            id: self.id,
            content: self.content,
            timestamp,
            attachments: self.attachments.into_iter().map(|a| a.url).collect(),
        })
    }
}

/// Lowest snowflake that can belong to a message created at `ts`.
#[must_use]
pub fn snowflake_for(ts: DateTime<Utc>) -> u64 {
    let ms = ts.timestamp_millis() - DISCORD_EPOCH_MS;
    u64::try_from(ms).map_or(0, |ms| ms << 22)
}

#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: Client,
    base_url: String,
    auth_header: String,
    max_retries: u32,
}

impl DiscordClient {
    /// # Errors
    ///
    /// Returns `RecapError::ConfigError` if the HTTP client cannot be built.
    pub fn new(
        token: &str,
        base_url: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, RecapError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecapError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            auth_header: format!("Bot {}", token.trim()),
            max_retries,
        })
    }

    /// # Errors
    ///
    /// Returns `RecapError::ConfigError` if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, RecapError> {
        Self::new(
            &config.discord_bot_token,
            &config.discord_api_base,
            config.request_timeout(),
            config.rate_limit_max_retries,
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RecapError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let resp = self
                .http
                .get(&url)
                .query(query)
                .header(reqwest::header::AUTHORIZATION, &self.auth_header)
                .send()
                .await
                .map_err(|e| RecapError::HttpError(format!("GET {path} failed: {e}")))?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempts > self.max_retries {
                    return Err(RecapError::RateLimited(format!(
                        "GET {path} still rate limited after {} retries",
                        self.max_retries
                    )));
                }

                let retry_after = Self::parse_retry_after(resp).await;
                warn!(
                    "Discord rate limited (429) on {}, waiting {:?} before retry (attempt {}/{})",
                    path, retry_after, attempts, self.max_retries
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            let status = resp.status();
            if !status.is_success() {
                let body = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(RecapError::ApiError {
                    status: status.as_u16(),
                    message: format!("GET {path}: {body}"),
                });
            }

            return resp.json::<T>().await.map_err(|e| RecapError::ApiError {
                status: status.as_u16(),
                message: format!("GET {path} returned an unparsable body: {e}"),
            });
        }
    }

    /// Reads the wait from the `Retry-After` header, then the JSON `retry_after` field.
    ///
    /// Falls back to one second when neither is usable and never exceeds `MAX_RETRY_WAIT`.
    async fn parse_retry_after(resp: Response) -> Duration {
        let from_header = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok());

        let seconds = match from_header {
            Some(secs) => Some(secs),
            None => resp
                .json::<RateLimitBody>()
                .await
                .ok()
                .and_then(|body| body.retry_after),
        };

        seconds
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(Duration::from_secs(1))
            .min(MAX_RETRY_WAIT)
    }
}

#[async_trait]
impl MessageSource for DiscordClient {
    fn page_limit(&self) -> usize {
        DISCORD_PAGE_LIMIT
    }

    async fn list_channels(&self, group: GroupId) -> Result<Vec<DirectoryEntry>, RecapError> {
        let channels: Vec<ApiChannel> = self
            .get_json(&format!("/guilds/{group}/channels"), &[])
            .await?;

        let entries = channels
            .into_iter()
            .filter_map(|c| {
                let id = c.id.parse::<ChannelId>().ok()?;
                Some(DirectoryEntry {
                    id,
                    name: c.name.unwrap_or_default(),
                    is_text: c.kind == TEXT_CHANNEL_TYPE,
                })
            })
            .collect::<Vec<_>>();

        debug!("Guild {} lists {} channel(s)", group, entries.len());
        Ok(entries)
    }

    async fn channel_name(&self, channel: ChannelId) -> Result<String, RecapError> {
        match self
            .get_json::<ApiChannel>(&format!("/channels/{channel}"), &[])
            .await
        {
            Ok(info) => Ok(info.name.unwrap_or_else(|| format!("channel-{channel}"))),
            Err(RecapError::ApiError { status: 404, .. }) => Err(RecapError::ResolutionError(
                format!("channel {channel} does not exist"),
            )),
            Err(e) => Err(e),
        }
    }

    async fn fetch_page(
        &self,
        channel: ChannelId,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<MessagePage, RecapError> {
        let limit = limit.clamp(1, DISCORD_PAGE_LIMIT);
        let after = match cursor {
            PageCursor::Since(ts) => snowflake_for(*ts).to_string(),
            PageCursor::AfterMessage(id) => id.clone(),
        };

        let raw: Vec<ApiMessage> = self
            .get_json(
                &format!("/channels/{channel}/messages"),
                &[("limit", limit.to_string()), ("after", after)],
            )
            .await?;

        let has_more = raw.len() >= limit;
        let messages = raw
            .into_iter()
            .map(ApiMessage::into_source)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MessagePage { messages, has_more })
    }
}
