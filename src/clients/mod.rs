//! Client modules for external API interactions
//!
//! The orchestrator only sees the traits below, so any message source,
//! generation backend or relay can be wired in.

use async_trait::async_trait;
use openai_api_rs::v1::chat_completion::ChatCompletionMessage;

use crate::core::models::{
    ChannelId, DirectoryEntry, GroupId, MessagePage, PageCursor, SummaryRecord,
};
use crate::errors::RecapError;

pub mod discord_client;
pub mod llm_client;
pub mod webhook_client;

pub use discord_client::DiscordClient;
pub use llm_client::LlmClient;
pub use webhook_client::WebhookClient;

/// Paged read access to channel history plus the guild channel directory.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Largest page the source serves in one request.
    fn page_limit(&self) -> usize;

    async fn list_channels(&self, group: GroupId) -> Result<Vec<DirectoryEntry>, RecapError>;

    /// Display name of a channel. A channel that does not exist yields `ResolutionError`.
    async fn channel_name(&self, channel: ChannelId) -> Result<String, RecapError>;

    async fn fetch_page(
        &self,
        channel: ChannelId,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<MessagePage, RecapError>;
}

/// Single-shot text generation from a chat prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: Vec<ChatCompletionMessage>) -> Result<String, RecapError>;
}

/// Best-effort notification of a persisted summary.
#[async_trait]
pub trait SummaryRelay: Send + Sync {
    async fn relay(&self, record: &SummaryRecord) -> Result<(), RecapError>;
}
