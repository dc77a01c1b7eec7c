//! LLM (OpenAI) API client module
//!
//! Encapsulates the chat-completions call used to generate summaries.

use async_trait::async_trait;
use openai_api_rs::v1::chat_completion::{ChatCompletionMessage, Content, MessageRole};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use crate::clients::TextGenerator;
use crate::core::config::AppConfig;
use crate::errors::RecapError;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4 + 1
}

/// LLM API client for generating summaries
pub struct LlmClient {
    http: Client,
    api_key: String,
    base_url: String,
    model_name: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
    /// # Errors
    ///
    /// Returns `RecapError::ConfigError` if the HTTP client cannot be built.
    pub fn new(
        api_key: String,
        base_url: &str,
        model_name: String,
        timeout: Duration,
    ) -> Result<Self, RecapError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecapError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            model_name,
            max_tokens: 1000,
            temperature: 0.3,
        })
    }

    /// # Errors
    ///
    /// Returns `RecapError::ConfigError` if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, RecapError> {
        Ok(Self::new(
            config.openai_api_key.clone(),
            &config.openai_base_url,
            config.openai_model.clone(),
            config.generation_timeout(),
        )?
        .with_sampling(config.generation_max_tokens, config.generation_temperature))
    }

    #[must_use]
    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    fn request_body(&self, prompt: &[ChatCompletionMessage]) -> Value {
        let messages: Vec<Value> = prompt
            .iter()
            .map(|msg| {
                let role_str = match msg.role {
                    MessageRole::system => "system",
                    MessageRole::user => "user",
                    MessageRole::assistant => "assistant",
                    MessageRole::function => "function",
                    MessageRole::tool => "tool",
                    #[allow(unreachable_patterns)]
                    _ => "user",
                };

                let content_val = match &msg.content {
                    Content::Text(text) => json!(text),
                    _ => json!(""),
                };

                json!({
                    "role": role_str,
                    "content": content_val
                })
            })
            .collect();

        json!({
            "model": self.model_name,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        })
    }
}

/// Pulls `choices[0].message.content` out of a chat-completions response.
fn extract_completion_text(response_json: &Value) -> Option<String> {
    response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: Vec<ChatCompletionMessage>) -> Result<String, RecapError> {
        #[cfg(feature = "debug-logs")]
        info!("Using ChatGPT prompt:\n{:?}", prompt);

        let estimated_input_tokens = prompt
            .iter()
            .map(|msg| match &msg.content {
                Content::Text(text) => estimate_tokens(text),
                _ => 0,
            })
            .sum::<usize>();
        info!(
            "Requesting summary from {} ({} prompt messages, ~{} input tokens)",
            self.model_name,
            prompt.len(),
            estimated_input_tokens
        );

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&prompt))
            .send()
            .await
            .map_err(|e| RecapError::GenerationError(format!("OpenAI API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RecapError::GenerationError(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            RecapError::GenerationError(format!("Failed to parse OpenAI response: {}", e))
        })?;

        extract_completion_text(&response_json)
            .ok_or_else(|| RecapError::GenerationError("No text in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn user(text: &str) -> ChatCompletionMessage {
        ChatCompletionMessage {
            role: MessageRole::user,
            content: Content::Text(text.to_string()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn client(server: &MockServer) -> LlmClient {
        LlmClient::new(
            "sk-test".into(),
            &server.base_url(),
            "gpt-4o-mini".into(),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_sampling(500, 0.2)
    }

    #[test]
    fn extracts_first_choice_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "  Summary  "}}]});
        assert_eq!(extract_completion_text(&body).as_deref(), Some("Summary"));
        assert_eq!(extract_completion_text(&json!({"choices": []})), None);
        assert_eq!(
            extract_completion_text(&json!({"choices": [{"message": {"content": ""}}]})),
            None
        );
    }

    #[tokio::test]
    async fn generate_posts_chat_completion_with_sampling_caps() {
        let server = MockServer::start_async().await;
        let completion = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test")
                .body_includes("\"model\":\"gpt-4o-mini\"")
                .body_includes("\"max_tokens\":500");
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": "Team shipped v2."}}]
            }));
        });

        let text = client(&server).generate(vec![user("hello")]).await.unwrap();
        completion.assert_calls(1);
        assert_eq!(text, "Team shipped v2.");
    }

    #[tokio::test]
    async fn quota_error_becomes_generation_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(429)
                .json_body(json!({"error": {"message": "insufficient_quota"}}));
        });

        let err = client(&server).generate(vec![user("hello")]).await.unwrap_err();
        match err {
            RecapError::GenerationError(msg) => assert!(msg.contains("insufficient_quota")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({"choices": []}));
        });

        let err = client(&server).generate(vec![user("hello")]).await.unwrap_err();
        assert!(matches!(err, RecapError::GenerationError(_)));
    }
}
