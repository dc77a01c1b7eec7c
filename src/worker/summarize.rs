use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::clients::TextGenerator;
use crate::core::config::AppConfig;
use crate::core::models::MessageBatch;
use crate::errors::RecapError;
use crate::prompt::{NO_ACTIVITY_SUMMARY, build_prompt, format_period_bound, render_transcript};

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub language: String,
    pub timezone: Tz,
    pub max_transcript_chars: usize,
}

impl SummarizerSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            language: config.summary_language.clone(),
            timezone: config.summary_timezone,
            max_transcript_chars: config.max_transcript_chars,
        }
    }
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            timezone: Tz::UTC,
            max_transcript_chars: 24_000,
        }
    }
}

/// Turns a message batch into summary text through a [`TextGenerator`].
pub struct Summarizer<'a> {
    generator: &'a dyn TextGenerator,
    settings: SummarizerSettings,
}

impl<'a> Summarizer<'a> {
    pub fn new(generator: &'a dyn TextGenerator, settings: SummarizerSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// An empty batch yields [`NO_ACTIVITY_SUMMARY`] without calling the generator.
    ///
    /// # Errors
    ///
    /// Every generator failure, including an empty answer, is reported as
    /// `RecapError::GenerationError`.
    pub async fn summarize(
        &self,
        channel_name: &str,
        batch: &MessageBatch,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<String, RecapError> {
        if batch.is_empty() {
            debug!("No messages for #{}, using canned summary", channel_name);
            return Ok(NO_ACTIVITY_SUMMARY.to_string());
        }

        let transcript = render_transcript(
            &batch.messages,
            self.settings.timezone,
            self.settings.max_transcript_chars,
        );
        let prompt = build_prompt(
            channel_name,
            &transcript,
            &format_period_bound(period_start, self.settings.timezone),
            &format_period_bound(period_end, self.settings.timezone),
            &self.settings.language,
        );

        #[cfg(not(feature = "debug-logs"))]
        info!(
            "Summarizing {} message(s) from #{} ({} transcript chars)",
            batch.len(),
            channel_name,
            transcript.chars().count()
        );
        #[cfg(feature = "debug-logs")]
        info!("Transcript for #{}:\n{}", channel_name, transcript);

        let summary = match self.generator.generate(prompt).await {
            Ok(text) => text,
            Err(e @ (RecapError::GenerationError(_) | RecapError::Cancelled)) => return Err(e),
            Err(e) => return Err(RecapError::GenerationError(e.to_string())),
        };

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(RecapError::GenerationError(
                "generation service returned an empty summary".into(),
            ));
        }
        Ok(summary.to_string())
    }
}
