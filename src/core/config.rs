use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::core::models::{ChannelRef, GroupId};
use crate::errors::RecapError;

pub const DEFAULT_CONFIG_FILE: &str = "recap.toml";
pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord_bot_token: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub discord_api_base: String,
    pub guild_id: Option<GroupId>,
    pub channels: Vec<ChannelRef>,
    pub summary_interval_hours: u64,
    pub max_messages_per_channel: usize,
    pub summary_dir: PathBuf,
    pub checkpoint_file: PathBuf,
    pub webhook_url: Option<String>,
    pub include_raw_messages: bool,
    pub summary_language: String,
    pub summary_timezone: Tz,
    pub max_concurrent_channels: usize,
    pub request_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub generation_max_tokens: u32,
    pub generation_temperature: f32,
    pub max_transcript_chars: usize,
    pub rate_limit_max_retries: u32,
}

/// Values read from the optional TOML file. Credentials are environment-only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub discord_api_base: Option<String>,
    pub guild_id: Option<String>,
    pub channels: Option<Vec<String>>,
    pub summary_interval_hours: Option<u64>,
    pub max_messages_per_channel: Option<usize>,
    pub summary_dir: Option<PathBuf>,
    pub checkpoint_file: Option<PathBuf>,
    pub webhook_url: Option<String>,
    pub include_raw_messages: Option<bool>,
    pub summary_language: Option<String>,
    pub summary_timezone: Option<String>,
    pub max_concurrent_channels: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub generation_timeout_secs: Option<u64>,
    pub generation_max_tokens: Option<u32>,
    pub generation_temperature: Option<f32>,
    pub max_transcript_chars: Option<usize>,
    pub rate_limit_max_retries: Option<u32>,
}

impl PartialConfig {
    /// Reads `RECAP_CONFIG_PATH` if set (must exist), else `./recap.toml` if present.
    ///
    /// # Errors
    ///
    /// Returns `RecapError::ConfigError` for an unreadable or invalid file.
    pub fn discover() -> Result<Self, RecapError> {
        match env::var("RECAP_CONFIG_PATH") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim())),
            _ => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// # Errors
    ///
    /// Returns `RecapError::ConfigError` for an unreadable or invalid file.
    pub fn from_file(path: &Path) -> Result<Self, RecapError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            RecapError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw).map_err(|e| {
            RecapError::ConfigError(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

impl AppConfig {
    /// Loads `config_path` (or the discovered config file, if any) and applies
    /// process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `RecapError::ConfigError` when a required value is missing or invalid.
    pub fn load(config_path: Option<&Path>) -> Result<Self, RecapError> {
        let file = match config_path {
            Some(path) => PartialConfig::from_file(path)?,
            None => PartialConfig::discover()?,
        };
        Self::from_sources(file, |key| env::var(key).ok())
    }

    /// Builds the config from file values, letting `lookup` (usually the environment) override them.
    ///
    /// # Errors
    ///
    /// Returns `RecapError::ConfigError` when a required value is missing or invalid.
    pub fn from_sources<F>(file: PartialConfig, lookup: F) -> Result<Self, RecapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let discord_bot_token = get("DISCORD_BOT_TOKEN")
            .ok_or_else(|| RecapError::ConfigError("DISCORD_BOT_TOKEN is not set".into()))?;
        let openai_api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| RecapError::ConfigError("OPENAI_API_KEY is not set".into()))?;

        let channel_tokens: Vec<String> = match get("CHANNEL_IDS") {
            Some(csv) => csv.split(',').map(str::to_string).collect(),
            None => file.channels.clone().unwrap_or_default(),
        };
        let channels = parse_channel_refs(&channel_tokens)?;

        let guild_id = match get("GUILD_ID").or(file.guild_id.clone()) {
            Some(raw) => Some(GroupId(raw.trim().parse::<u64>().map_err(|e| {
                RecapError::ConfigError(format!("GUILD_ID {raw:?} is not a numeric id: {e}"))
            })?)),
            None => None,
        };

        let timezone_name = get("SUMMARY_TIMEZONE")
            .or(file.summary_timezone.clone())
            .unwrap_or_else(|| "UTC".to_string());
        let summary_timezone = timezone_name.parse::<Tz>().map_err(|e| {
            RecapError::ConfigError(format!("SUMMARY_TIMEZONE {timezone_name:?}: {e}"))
        })?;

        let config = Self {
            discord_bot_token,
            openai_api_key,
            openai_model: get("OPENAI_MODEL")
                .or(file.openai_model)
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .or(file.openai_base_url)
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            discord_api_base: get("DISCORD_API_BASE")
                .or(file.discord_api_base)
                .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_string()),
            guild_id,
            channels,
            summary_interval_hours: parse_or(
                get("SUMMARY_INTERVAL_HOURS"),
                "SUMMARY_INTERVAL_HOURS",
                file.summary_interval_hours.unwrap_or(3),
            )?,
            max_messages_per_channel: parse_or(
                get("MAX_MESSAGES_PER_CHANNEL"),
                "MAX_MESSAGES_PER_CHANNEL",
                file.max_messages_per_channel.unwrap_or(100),
            )?,
            summary_dir: get("SUMMARY_DIR")
                .map(PathBuf::from)
                .or(file.summary_dir)
                .unwrap_or_else(|| PathBuf::from("summaries")),
            checkpoint_file: get("CHECKPOINT_FILE")
                .map(PathBuf::from)
                .or(file.checkpoint_file)
                .unwrap_or_else(|| PathBuf::from("last_run.json")),
            webhook_url: get("DISCORD_WEBHOOK_URL").or(file.webhook_url),
            include_raw_messages: parse_bool_or(
                get("INCLUDE_RAW_MESSAGES"),
                "INCLUDE_RAW_MESSAGES",
                file.include_raw_messages.unwrap_or(true),
            )?,
            summary_language: get("SUMMARY_LANGUAGE")
                .or(file.summary_language)
                .unwrap_or_else(|| "English".to_string()),
            summary_timezone,
            max_concurrent_channels: parse_or(
                get("MAX_CONCURRENT_CHANNELS"),
                "MAX_CONCURRENT_CHANNELS",
                file.max_concurrent_channels.unwrap_or(4),
            )?,
            request_timeout_secs: parse_or(
                get("REQUEST_TIMEOUT_SECS"),
                "REQUEST_TIMEOUT_SECS",
                file.request_timeout_secs.unwrap_or(30),
            )?,
            generation_timeout_secs: parse_or(
                get("GENERATION_TIMEOUT_SECS"),
                "GENERATION_TIMEOUT_SECS",
                file.generation_timeout_secs.unwrap_or(120),
            )?,
            generation_max_tokens: parse_or(
                get("GENERATION_MAX_TOKENS"),
                "GENERATION_MAX_TOKENS",
                file.generation_max_tokens.unwrap_or(1000),
            )?,
            generation_temperature: parse_or(
                get("GENERATION_TEMPERATURE"),
                "GENERATION_TEMPERATURE",
                file.generation_temperature.unwrap_or(0.3),
            )?,
            max_transcript_chars: parse_or(
                get("MAX_TRANSCRIPT_CHARS"),
                "MAX_TRANSCRIPT_CHARS",
                file.max_transcript_chars.unwrap_or(24_000),
            )?,
            rate_limit_max_retries: parse_or(
                get("RATE_LIMIT_MAX_RETRIES"),
                "RATE_LIMIT_MAX_RETRIES",
                file.rate_limit_max_retries.unwrap_or(5),
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), RecapError> {
        if self.channels.is_empty() {
            return Err(RecapError::ConfigError(
                "CHANNEL_IDS must list at least one channel".into(),
            ));
        }
        if self.guild_id.is_none() && self.channels.iter().any(ChannelRef::is_name) {
            return Err(RecapError::ConfigError(
                "GUILD_ID is required to resolve channel names".into(),
            ));
        }
        if self.summary_interval_hours == 0 {
            return Err(RecapError::ConfigError(
                "SUMMARY_INTERVAL_HOURS must be at least 1".into(),
            ));
        }
        if self.summary_interval_hours > MAX_SUMMARY_INTERVAL_HOURS {
            return Err(RecapError::ConfigError(format!(
                "SUMMARY_INTERVAL_HOURS must be at most {MAX_SUMMARY_INTERVAL_HOURS}"
            )));
        }
        if self.max_messages_per_channel == 0 {
            return Err(RecapError::ConfigError(
                "MAX_MESSAGES_PER_CHANNEL must be at least 1".into(),
            ));
        }
        if self.max_concurrent_channels == 0 {
            return Err(RecapError::ConfigError(
                "MAX_CONCURRENT_CHANNELS must be at least 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation_temperature) {
            return Err(RecapError::ConfigError(
                "GENERATION_TEMPERATURE must be between 0 and 2".into(),
            ));
        }
        for (name, value) in [
            ("DISCORD_API_BASE", Some(&self.discord_api_base)),
            ("OPENAI_BASE_URL", Some(&self.openai_base_url)),
            ("DISCORD_WEBHOOK_URL", self.webhook_url.as_ref()),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw)
                    .map_err(|e| RecapError::ConfigError(format!("{name} {raw:?}: {e}")))?;
            }
        }
        Ok(())
    }

    /// Default look-back for channels without a checkpoint, also the watch-loop period.
    #[must_use]
    pub fn summary_interval(&self) -> TimeDelta {
        let hours = self.summary_interval_hours.min(MAX_SUMMARY_INTERVAL_HOURS);
        TimeDelta::try_hours(i64::try_from(hours).unwrap_or(0)).unwrap_or(TimeDelta::MAX)
    }

    /// Watch-loop period as a std duration.
    #[must_use]
    pub fn watch_period(&self) -> Duration {
        self.summary_interval().to_std().unwrap_or(Duration::MAX)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

/// Maximum `SUMMARY_INTERVAL_HOURS`: one year.
pub const MAX_SUMMARY_INTERVAL_HOURS: u64 = 24 * 366;

/// Splits configured channel tokens into refs, skipping blanks.
///
/// # Errors
///
/// An all-digit token too large for a channel id is a configuration error.
pub fn parse_channel_refs(tokens: &[String]) -> Result<Vec<ChannelRef>, RecapError> {
    let mut refs = Vec::with_capacity(tokens.len());
    for token in tokens {
        let trimmed = token.trim();
        if !trimmed.is_empty()
            && trimmed.chars().all(|c| c.is_ascii_digit())
            && trimmed.parse::<u64>().is_err()
        {
            return Err(RecapError::ConfigError(format!(
                "CHANNEL_IDS entry {trimmed:?} is too large for a channel id"
            )));
        }
        refs.extend(ChannelRef::parse(trimmed));
    }
    Ok(refs)
}

fn parse_or<T>(raw: Option<String>, name: &str, fallback: T) -> Result<T, RecapError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v
            .parse::<T>()
            .map_err(|e| RecapError::ConfigError(format!("{name} {v:?}: {e}"))),
        None => Ok(fallback),
    }
}

fn parse_bool_or(raw: Option<String>, name: &str, fallback: bool) -> Result<bool, RecapError> {
    match raw.as_deref() {
        None => Ok(fallback),
        Some("1" | "true" | "TRUE" | "True" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "FALSE" | "False" | "no" | "off") => Ok(false),
        Some(other) => Err(RecapError::ConfigError(format!(
            "{name} {other:?} is not a boolean"
        ))),
    }
}
