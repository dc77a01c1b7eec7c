//! Durable per-channel "summarized through" timestamps.
//!
//! The file is a flat JSON object mapping channel id to an RFC 3339 UTC
//! timestamp. Loading never fails hard: a missing or malformed file yields an
//! empty map and every channel falls back to the default look-back window.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::models::ChannelId;
use crate::errors::RecapError;
use crate::utils::atomic::write_atomic;

pub type Checkpoints = BTreeMap<ChannelId, DateTime<Utc>>;

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the checkpoint map, returning an empty map when the file is absent or unreadable.
    #[must_use]
    pub fn load(&self) -> Checkpoints {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No checkpoint file at {}, starting fresh",
                    self.path.display()
                );
                return Checkpoints::new();
            }
            Err(e) => {
                warn!(
                    "Failed to read checkpoint file {}: {}",
                    self.path.display(),
                    e
                );
                return Checkpoints::new();
            }
        };

        let entries: BTreeMap<String, String> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Checkpoint file {} is malformed, ignoring it: {}",
                    self.path.display(),
                    e
                );
                return Checkpoints::new();
            }
        };

        let mut checkpoints = Checkpoints::new();
        for (key, value) in entries {
            let Ok(channel) = key.parse::<ChannelId>() else {
                warn!("Dropping checkpoint entry with invalid channel id {:?}", key);
                continue;
            };
            match parse_timestamp(&value) {
                Some(ts) => {
                    checkpoints.insert(channel, ts);
                }
                None => warn!(
                    "Dropping checkpoint for channel {} with unparsable timestamp {:?}",
                    channel, value
                ),
            }
        }

        debug!(
            "Loaded {} checkpoint(s) from {}",
            checkpoints.len(),
            self.path.display()
        );
        checkpoints
    }

    /// Replaces the stored map with `checkpoints`.
    ///
    /// # Errors
    ///
    /// Returns `RecapError::PersistenceError` if the file cannot be written.
    pub fn save(&self, checkpoints: &Checkpoints) -> Result<(), RecapError> {
        let entries: BTreeMap<String, String> = checkpoints
            .iter()
            .map(|(channel, ts)| (channel.to_string(), format_timestamp(*ts)))
            .collect();
        let body = serde_json::to_string_pretty(&entries)?;

        write_atomic(&self.path, body.as_bytes()).map_err(|e| {
            RecapError::PersistenceError(format!(
                "failed to write checkpoint file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(
            "Saved {} checkpoint(s) to {}",
            checkpoints.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// RFC 3339 in UTC with a `Z` suffix and only as many fractional digits as needed.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Accepts RFC 3339 with any offset, or a naive ISO timestamp which is taken as UTC.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
