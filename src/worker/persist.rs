use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;

use crate::core::models::SummaryRecord;
use crate::errors::RecapError;
use crate::utils::atomic::write_atomic;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}_-]+").expect("static regex compile"));

/// Writes one JSON file per summarized channel per run.
#[derive(Debug, Clone)]
pub struct SummarySink {
    dir: PathBuf,
    include_raw_messages: bool,
}

impl SummarySink {
    pub fn new(dir: impl Into<PathBuf>, include_raw_messages: bool) -> Self {
        Self {
            dir: dir.into(),
            include_raw_messages,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn include_raw_messages(&self) -> bool {
        self.include_raw_messages
    }

    /// `<name>_<channel id>_<YYYYmmdd_HHMMSS>.json`; the id keeps names unique within a run.
    #[must_use]
    pub fn file_name(record: &SummaryRecord) -> String {
        let safe_name = UNSAFE_FILENAME_CHARS.replace_all(record.channel_name.trim(), "-");
        let safe_name = safe_name.trim_matches('-');
        let safe_name = if safe_name.is_empty() {
            "channel"
        } else {
            safe_name
        };
        format!(
            "{}_{}_{}.json",
            safe_name,
            record.channel_id,
            record.summary_timestamp.format("%Y%m%d_%H%M%S")
        )
    }

    /// Durably writes the record and returns its path.
    ///
    /// # Errors
    ///
    /// Returns `RecapError::PersistenceError` if the record cannot be serialized or written.
    pub fn write(&self, record: &SummaryRecord) -> Result<PathBuf, RecapError> {
        let path = self.dir.join(Self::file_name(record));
        let body = serde_json::to_string_pretty(record)?;

        write_atomic(&path, body.as_bytes()).map_err(|e| {
            RecapError::PersistenceError(format!("failed to write {}: {}", path.display(), e))
        })?;

        info!("Saved summary for #{} to {}", record.channel_name, path.display());
        Ok(path)
    }
}
