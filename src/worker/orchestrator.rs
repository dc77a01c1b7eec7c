//! Per-run control loop
//!
//! Each configured channel walks `Resolving -> Fetching -> Summarizing ->
//! Persisting` and ends either `Advanced` or `Skipped`. Channels run
//! independently on a bounded pool; only an `Advanced` channel moves its
//! checkpoint, and the caller saves the resulting map once.

use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use tracing::{Instrument, error, info, info_span, warn};

use crate::clients::{MessageSource, SummaryRelay, TextGenerator};
use crate::core::cancel::CancellationToken;
use crate::core::checkpoint::Checkpoints;
use crate::core::config::AppConfig;
use crate::core::models::{
    ChannelOutcome, ChannelRef, GroupId, RunReport, SkipReason, SummaryRecord,
};
use crate::errors::RecapError;
use crate::worker::fetch::fetch_messages;
use crate::worker::persist::SummarySink;
use crate::worker::resolve::{ChannelTarget, display_name, resolve_channels};
use crate::worker::summarize::{Summarizer, SummarizerSettings};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub group: Option<GroupId>,
    /// Look-back for channels that have no checkpoint yet.
    pub default_lookback: TimeDelta,
    pub max_messages_per_channel: usize,
    pub max_concurrent_channels: usize,
    pub summarizer: SummarizerSettings,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            group: config.guild_id,
            default_lookback: config.summary_interval(),
            max_messages_per_channel: config.max_messages_per_channel,
            max_concurrent_channels: config.max_concurrent_channels,
            summarizer: SummarizerSettings::from_config(config),
        }
    }
}

pub struct Orchestrator<'a> {
    source: &'a dyn MessageSource,
    generator: &'a dyn TextGenerator,
    relay: Option<&'a dyn SummaryRelay>,
    sink: SummarySink,
    settings: OrchestratorSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn MessageSource,
        generator: &'a dyn TextGenerator,
        sink: SummarySink,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            source,
            generator,
            relay: None,
            sink,
            settings,
        }
    }

    #[must_use]
    pub fn with_relay(mut self, relay: &'a dyn SummaryRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Runs every channel once against `checkpoints` and returns the updated map.
    ///
    /// `period_end` is shared by all channels of the run and becomes the new
    /// checkpoint of every channel that advances.
    ///
    /// # Errors
    ///
    /// Only run-level failures are returned: a configuration problem found while
    /// resolving channels, or cancellation before any channel started.
    pub async fn run(
        &self,
        refs: &[ChannelRef],
        mut checkpoints: Checkpoints,
        period_end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RecapError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id);

        async {
            info!(
                "Starting summary run for {} channel(s), period end {}",
                refs.len(),
                period_end
            );

            let resolution = cancel
                .run(resolve_channels(self.source, self.settings.group, refs))
                .await?;

            let mut outcomes: Vec<ChannelOutcome> = resolution
                .unresolved
                .into_iter()
                .map(|(channel_ref, reason)| ChannelOutcome::Skipped {
                    channel: channel_ref.to_string(),
                    reason: SkipReason::Unresolved(reason),
                })
                .collect();

            let pipelines = stream::iter(resolution.targets)
                .map(|target| {
                    let previous = checkpoints.get(&target.id).copied();
                    let span = info_span!("channel", channel_id = %target.id);
                    self.process_channel(target, previous, period_end, cancel)
                        .instrument(span)
                })
                .buffer_unordered(self.settings.max_concurrent_channels.max(1))
                .collect::<Vec<_>>()
                .await;

            for outcome in &pipelines {
                if let ChannelOutcome::Advanced {
                    channel,
                    checkpoint,
                    ..
                } = outcome
                {
                    let entry = checkpoints.entry(channel.id).or_insert(*checkpoint);
                    if *checkpoint > *entry {
                        *entry = *checkpoint;
                    }
                }
            }
            outcomes.extend(pipelines);

            let report = RunReport {
                run_id: run_id.clone(),
                period_end,
                outcomes,
                checkpoints,
            };
            info!(
                "Summary run finished: {} advanced, {} skipped",
                report.advanced_count(),
                report.skipped_count()
            );
            Ok::<RunReport, RecapError>(report)
        }
        .instrument(span)
        .await
    }

    async fn process_channel(
        &self,
        target: ChannelTarget,
        previous: Option<DateTime<Utc>>,
        period_end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> ChannelOutcome {
        let label = target
            .known_name
            .clone()
            .unwrap_or_else(|| target.id.to_string());
        let skipped = |reason: SkipReason| ChannelOutcome::Skipped {
            channel: label.clone(),
            reason,
        };

        // Resolving
        let channel = match cancel.run(display_name(self.source, &target)).await {
            Ok(channel) => channel,
            Err(RecapError::Cancelled) => return skipped(SkipReason::Cancelled),
            Err(e) => {
                warn!("Skipping channel {}: {}", target.id, e);
                return skipped(SkipReason::Unresolved(e.to_string()));
            }
        };
        let skipped = |reason: SkipReason| ChannelOutcome::Skipped {
            channel: channel.name.clone(),
            reason,
        };

        // Fetching
        let since = previous.unwrap_or_else(|| {
            period_end
                .checked_sub_signed(self.settings.default_lookback)
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        });
        let batch = match cancel
            .run(fetch_messages(
                self.source,
                channel.id,
                since,
                period_end,
                self.settings.max_messages_per_channel,
            ))
            .await
        {
            Ok(batch) => batch,
            Err(RecapError::Cancelled) => return skipped(SkipReason::Cancelled),
            Err(e) => {
                report_failure("fetch messages from", &channel.name, &e);
                return skipped(SkipReason::FetchFailed(e.to_string()));
            }
        };

        if batch.is_empty() {
            info!("No new messages in #{} since {}", channel.name, since);
            if previous.is_some() {
                return skipped(SkipReason::NoNewMessages);
            }
        }

        // A batch cut short by the message cap only covers up to its last
        // message, so the rest is picked up next run.
        let covered_until = if batch.truncated {
            batch.last_timestamp().unwrap_or(period_end)
        } else {
            period_end
        };

        // Summarizing
        let summarizer = Summarizer::new(self.generator, self.settings.summarizer.clone());
        let summary = match cancel
            .run(summarizer.summarize(&channel.name, &batch, since, covered_until))
            .await
        {
            Ok(summary) => summary,
            Err(RecapError::Cancelled) => return skipped(SkipReason::Cancelled),
            Err(e) => {
                report_failure("summarize", &channel.name, &e);
                return skipped(SkipReason::GenerationFailed(e.to_string()));
            }
        };

        // Persisting
        let messages_count = batch.len();
        let record = SummaryRecord {
            channel_id: channel.id,
            channel_name: channel.name.clone(),
            summary_timestamp: period_end,
            period_start: since,
            period_end: covered_until,
            messages_count,
            summary,
            raw_messages: self.sink.include_raw_messages().then_some(batch.messages),
        };

        let record_path = match self.sink.write(&record) {
            Ok(path) => path,
            Err(e) => {
                error!("Failed to save summary for #{}: {}", channel.name, e);
                return skipped(SkipReason::PersistenceFailed(e.to_string()));
            }
        };

        if let Some(relay) = self.relay {
            match cancel.run(relay.relay(&record)).await {
                Ok(()) => info!("Relayed summary for #{}", channel.name),
                Err(e) => warn!("Failed to relay summary for #{}: {}", channel.name, e),
            }
        }

        ChannelOutcome::Advanced {
            channel,
            messages_count,
            record_path,
            checkpoint: covered_until,
        }
    }
}

/// Transient failures are logged as warnings; the next run retries the channel.
fn report_failure(action: &str, channel: &str, e: &RecapError) {
    if e.is_transient() {
        warn!("Could not {} #{} (will retry next run): {}", action, channel, e);
    } else {
        error!("Failed to {} #{}: {}", action, channel, e);
    }
}
