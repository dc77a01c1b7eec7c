//! Summary job: run lock, checkpoint load/save and the orchestration pass

pub mod fetch;
pub mod orchestrator;
pub mod persist;
pub mod resolve;
pub mod summarize;

use chrono::Utc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::core::cancel::CancellationToken;
use crate::core::checkpoint::CheckpointStore;
use crate::core::lock::RunLock;
use crate::core::models::{ChannelRef, RunReport};
use crate::errors::RecapError;

pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use persist::SummarySink;

#[derive(Debug)]
pub enum RunStatus {
    Completed(RunReport),
    /// Another process holds the run lock; nothing was done.
    LockHeld,
}

pub struct SummaryJob<'a> {
    orchestrator: Orchestrator<'a>,
    channels: Vec<ChannelRef>,
    store: CheckpointStore,
}

impl<'a> SummaryJob<'a> {
    pub fn new(
        orchestrator: Orchestrator<'a>,
        channels: Vec<ChannelRef>,
        store: CheckpointStore,
    ) -> Self {
        Self {
            orchestrator,
            channels,
            store,
        }
    }

    /// One locked pass: load checkpoints, orchestrate, save checkpoints once.
    ///
    /// # Errors
    ///
    /// Returns run-level failures: lock I/O, configuration problems found during
    /// resolution, cancellation before channel work, or a failed checkpoint save.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<RunStatus, RecapError> {
        let lock_path = RunLock::path_for(self.store.path());
        let Some(_lock) = RunLock::try_acquire(&lock_path)? else {
            warn!(
                "Another summary run holds {}, skipping this run",
                lock_path.display()
            );
            return Ok(RunStatus::LockHeld);
        };

        let checkpoints = self.store.load();
        let period_end = Utc::now();
        let report = self
            .orchestrator
            .run(&self.channels, checkpoints, period_end, cancel)
            .await?;

        if let Err(e) = self.store.save(&report.checkpoints) {
            error!("Failed to save checkpoints: {}", e);
            return Err(e);
        }
        Ok(RunStatus::Completed(report))
    }

    /// Runs immediately, then every `every`, until `cancel` fires.
    ///
    /// A failed run is logged and the loop carries on with the next tick.
    pub async fn run_periodic(&self, every: Duration, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = cancel.cancelled() => break,
            }

            match self.run_once(cancel).await {
                Ok(RunStatus::Completed(report)) => info!(
                    "Run {} done: {} advanced, {} skipped",
                    report.run_id,
                    report.advanced_count(),
                    report.skipped_count()
                ),
                Ok(RunStatus::LockHeld) => {}
                Err(RecapError::Cancelled) => break,
                Err(e) => error!("Summary run failed: {}", e),
            }

            if cancel.is_cancelled() {
                break;
            }
        }
        info!("Stopped periodic summaries");
    }
}
