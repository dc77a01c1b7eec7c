use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::errors::RecapError;

/// Cooperative cancellation shared between the run driver and channel workers.
///
/// Workers check it between pipeline states and race it against network calls;
/// a cancelled channel never advances its checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token as cancelled and wakes pending waiters.
    pub fn cancel(&self) {
        let already_cancelled = self.cancelled.swap(true, Ordering::SeqCst);
        if !already_cancelled {
            self.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Runs `fut` unless cancellation arrives first.
    ///
    /// # Errors
    ///
    /// Returns `RecapError::Cancelled` when the token fires before `fut` completes,
    /// otherwise whatever `fut` returns.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, RecapError>
    where
        F: Future<Output = Result<T, RecapError>>,
    {
        if self.is_cancelled() {
            return Err(RecapError::Cancelled);
        }
        tokio::select! {
            result = fut => result,
            () = self.cancelled() => Err(RecapError::Cancelled),
        }
    }
}
