use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Periodic backup task.
///
/// `tick` runs once per period and is never interrupted by cancellation; it returns
/// `false` when the owner is gone and the task should end on its own.
pub(crate) struct BackupTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackupTimer {
    pub(crate) fn start<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !tick().await {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("backup timer stopped");
        });
        tracing::debug!(period_secs = period.as_secs(), "backup timer started");
        Self { cancel, handle }
    }

    /// Signal the task without waiting for it.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait until any in-flight tick has finished.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await
            && err.is_panic()
        {
            tracing::warn!(error = %err, "backup timer task panicked");
        }
    }
}
