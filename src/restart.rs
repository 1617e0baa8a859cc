//! Delayed device restart.
//!
//! After fresh credentials are stored the device restarts into station mode,
//! but only after a delay so the in-flight provisioning response can still be
//! delivered. The restart is the only detached task in the system, and it is
//! cancellable: a later credential update aborts a pending restart before
//! starting its own connect attempt.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Performs the actual device reset.
pub trait Restarter: Send + Sync {
    fn restart(&self);
}

/// Handle to a scheduled one-shot restart.
pub struct DelayedRestart {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

impl DelayedRestart {
    /// Schedule a restart after `delay`.
    ///
    /// The sleep happens on a detached task, so the caller is never blocked.
    /// Dropping the handle leaves the restart pending; call
    /// [`cancel`](Self::cancel) to abort it.
    pub fn schedule(delay: Duration, restarter: Arc<dyn Restarter>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            info!("Restarting in {} seconds", delay.as_secs());
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Pending restart cancelled");
                }
                _ = sleep(delay) => {
                    info!("Restarting NOW");
                    restarter.restart();
                }
            }
        });
        Self {
            cancel,
            _handle: handle,
        }
    }

    /// Abort the pending restart.
    pub fn cancel(self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::sim::SimRestarter;

    #[tokio::test(start_paused = true)]
    async fn test_restart_fires_after_delay() {
        let restarter = SimRestarter::default();
        let _pending = DelayedRestart::schedule(Duration::from_secs(10), Arc::new(restarter.clone()));

        sleep(Duration::from_secs(9)).await;
        assert!(!restarter.restart_requested());

        sleep(Duration::from_secs(2)).await;
        assert!(restarter.restart_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_restart() {
        let restarter = SimRestarter::default();
        let pending = DelayedRestart::schedule(Duration::from_secs(10), Arc::new(restarter.clone()));

        sleep(Duration::from_secs(5)).await;
        pending.cancel();

        sleep(Duration::from_secs(60)).await;
        assert!(!restarter.restart_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_keeps_restart_pending() {
        let restarter = SimRestarter::default();
        drop(DelayedRestart::schedule(
            Duration::from_secs(10),
            Arc::new(restarter.clone()),
        ));

        sleep(Duration::from_secs(11)).await;
        assert!(restarter.restart_requested());
    }
}
