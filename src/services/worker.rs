use crate::services::upload_service::UploadService;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically reclaims abandoned uploads that no request has touched, and
/// trims the lock table.
pub struct SweepWorker {
    uploads: Arc<UploadService>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SweepWorker {
    pub fn new(
        uploads: Arc<UploadService>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            uploads,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Sweep worker started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Sweep worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_sweep().await;
                }
            }
        }
    }

    pub async fn perform_sweep(&self) {
        tracing::info!("🧹 Sweeping temporary upload directories...");

        match self.uploads.workspace().sweep().await {
            Ok(report) => tracing::info!(
                "✅ Sweep completed: {} directories, {} stale entries, {} idle sessions removed",
                report.directories_scanned,
                report.garbage_removed,
                report.sessions_removed
            ),
            Err(e) => tracing::error!("Sweep failed: {}", e),
        }

        let pruned = self.uploads.locks().prune();
        if pruned > 0 {
            tracing::debug!("Pruned {} idle upload locks", pruned);
        }
    }
}
