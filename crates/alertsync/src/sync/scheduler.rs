//! Periodic background sync over all connected users.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::orchestrator::SyncService;

/// Unattended loop: sleep one interval, then sync every connected user.
pub struct BackgroundSync {
    service: SyncService,
    interval: Duration,
    limit: usize,
}

impl BackgroundSync {
    /// Uses the service's configured interval and background cap.
    pub fn new(service: SyncService) -> Self {
        let interval = Duration::from_secs(service.config().background_interval_secs);
        let limit = service.config().background_limit;
        Self::with_schedule(service, interval, limit)
    }

    pub fn with_schedule(service: SyncService, interval: Duration, limit: usize) -> Self {
        Self {
            service,
            interval,
            limit,
        }
    }

    /// Runs until `cancel` fires. Returns the number of completed cycles.
    ///
    /// Cancellation is observed while sleeping and between users; a user
    /// whose run has started is finished first, so nothing is left half
    /// committed beyond what the next run resumes from.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        info!(
            "Background sync started (every {}s, cap {})",
            self.interval.as_secs(),
            self.limit
        );
        let mut cycles = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            match self.service.run_background_cycle(self.limit, &cancel).await {
                Ok(report) if report.cancelled => break,
                Ok(_) => {}
                Err(e) => error!("Background cycle failed: {}", e),
            }
            cycles += 1;
        }

        info!("Background sync stopped after {} cycles", cycles);
        cycles
    }

    /// Spawns [`BackgroundSync::run`] on the current tokio runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(self.run(cancel))
    }
}
