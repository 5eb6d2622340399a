use crate::services::metrics::record_sweep;
use crate::services::{artifact_key, ReportStore, Storage};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Shortest accepted tick; `tokio::time::interval` rejects a zero period.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub removed: usize,
    pub failed: usize,
}

/// Periodically deletes reports (and their artifacts) past `expires_at`,
/// whatever their status. Unaware of running builds.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<dyn ReportStore>,
    storage: Arc<dyn Storage>,
    batch_size: i64,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn ReportStore>,
        storage: Arc<dyn Storage>,
        batch_size: i64,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            batch_size: batch_size.max(1),
            interval: interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    /// One tick: remove up to `batch_size` expired reports. A failure on one
    /// report is logged and does not stop the rest of the batch.
    #[instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn sweep_once(&self) -> Result<SweepSummary, AppError> {
        let expired = self.store.list_expired(self.batch_size).await?;
        let mut summary = SweepSummary::default();

        for report in expired {
            // Artifact first: a row must never outlive the cleanup of its file.
            if let Err(e) = self.storage.delete(&artifact_key(&report.token)).await {
                warn!(token = %report.token, error = %e, "Failed to delete expired report artifact");
                summary.failed += 1;
                continue;
            }

            match self.store.delete_report(&report.token).await {
                Ok(()) => {
                    // A build finishing mid-sweep may have uploaded again.
                    if let Err(e) = self.storage.delete(&artifact_key(&report.token)).await {
                        warn!(token = %report.token, error = %e, "Failed to delete late report artifact");
                    }
                    debug!(token = %report.token, status = %report.status, "Expired report removed");
                    summary.removed += 1;
                }
                Err(e) => {
                    warn!(token = %report.token, error = %e, "Failed to delete expired report");
                    summary.failed += 1;
                }
            }
        }

        record_sweep(summary.removed, summary.failed);

        if summary.removed > 0 || summary.failed > 0 {
            info!(
                removed = summary.removed,
                failed = summary.failed,
                "Report retention sweep finished"
            );
        }

        Ok(summary)
    }

    /// Run `sweep_once` every `interval` until `shutdown` fires.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_ms = self.interval.as_millis() as u64,
                batch_size = self.batch_size,
                "Report retention sweeper started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Report retention sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!(error = %e, "Report retention sweep failed");
                        }
                    }
                }
            }
        })
    }
}
