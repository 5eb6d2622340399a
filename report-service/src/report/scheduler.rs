use crate::models::{ReportJob, ReportStatus, ReportType};
use crate::report::{BuildError, ReportBuilder, ReportContext};
use crate::services::metrics::{record_build, record_queue_rejection, record_transactions_processed};
use crate::services::{artifact_key, ReferenceSource, ReportStore, Storage, TransactionSource};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the outcome broadcast; slow subscribers skip old outcomes.
const OUTCOME_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of builds running at once.
    pub workers: usize,
    /// Tokens waiting for a free worker. Submissions beyond this are rejected.
    pub queue_capacity: usize,
    /// Transactions requested per page.
    pub page_size: i64,
}

/// Published once per submitted token after its build ends. `status` is
/// `None` when the job no longer existed, so nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub token: String,
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("report build queue is full")]
    QueueFull,
    #[error("report scheduler is shut down")]
    Closed,
}

/// Bounded pool running report builds in the background.
///
/// Submission never waits: tokens go into a bounded queue and a dispatcher
/// hands them to at most `workers` concurrent builds. Callers observe the
/// result only through the job's persisted status.
#[derive(Clone)]
pub struct ReportScheduler {
    job_tx: mpsc::Sender<String>,
    outcomes: broadcast::Sender<BuildOutcome>,
    shutdown_token: CancellationToken,
}

impl ReportScheduler {
    /// Spawn the dispatcher. Must be called from within a Tokio runtime.
    pub fn start(
        config: SchedulerConfig,
        store: Arc<dyn ReportStore>,
        transactions: Arc<dyn TransactionSource>,
        reference: Arc<dyn ReferenceSource>,
        storage: Arc<dyn Storage>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let workers = config.workers.max(1);
        let (job_tx, mut job_rx) = mpsc::channel::<String>(config.queue_capacity.max(1));
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);

        let worker = BuildWorker {
            store,
            transactions,
            reference,
            storage,
            page_size: config.page_size.max(1),
        };
        let permits = Arc::new(Semaphore::new(workers));
        let shutdown = shutdown_token.clone();
        let outcome_tx = outcomes.clone();

        info!(
            workers = workers,
            queue_capacity = config.queue_capacity,
            page_size = worker.page_size,
            "Starting report build pool"
        );

        tokio::spawn(async move {
            loop {
                let token = tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Report dispatcher shutting down");
                        break;
                    }
                    token = job_rx.recv() => match token {
                        Some(token) => token,
                        None => {
                            info!("Report queue closed, dispatcher exiting");
                            break;
                        }
                    },
                };

                let permit = tokio::select! {
                    _ = shutdown.cancelled() => {
                        warn!("Shutdown while waiting for a free worker, queued builds dropped");
                        break;
                    }
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let worker = worker.clone();
                let outcome_tx = outcome_tx.clone();
                let span = tracing::info_span!("report_build", token = %token);

                tokio::spawn(
                    async move {
                        let outcome = worker.run(token).await;
                        drop(permit);
                        // No subscribers is the normal case outside tests.
                        let _ = outcome_tx.send(outcome);
                    }
                    .instrument(span),
                );
            }
        });

        Self {
            job_tx,
            outcomes,
            shutdown_token,
        }
    }

    /// Queue a build for `token`. Never blocks.
    pub fn submit(&self, token: &str) -> Result<(), SubmitError> {
        self.job_tx
            .try_send(token.to_string())
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    record_queue_rejection();
                    SubmitError::QueueFull
                }
                TrySendError::Closed(_) => SubmitError::Closed,
            })?;

        debug!(token = %token, "Report build queued");
        Ok(())
    }

    /// Stream of build outcomes, for callers that need to await completion.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildOutcome> {
        self.outcomes.subscribe()
    }

    /// Stop dispatching. Builds already running finish normally.
    pub fn shutdown(&self) {
        info!("Initiating report build pool shutdown");
        self.shutdown_token.cancel();
    }
}

#[derive(Clone)]
struct BuildWorker {
    store: Arc<dyn ReportStore>,
    transactions: Arc<dyn TransactionSource>,
    reference: Arc<dyn ReferenceSource>,
    storage: Arc<dyn Storage>,
    page_size: i64,
}

impl BuildWorker {
    async fn run(&self, token: String) -> BuildOutcome {
        let started = Instant::now();

        let job = match self.store.get_report(&token).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                info!("Report no longer exists, build skipped");
                return BuildOutcome {
                    token,
                    status: None,
                };
            }
            Err(e) => {
                error!(error = %e, "Failed to load report job");
                let status = self.finish(&token, ReportStatus::Failed).await;
                return BuildOutcome {
                    token,
                    status: Some(status),
                };
            }
        };

        let report_type = job.parsed_type();
        info!(report_type = %report_type, owner_id = job.owner_id, "Report build started");

        let result = AssertUnwindSafe(self.build(&job, report_type))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!("Report build panicked");
                Err(BuildError::Panicked)
            });

        let status = match result {
            Ok(transactions) => {
                info!(
                    transactions = transactions,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Report build succeeded"
                );
                ReportStatus::Available
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "Report build failed");
                ReportStatus::Failed
            }
        };

        let status = self.finish(&token, status).await;
        record_build(report_type, status, started);

        if status == ReportStatus::Available && self.discard_if_vanished(&token).await {
            return BuildOutcome {
                token,
                status: None,
            };
        }

        BuildOutcome {
            token,
            status: Some(status),
        }
    }

    /// Page through the owner's transactions, feed the builder and upload the
    /// artifact. Returns the number of transactions aggregated.
    async fn build(&self, job: &ReportJob, report_type: ReportType) -> Result<u64, BuildError> {
        let filter = job.parsed_filter();
        let context = ReportContext::load(self.reference.as_ref(), job).await?;
        let mut builder = ReportBuilder::for_type(report_type, &job.description, context);

        let mut offset: i64 = 0;
        loop {
            let page = self
                .transactions
                .fetch_transactions(job.owner_id, offset, self.page_size, &filter)
                .await?;

            if page.is_empty() {
                break;
            }

            offset += page.len() as i64;
            builder.consider(&page)?;
            record_transactions_processed(page.len());

            debug!(page_len = page.len(), offset = offset, "Report page aggregated");
        }

        let artifact = builder.done()?;
        self.storage
            .upload(&artifact_key(&job.token), artifact)
            .await?;

        Ok(offset as u64)
    }

    /// A job swept while it was building leaves an artifact no row points at.
    async fn discard_if_vanished(&self, token: &str) -> bool {
        match self.store.get_report(token).await {
            Ok(Some(_)) => false,
            Ok(None) => {
                info!("Report removed during build, discarding artifact");
                if let Err(e) = self.storage.delete(&artifact_key(token)).await {
                    warn!(error = %e, "Failed to remove artifact of removed report");
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to confirm report after build");
                false
            }
        }
    }

    /// Persist the terminal status. A failed AVAILABLE write falls back to
    /// FAILED so a job is never left pointing at an unconfirmed artifact.
    async fn finish(&self, token: &str, status: ReportStatus) -> ReportStatus {
        let mut status = status;

        if status == ReportStatus::Available {
            match self.store.update_status(token, status).await {
                Ok(()) => return status,
                Err(e) => {
                    error!(error = %e, "Failed to mark report available");
                    status = ReportStatus::Failed;
                }
            }
        }

        if let Err(e) = self.storage.delete(&artifact_key(token)).await {
            warn!(error = %e, "Failed to remove artifact of failed report");
        }

        if let Err(e) = self.store.update_status(token, status).await {
            error!(error = %e, "Failed to mark report failed, left for retention sweep");
        }

        status
    }
}
