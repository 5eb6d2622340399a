//! Report request flow: create the job, queue its build, serve the result.

use crate::models::{NewReport, ReportJob, ReportStatus, ReportType, TransactionFilter};
use crate::report::{ReportScheduler, SubmitError};
use crate::services::{artifact_key, ReportStore, Storage};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn ReportStore>,
    storage: Arc<dyn Storage>,
    scheduler: ReportScheduler,
    expires_days: i64,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn ReportStore>,
        storage: Arc<dyn Storage>,
        scheduler: ReportScheduler,
        expires_days: i64,
    ) -> Self {
        Self {
            store,
            storage,
            scheduler,
            expires_days,
        }
    }

    pub fn scheduler(&self) -> &ReportScheduler {
        &self.scheduler
    }

    /// Persist an IN_PROGRESS job and queue its build. Returns the token as
    /// soon as the job is queued.
    ///
    /// When the queue is full the job is marked FAILED straight away and the
    /// caller gets `ServiceUnavailable`.
    #[instrument(skip(self, description, filter, lang, report_type), fields(report_type = %report_type))]
    pub async fn new_report(
        &self,
        owner_id: i32,
        description: String,
        filter: TransactionFilter,
        lang: HashMap<String, String>,
        report_type: ReportType,
    ) -> Result<String, AppError> {
        let input = NewReport {
            owner_id,
            description,
            filter,
            lang,
            report_type,
            expires_days: self.expires_days,
        };

        let token = self.store.create_report(&input).await?;

        if let Err(e) = self.scheduler.submit(&token) {
            warn!(token = %token, error = %e, "Report build not queued");
            if let Err(update_err) = self
                .store
                .update_status(&token, ReportStatus::Failed)
                .await
            {
                error!(token = %token, error = %update_err, "Failed to mark unqueued report failed");
            }

            return Err(match e {
                SubmitError::QueueFull => AppError::ServiceUnavailable(
                    "Report queue is full, try again later".to_string(),
                ),
                SubmitError::Closed => {
                    AppError::ServiceUnavailable("Report builder is shutting down".to_string())
                }
            });
        }

        info!(token = %token, owner_id = owner_id, "Report requested");
        Ok(token)
    }

    /// A report job, visible only to its owner.
    pub async fn get_report(&self, owner_id: i32, token: &str) -> Result<ReportJob, AppError> {
        self.store
            .get_report(token)
            .await?
            .filter(|job| job.owner_id == owner_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Report not found")))
    }

    pub async fn list_reports(&self, owner_id: i32) -> Result<Vec<ReportJob>, AppError> {
        self.store.list_reports(owner_id).await
    }

    /// Artifact bytes of an AVAILABLE report.
    pub async fn download(&self, owner_id: i32, token: &str) -> Result<(ReportJob, Vec<u8>), AppError> {
        let job = self.get_report(owner_id, token).await?;

        match job.parsed_status() {
            Some(ReportStatus::Available) => {}
            Some(ReportStatus::InProgress) => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Report is still being generated"
                )))
            }
            Some(ReportStatus::Failed) | None => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Report generation failed"
                )))
            }
        }

        let data = self.storage.download(&artifact_key(token)).await?;
        Ok((job, data))
    }
}
