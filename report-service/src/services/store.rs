//! Narrow record-oriented interfaces the report core runs against.
//!
//! `Database` implements all three over PostgreSQL; tests substitute
//! in-memory versions.

use crate::models::{
    Account, Currency, NewReport, ReportJob, ReportStatus, Transaction, TransactionFilter,
    TransactionTag,
};
use async_trait::async_trait;
use service_core::error::AppError;

/// Durable report job records.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert a new IN_PROGRESS job and return its token.
    async fn create_report(&self, input: &NewReport) -> Result<String, AppError>;

    /// Set a terminal status. Unknown tokens are not an error, and repeated
    /// writes simply overwrite (last write wins).
    async fn update_status(&self, token: &str, status: ReportStatus) -> Result<(), AppError>;

    async fn get_report(&self, token: &str) -> Result<Option<ReportJob>, AppError>;

    /// Jobs of one user, newest first.
    async fn list_reports(&self, owner_id: i32) -> Result<Vec<ReportJob>, AppError>;

    /// Up to `limit` jobs whose `expires_at` is at or before now.
    async fn list_expired(&self, limit: i64) -> Result<Vec<ReportJob>, AppError>;

    /// Remove a job. Removing a missing job succeeds.
    async fn delete_report(&self, token: &str) -> Result<(), AppError>;
}

/// Paged access to a user's transactions, ordered by `created_at` then `id`.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn fetch_transactions(
        &self,
        owner_id: i32,
        offset: i64,
        limit: i64,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError>;
}

/// Snapshot reads of the reference data a report renders with.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn list_tags(&self, owner_id: i32) -> Result<Vec<TransactionTag>, AppError>;

    async fn list_accounts(&self, owner_id: i32) -> Result<Vec<Account>, AppError>;

    /// The user's own currencies plus the shared root currencies.
    async fn list_currencies_with_root(&self, owner_id: i32) -> Result<Vec<Currency>, AppError>;
}
