//! Services module for report-service.

pub mod database;
pub mod metrics;
pub mod reports;
pub mod storage;
pub mod store;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use reports::ReportService;
pub use storage::{artifact_key, LocalStorage, Storage};
pub use store::{ReferenceSource, ReportStore, TransactionSource};
