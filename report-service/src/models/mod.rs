//! Domain models for report-service.

mod filter;
mod reference;
mod report;
mod transaction;

pub use filter::TransactionFilter;
pub use reference::{Account, Currency, TransactionTag, TAG_TREE_DELIMITER};
pub use report::{generate_report_token, NewReport, ReportJob, ReportStatus, ReportType};
pub use transaction::Transaction;
