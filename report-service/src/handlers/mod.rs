pub mod health;
pub mod reports;

pub use health::{health_check, metrics_handler, readiness_check};
pub use reports::{create_report, download_report, get_report, list_reports};
