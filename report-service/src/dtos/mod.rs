pub mod reports;

pub use reports::{CreateReportRequest, CreateReportResponse, ReportListResponse, ReportResponse};
