use crate::models::{ReportJob, ReportType, TransactionFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportRequest {
    #[validate(length(min = 1, message = "Description cannot be empty"))]
    pub description: String,
    pub filter: Option<serde_json::Value>,
    pub lang: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub report_type: Option<String>,
}

impl CreateReportRequest {
    /// Field checks plus the configured description limit (in characters).
    pub fn validate_with_limit(&self, max_description_length: u64) -> Result<(), ValidationErrors> {
        self.validate()?;

        if self.description.trim().is_empty() {
            let mut errors = ValidationErrors::new();
            errors.add("description", ValidationError::new("blank"));
            return Err(errors);
        }

        if self.description.chars().count() as u64 > max_description_length {
            let mut error = ValidationError::new("length");
            error.add_param("max".into(), &max_description_length);
            error.message = Some("Description is too long".into());

            let mut errors = ValidationErrors::new();
            errors.add("description", error);
            return Err(errors);
        }

        Ok(())
    }

    /// Unknown or missing types build as a plain list.
    pub fn parsed_type(&self) -> ReportType {
        self.report_type
            .as_deref()
            .and_then(|raw| ReportType::parse(&raw.trim().to_ascii_lowercase()))
            .unwrap_or(ReportType::List)
    }

    pub fn parsed_filter(&self) -> TransactionFilter {
        TransactionFilter::from_stored(self.filter.as_ref())
    }

    /// Label overrides; anything other than a string map is ignored.
    pub fn parsed_lang(&self) -> HashMap<String, String> {
        self.lang
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReportResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub token: String,
    pub description: String,
    pub status: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub created_at: String,
    pub expires_at: String,
}

impl From<ReportJob> for ReportResponse {
    fn from(job: ReportJob) -> Self {
        Self {
            token: job.token,
            description: job.description,
            status: job.status,
            report_type: job.report_type,
            created_at: job.created_at.to_rfc3339(),
            expires_at: job.expires_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportListResponse {
    pub reports: Vec<ReportResponse>,
    pub total: usize,
}
