//! Report job model.

use crate::models::TransactionFilter;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use service_core::error::AppError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

/// Number of random bytes behind a report token (hex-encoded to twice as many chars).
const REPORT_TOKEN_BYTES: usize = 32;

/// Build state of a report. `InProgress` moves exactly once to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    InProgress,
    Available,
    Failed,
}

impl ReportStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Available => "available",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(Self::InProgress),
            "available" => Some(Self::Available),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grouping applied to the transactions of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    List,
    ByDays,
    ByMonths,
}

impl ReportType {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::ByDays => "by_days",
            Self::ByMonths => "by_months",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "list" => Some(Self::List),
            "by_days" => Some(Self::ByDays),
            "by_months" => Some(Self::ByMonths),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted report job.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReportJob {
    pub token: String,
    pub owner_id: i32,
    pub description: String,
    pub status: String,
    pub report_type: String,
    pub filter: Option<serde_json::Value>,
    pub lang: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReportJob {
    /// Get parsed status.
    pub fn parsed_status(&self) -> Option<ReportStatus> {
        ReportStatus::parse(&self.status)
    }

    /// Get parsed type. Unknown tags build as a plain list.
    pub fn parsed_type(&self) -> ReportType {
        ReportType::parse(&self.report_type).unwrap_or_else(|| {
            tracing::warn!(
                token = %self.token,
                report_type = %self.report_type,
                "Unknown report type, building as list"
            );
            ReportType::List
        })
    }

    pub fn parsed_filter(&self) -> TransactionFilter {
        TransactionFilter::from_stored(self.filter.as_ref())
    }

    /// Localized labels; empty when absent or unreadable.
    pub fn lang_map(&self) -> HashMap<String, String> {
        match &self.lang {
            None | Some(serde_json::Value::Null) => HashMap::new(),
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                tracing::warn!(token = %self.token, error = %e, "Stored lang map is unreadable");
                HashMap::new()
            }),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Input for creating a report job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub owner_id: i32,
    pub description: String,
    pub filter: TransactionFilter,
    pub lang: HashMap<String, String>,
    pub report_type: ReportType,
    pub expires_days: i64,
}

impl NewReport {
    /// Expiry for a job created at `created_at`. Rejects a non-positive or
    /// unrepresentable lifetime instead of producing an already expired job.
    pub fn expires_at(&self, created_at: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        TimeDelta::try_days(self.expires_days)
            .filter(|lifetime| *lifetime > TimeDelta::zero())
            .and_then(|lifetime| created_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Invalid report lifetime of {} days",
                    self.expires_days
                ))
            })
    }
}

/// Fresh unguessable report token. The token is the only credential needed to
/// download a finished report, so it comes from the thread-local CSPRNG.
pub fn generate_report_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; REPORT_TOKEN_BYTES] = rng.gen();
    hex::encode(token_bytes)
}
