use service_core::error::AppError;
use thiserror::Error;

/// Reasons a report build ends in FAILED. Never leaves the worker.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A tag, account or currency referenced by a transaction (or by a tag's
    /// ancestor chain) is not in the build's snapshot.
    #[error("Data integrity error: {entity} {id} is missing from the report context")]
    MissingReference { entity: &'static str, id: i64 },

    #[error("Data integrity error: tag {id} has a malformed parents tree '{tree}'")]
    MalformedTagTree { id: i64, tree: String },

    #[error("Amount overflow: {bucket} total for currency {currency_id} is out of range")]
    AmountOverflow { currency_id: i64, bucket: String },

    #[error("Storage error: {0}")]
    Storage(#[from] AppError),

    #[error("Failed to render report: {0}")]
    Render(#[from] serde_json::Error),

    #[error("Report build panicked")]
    Panicked,
}

impl BuildError {
    pub(crate) fn missing(entity: &'static str, id: i64) -> Self {
        Self::MissingReference { entity, id }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingReference { .. } | Self::MalformedTagTree { .. } => "data_integrity",
            Self::AmountOverflow { .. } => "overflow",
            Self::Storage(_) => "storage",
            Self::Render(_) => "render",
            Self::Panicked => "panic",
        }
    }
}
