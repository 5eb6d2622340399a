//! Saved transaction filter.

use crate::models::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Predicate document selecting the transactions a report covers.
///
/// Every field is optional; an absent field does not constrain the result.
/// `from_time` is inclusive, `to_time` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currencies_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TransactionFilter {
    /// Matches every transaction.
    pub const EMPTY: Self = Self {
        tags_ids: None,
        accounts_ids: None,
        currencies_ids: None,
        from_time: None,
        to_time: None,
        description: None,
    };

    /// Decode a stored filter. Missing, `null` or malformed documents yield
    /// `EMPTY` rather than an error.
    pub fn from_stored(raw: Option<&serde_json::Value>) -> Self {
        match raw {
            None | Some(serde_json::Value::Null) => Self::EMPTY,
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored report filter is unreadable, using empty filter");
                Self::EMPTY
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Evaluate the filter against one transaction. Mirrors the SQL the
    /// database source generates.
    pub fn matches(&self, transaction: &Transaction) -> bool {
        fn contains(ids: &Option<Vec<i64>>, id: i64) -> bool {
            ids.as_ref().is_none_or(|ids| ids.contains(&id))
        }

        if !contains(&self.tags_ids, transaction.tag_id)
            || !contains(&self.accounts_ids, transaction.account_id)
            || !contains(&self.currencies_ids, transaction.currency_id)
        {
            return false;
        }

        if self.from_time.is_some_and(|from| transaction.created_at < from) {
            return false;
        }

        if self.to_time.is_some_and(|to| transaction.created_at >= to) {
            return false;
        }

        match self.description.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => transaction
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle.to_lowercase())),
            _ => true,
        }
    }
}
