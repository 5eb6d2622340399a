//! Transaction row as seen by report builds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single ledger transaction. `delta` is signed: negative for spending.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub owner_id: i32,
    pub tag_id: i64,
    pub account_id: i64,
    pub currency_id: i64,
    pub delta: Decimal,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
}
