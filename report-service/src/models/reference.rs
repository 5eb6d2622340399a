//! Reference records (tags, accounts, currencies) loaded once per build.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::num::ParseIntError;

/// Separator between ancestor ids in `TransactionTag::parents_tree`.
pub const TAG_TREE_DELIMITER: char = '.';

/// Hierarchical transaction tag.
///
/// `parents_tree` lists ancestor ids from the root down to the immediate
/// parent, e.g. `"3.17"`; it is empty for top-level tags.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TransactionTag {
    pub id: i64,
    pub owner_id: i32,
    pub parents_tree: String,
    pub name: String,
    pub description: Option<String>,
}

impl TransactionTag {
    /// Ancestor ids, root first.
    pub fn parent_ids(&self) -> Result<Vec<i64>, ParseIntError> {
        let raw = self.parents_tree.trim();
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        raw.split(TAG_TREE_DELIMITER)
            .map(|part| part.trim().parse::<i64>())
            .collect()
    }

    /// Id of the top-level tag this tag descends from (itself when top-level).
    pub fn root_id(&self) -> Result<i64, ParseIntError> {
        Ok(self.parent_ids()?.first().copied().unwrap_or(self.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub owner_id: i32,
    pub currency_id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Currency. Rows without an owner are root currencies visible to everyone.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Currency {
    pub id: i64,
    pub owner_id: Option<i32>,
    pub code: String,
    pub symbol: String,
    pub decimals: i16,
    pub description: Option<String>,
}
