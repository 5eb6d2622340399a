use crate::models::{ReportType, Transaction};
use crate::report::builders::headers;
use crate::report::{BuildError, ReportContext};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

const COLUMNS: &[(&str, &str)] = &[
    ("id", "ID"),
    ("created_at", "Date"),
    ("tag", "Tag"),
    ("account", "Account"),
    ("currency", "Currency"),
    ("delta", "Amount"),
    ("description", "Description"),
];

#[derive(Debug, Clone, Serialize)]
pub struct ListRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub tag: String,
    pub account: String,
    pub currency: String,
    pub delta: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListArtifact {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub description: String,
    pub generated_at: DateTime<Utc>,
    pub headers: BTreeMap<&'static str, String>,
    pub rows: Vec<ListRow>,
}

/// Every transaction, in the order received, with ids resolved to labels.
#[derive(Debug)]
pub struct ListBuilder {
    description: String,
    context: ReportContext,
    rows: Vec<ListRow>,
}

impl ListBuilder {
    pub fn new(description: String, context: ReportContext) -> Self {
        Self {
            description,
            context,
            rows: Vec::new(),
        }
    }

    pub fn consider(&mut self, page: &[Transaction]) -> Result<(), BuildError> {
        self.rows.reserve(page.len());

        for transaction in page {
            let row = ListRow {
                id: transaction.id,
                created_at: transaction.created_at,
                tag: self.context.tag_full_path(transaction.tag_id)?,
                account: self.context.account(transaction.account_id)?.name.clone(),
                currency: self.context.currency(transaction.currency_id)?.code.clone(),
                delta: transaction.delta,
                description: transaction.description.clone(),
            };
            self.rows.push(row);
        }

        Ok(())
    }

    pub fn finish(self) -> ListArtifact {
        ListArtifact {
            report_type: ReportType::List,
            headers: headers(&self.context, COLUMNS),
            description: self.description,
            generated_at: Utc::now(),
            rows: self.rows,
        }
    }
}
