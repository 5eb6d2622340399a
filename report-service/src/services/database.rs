//! Database service for report-service.

use crate::models::{
    generate_report_token, Account, Currency, NewReport, ReportJob, ReportStatus, Transaction,
    TransactionFilter, TransactionTag,
};
use crate::services::metrics::record_db_query;
use crate::services::store::{ReferenceSource, ReportStore, TransactionSource};
use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::{Duration, Instant};
use tracing::{info, instrument};

const REPORT_COLUMNS: &str =
    "token, owner_id, description, status, report_type, filter, lang, created_at, expires_at";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "report-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Report Job Operations
// -------------------------------------------------------------------------

#[async_trait]
impl ReportStore for Database {
    #[instrument(skip(self, input), fields(owner_id = input.owner_id, report_type = %input.report_type))]
    async fn create_report(&self, input: &NewReport) -> Result<String, AppError> {
        let started = Instant::now();

        let token = generate_report_token();
        let filter = serde_json::to_value(&input.filter)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode filter: {}", e)))?;
        let lang = serde_json::to_value(&input.lang)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode lang: {}", e)))?;
        let created_at = Utc::now();
        let expires_at = input.expires_at(created_at)?;

        sqlx::query(
            r#"
            INSERT INTO reports (token, owner_id, description, status, report_type, filter, lang, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&token)
        .bind(input.owner_id)
        .bind(&input.description)
        .bind(ReportStatus::InProgress.as_str())
        .bind(input.report_type.as_str())
        .bind(filter)
        .bind(lang)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create report: {}", e)))?;

        record_db_query("create_report", started);

        info!(expires_at = %expires_at, "Report job created");

        Ok(token)
    }

    #[instrument(skip(self))]
    async fn update_status(&self, token: &str, status: ReportStatus) -> Result<(), AppError> {
        if !status.is_terminal() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Report status can only move to a terminal state"
            )));
        }

        let started = Instant::now();

        let result = sqlx::query("UPDATE reports SET status = $2 WHERE token = $1")
            .bind(token)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update report: {}", e))
            })?;

        record_db_query("update_report_status", started);

        if result.rows_affected() == 0 {
            info!("Report vanished before its status was written");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_report(&self, token: &str) -> Result<Option<ReportJob>, AppError> {
        let started = Instant::now();

        let report = sqlx::query_as::<_, ReportJob>(&format!(
            "SELECT {} FROM reports WHERE token = $1",
            REPORT_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get report: {}", e)))?;

        record_db_query("get_report", started);

        Ok(report)
    }

    #[instrument(skip(self))]
    async fn list_reports(&self, owner_id: i32) -> Result<Vec<ReportJob>, AppError> {
        let started = Instant::now();

        let reports = sqlx::query_as::<_, ReportJob>(&format!(
            "SELECT {} FROM reports WHERE owner_id = $1 ORDER BY created_at DESC, token",
            REPORT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list reports: {}", e)))?;

        record_db_query("list_reports", started);

        Ok(reports)
    }

    #[instrument(skip(self))]
    async fn list_expired(&self, limit: i64) -> Result<Vec<ReportJob>, AppError> {
        let started = Instant::now();

        let reports = sqlx::query_as::<_, ReportJob>(&format!(
            "SELECT {} FROM reports WHERE expires_at <= NOW() ORDER BY expires_at LIMIT $1",
            REPORT_COLUMNS
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list expired reports: {}", e))
        })?;

        record_db_query("list_expired_reports", started);

        Ok(reports)
    }

    #[instrument(skip(self))]
    async fn delete_report(&self, token: &str) -> Result<(), AppError> {
        let started = Instant::now();

        sqlx::query("DELETE FROM reports WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete report: {}", e))
            })?;

        record_db_query("delete_report", started);

        Ok(())
    }
}

// -------------------------------------------------------------------------
// Transaction Operations
// -------------------------------------------------------------------------

/// Escape LIKE wildcards so user text matches literally.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append the filter's predicates as `AND ...` clauses.
fn push_filter_predicates(query: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    if let Some(ids) = &filter.tags_ids {
        query.push(" AND tag_id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(ids) = &filter.accounts_ids {
        query.push(" AND account_id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(ids) = &filter.currencies_ids {
        query.push(" AND currency_id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(from) = filter.from_time {
        query.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to_time {
        query.push(" AND created_at < ").push_bind(to);
    }
    if let Some(text) = filter.description.as_deref().map(str::trim) {
        if !text.is_empty() {
            query
                .push(" AND description ILIKE ")
                .push_bind(format!("%{}%", escape_like(text)));
        }
    }
}

fn transactions_page_query<'a>(
    owner_id: i32,
    offset: i64,
    limit: i64,
    filter: &TransactionFilter,
) -> QueryBuilder<'a, Postgres> {
    let mut query = QueryBuilder::new(
        "SELECT id, owner_id, tag_id, account_id, currency_id, delta, created_at, description \
         FROM transactions WHERE owner_id = ",
    );
    query.push_bind(owner_id);
    push_filter_predicates(&mut query, filter);
    query
        .push(" ORDER BY created_at, id OFFSET ")
        .push_bind(offset)
        .push(" LIMIT ")
        .push_bind(limit);
    query
}

#[async_trait]
impl TransactionSource for Database {
    #[instrument(skip(self, filter))]
    async fn fetch_transactions(
        &self,
        owner_id: i32,
        offset: i64,
        limit: i64,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError> {
        let started = Instant::now();

        let mut query = transactions_page_query(owner_id, offset, limit, filter);
        let transactions = query
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to fetch transactions: {}", e))
            })?;

        record_db_query("fetch_transactions", started);

        Ok(transactions)
    }
}

// -------------------------------------------------------------------------
// Reference Data Operations
// -------------------------------------------------------------------------

#[async_trait]
impl ReferenceSource for Database {
    #[instrument(skip(self))]
    async fn list_tags(&self, owner_id: i32) -> Result<Vec<TransactionTag>, AppError> {
        let started = Instant::now();

        let tags = sqlx::query_as::<_, TransactionTag>(
            r#"
            SELECT id, owner_id, parents_tree, name, description
            FROM transactions_tags
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list tags: {}", e)))?;

        record_db_query("list_tags", started);

        Ok(tags)
    }

    #[instrument(skip(self))]
    async fn list_accounts(&self, owner_id: i32) -> Result<Vec<Account>, AppError> {
        let started = Instant::now();

        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner_id, currency_id, name, description
            FROM accounts
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list accounts: {}", e)))?;

        record_db_query("list_accounts", started);

        Ok(accounts)
    }

    #[instrument(skip(self))]
    async fn list_currencies_with_root(&self, owner_id: i32) -> Result<Vec<Currency>, AppError> {
        let started = Instant::now();

        let currencies = sqlx::query_as::<_, Currency>(
            r#"
            SELECT id, owner_id, code, symbol, decimals, description
            FROM currencies
            WHERE owner_id = $1 OR owner_id IS NULL
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list currencies: {}", e))
        })?;

        record_db_query("list_currencies", started);

        Ok(currencies)
    }
}
