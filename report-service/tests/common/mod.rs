//! Common test utilities for report-service integration tests.
//!
//! In-memory implementations of the store and source traits, so the build
//! pool and the sweeper can be driven end to end without PostgreSQL.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use report_service::models::{
    generate_report_token, Account, Currency, NewReport, ReportJob, ReportStatus, Transaction,
    TransactionFilter, TransactionTag,
};
use report_service::report::{BuildOutcome, ReportScheduler, SchedulerConfig};
use report_service::services::{
    LocalStorage, ReferenceSource, ReportStore, Storage, TransactionSource,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;

pub const OWNER_ID: i32 = 7;
pub const OTHER_OWNER_ID: i32 = 8;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,report_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// -------------------------------------------------------------------------
// Report store
// -------------------------------------------------------------------------

/// Report jobs in a map, with a manual clock standing in for `NOW()`.
pub struct MemoryReportStore {
    jobs: Mutex<HashMap<String, ReportJob>>,
    now: Mutex<DateTime<Utc>>,
    status_writes: Mutex<Vec<(String, ReportStatus)>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            now: Mutex::new(Utc::now()),
            status_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock().unwrap() += by;
    }

    /// Every status write for `token`, in order.
    pub fn status_writes(&self, token: &str) -> Vec<ReportStatus> {
        self.status_writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn status_of(&self, token: &str) -> Option<ReportStatus> {
        self.jobs
            .lock()
            .unwrap()
            .get(token)
            .and_then(ReportJob::parsed_status)
    }

    pub fn remove(&self, token: &str) {
        self.jobs.lock().unwrap().remove(token);
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn create_report(&self, input: &NewReport) -> Result<String, AppError> {
        let token = generate_report_token();
        let created_at = self.now();
        let expires_at = input.expires_at(created_at)?;

        let job = ReportJob {
            token: token.clone(),
            owner_id: input.owner_id,
            description: input.description.clone(),
            status: ReportStatus::InProgress.as_str().to_string(),
            report_type: input.report_type.as_str().to_string(),
            filter: Some(serde_json::to_value(&input.filter).unwrap()),
            lang: Some(serde_json::to_value(&input.lang).unwrap()),
            created_at,
            expires_at,
        };

        self.jobs.lock().unwrap().insert(token.clone(), job);
        // Keep creation times distinct so newest-first ordering is stable.
        self.advance(ChronoDuration::milliseconds(1));

        Ok(token)
    }

    async fn update_status(&self, token: &str, status: ReportStatus) -> Result<(), AppError> {
        if !status.is_terminal() {
            return Err(AppError::BadRequest(anyhow::anyhow!("non-terminal status")));
        }

        self.status_writes
            .lock()
            .unwrap()
            .push((token.to_string(), status));

        if let Some(job) = self.jobs.lock().unwrap().get_mut(token) {
            job.status = status.as_str().to_string();
        }
        Ok(())
    }

    async fn get_report(&self, token: &str) -> Result<Option<ReportJob>, AppError> {
        Ok(self.jobs.lock().unwrap().get(token).cloned())
    }

    async fn list_reports(&self, owner_id: i32) -> Result<Vec<ReportJob>, AppError> {
        let mut jobs: Vec<ReportJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.owner_id == owner_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn list_expired(&self, limit: i64) -> Result<Vec<ReportJob>, AppError> {
        let now = self.now();
        let mut jobs: Vec<ReportJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.is_expired(now))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn delete_report(&self, token: &str) -> Result<(), AppError> {
        self.jobs.lock().unwrap().remove(token);
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Transactions
// -------------------------------------------------------------------------

/// Transactions of every owner, paged the way the database pages them.
/// An optional gate holds every fetch until the test releases it.
pub struct MemoryTransactions {
    rows: Vec<Transaction>,
    offsets: Mutex<Vec<i64>>,
    gate: Option<Arc<Semaphore>>,
}

impl MemoryTransactions {
    pub fn new(mut rows: Vec<Transaction>) -> Self {
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Self {
            rows,
            offsets: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Fetches block until `release` is called on the returned gate.
    pub fn gated(rows: Vec<Transaction>) -> (Self, Gate) {
        let semaphore = Arc::new(Semaphore::new(0));
        let mut source = Self::new(rows);
        source.gate = Some(semaphore.clone());
        (source, Gate(semaphore))
    }

    /// Offsets requested so far, in call order.
    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.offsets.lock().unwrap().len()
    }
}

pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn release(&self) {
        self.0.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl TransactionSource for MemoryTransactions {
    async fn fetch_transactions(
        &self,
        owner_id: i32,
        offset: i64,
        limit: i64,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError> {
        self.offsets.lock().unwrap().push(offset);

        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
        }

        Ok(self
            .rows
            .iter()
            .filter(|t| t.owner_id == owner_id && filter.matches(t))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

// -------------------------------------------------------------------------
// Reference data
// -------------------------------------------------------------------------

pub struct MemoryReference {
    tags: Mutex<Vec<TransactionTag>>,
    accounts: Vec<Account>,
    currencies: Vec<Currency>,
}

impl MemoryReference {
    pub fn new(tags: Vec<TransactionTag>, accounts: Vec<Account>, currencies: Vec<Currency>) -> Self {
        Self {
            tags: Mutex::new(tags),
            accounts,
            currencies,
        }
    }

    pub fn delete_tag(&self, id: i64) {
        self.tags.lock().unwrap().retain(|t| t.id != id);
    }
}

#[async_trait]
impl ReferenceSource for MemoryReference {
    async fn list_tags(&self, owner_id: i32) -> Result<Vec<TransactionTag>, AppError> {
        Ok(self
            .tags
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_accounts(&self, owner_id: i32) -> Result<Vec<Account>, AppError> {
        Ok(self
            .accounts
            .iter()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_currencies_with_root(&self, owner_id: i32) -> Result<Vec<Currency>, AppError> {
        Ok(self
            .currencies
            .iter()
            .filter(|c| c.owner_id.is_none_or(|id| id == owner_id))
            .cloned()
            .collect())
    }
}

// -------------------------------------------------------------------------
// Storage that refuses uploads
// -------------------------------------------------------------------------

pub struct RejectingStorage {
    inner: LocalStorage,
}

impl RejectingStorage {
    pub fn new(inner: LocalStorage) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Storage for RejectingStorage {
    async fn upload(&self, key: &str, _data: Vec<u8>) -> Result<(), AppError> {
        Err(AppError::StorageError(anyhow::anyhow!("disk full writing {}", key)))
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        self.inner.download(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.inner.delete(key).await
    }
}

// -------------------------------------------------------------------------
// Fixtures
// -------------------------------------------------------------------------

/// Food (1) > Groceries (2), Salary (3), plus one tag of another owner.
pub fn fixture_tags() -> Vec<TransactionTag> {
    let tag = |id: i64, owner_id: i32, parents_tree: &str, name: &str| TransactionTag {
        id,
        owner_id,
        parents_tree: parents_tree.to_string(),
        name: name.to_string(),
        description: None,
    };

    vec![
        tag(1, OWNER_ID, "", "Food"),
        tag(2, OWNER_ID, "1", "Groceries"),
        tag(3, OWNER_ID, "", "Salary"),
        tag(90, OTHER_OWNER_ID, "", "Hidden"),
    ]
}

pub fn fixture_accounts() -> Vec<Account> {
    vec![Account {
        id: 10,
        owner_id: OWNER_ID,
        currency_id: 100,
        name: "Checking".to_string(),
        description: None,
    }]
}

/// USD (100) is a root currency, EUR (200) belongs to the owner.
pub fn fixture_currencies() -> Vec<Currency> {
    vec![
        Currency {
            id: 100,
            owner_id: None,
            code: "USD".to_string(),
            symbol: "$".to_string(),
            decimals: 2,
            description: None,
        },
        Currency {
            id: 200,
            owner_id: Some(OWNER_ID),
            code: "EUR".to_string(),
            symbol: "€".to_string(),
            decimals: 2,
            description: None,
        },
    ]
}

pub fn fixture_reference() -> MemoryReference {
    MemoryReference::new(fixture_tags(), fixture_accounts(), fixture_currencies())
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

pub fn transaction(
    id: i64,
    tag_id: i64,
    currency_id: i64,
    delta: &str,
    created_at: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id,
        owner_id: OWNER_ID,
        tag_id,
        account_id: 10,
        currency_id,
        delta: Decimal::from_str(delta).unwrap(),
        created_at,
        description: Some(format!("transaction {}", id)),
    }
}

// -------------------------------------------------------------------------
// Harness
// -------------------------------------------------------------------------

/// Build pool over in-memory backends and a temporary artifact directory.
pub struct Harness {
    pub store: Arc<MemoryReportStore>,
    pub transactions: Arc<MemoryTransactions>,
    pub reference: Arc<MemoryReference>,
    pub storage: Arc<dyn Storage>,
    pub scheduler: ReportScheduler,
    pub shutdown: CancellationToken,
    _dir: TempDir,
}

impl Harness {
    pub async fn start(
        transactions: MemoryTransactions,
        reference: MemoryReference,
        config: SchedulerConfig,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        Self::start_with_storage(transactions, reference, config, storage, dir)
    }

    pub fn start_with_storage(
        transactions: MemoryTransactions,
        reference: MemoryReference,
        config: SchedulerConfig,
        storage: Arc<dyn Storage>,
        dir: TempDir,
    ) -> Self {
        init_tracing();

        let store = Arc::new(MemoryReportStore::new());
        let transactions = Arc::new(transactions);
        let reference = Arc::new(reference);
        let shutdown = CancellationToken::new();

        let scheduler = ReportScheduler::start(
            config,
            store.clone(),
            transactions.clone(),
            reference.clone(),
            storage.clone(),
            shutdown.clone(),
        );

        Self {
            store,
            transactions,
            reference,
            storage,
            scheduler,
            shutdown,
            _dir: dir,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn scheduler_config(workers: usize, queue_capacity: usize, page_size: i64) -> SchedulerConfig {
    SchedulerConfig {
        workers,
        queue_capacity,
        page_size,
    }
}

pub fn new_report(report_type: report_service::models::ReportType) -> NewReport {
    NewReport {
        owner_id: OWNER_ID,
        description: "test report".to_string(),
        filter: TransactionFilter::EMPTY,
        lang: HashMap::new(),
        report_type,
        expires_days: 7,
    }
}

/// Wait for the build outcome of `token`.
pub async fn wait_for_outcome(
    outcomes: &mut broadcast::Receiver<BuildOutcome>,
    token: &str,
) -> BuildOutcome {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match outcomes.recv().await {
                Ok(outcome) if outcome.token == token => return outcome,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("outcome channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for report build")
}

/// Poll until `condition` holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
