//! Application startup and lifecycle management.

use crate::config::ReportServiceConfig;
use crate::handlers;
use crate::report::{ReportScheduler, RetentionSweeper, SchedulerConfig};
use crate::services::{
    init_metrics, Database, LocalStorage, ReferenceSource, ReportService, ReportStore, Storage,
    TransactionSource,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub reports: ReportService,
    /// Probed by `/ready`. `None` when the stores are not database backed.
    pub db: Option<Arc<Database>>,
    pub max_description_length: u64,
}

/// Backends the report core runs against.
#[derive(Clone)]
pub struct ReportBackends {
    pub store: Arc<dyn ReportStore>,
    pub transactions: Arc<dyn TransactionSource>,
    pub reference: Arc<dyn ReferenceSource>,
    pub storage: Arc<dyn Storage>,
}

impl ReportBackends {
    pub fn from_database(db: Arc<Database>, storage: Arc<dyn Storage>) -> Self {
        Self {
            store: db.clone(),
            transactions: db.clone(),
            reference: db,
            storage,
        }
    }
}

/// Start the build pool and the retention sweeper over `backends`, both
/// stopping when `shutdown` is cancelled.
pub fn start_report_workers(
    config: &ReportServiceConfig,
    backends: &ReportBackends,
    shutdown: CancellationToken,
) -> ReportService {
    let scheduler = ReportScheduler::start(
        SchedulerConfig {
            workers: config.builder.threads,
            queue_capacity: config.builder.queue_capacity,
            page_size: config.builder.page_size,
        },
        backends.store.clone(),
        backends.transactions.clone(),
        backends.reference.clone(),
        backends.storage.clone(),
        shutdown.clone(),
    );

    RetentionSweeper::new(
        backends.store.clone(),
        backends.storage.clone(),
        config.retention.sweep_batch_size,
        config.retention.sweep_interval,
    )
    .start(shutdown);

    ReportService::new(
        backends.store.clone(),
        backends.storage.clone(),
        scheduler,
        config.retention.expires_days,
    )
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/reports",
            post(handlers::create_report).get(handlers::list_reports),
        )
        .route("/reports/:token", get(handlers::get_report))
        .route("/reports/:token/download", get(handlers::download_report))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ReportServiceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: ReportServiceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: ReportServiceConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);

        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(&config.storage.local_path)
                .await
                .map_err(|e| {
                    tracing::error!(
                        path = %config.storage.local_path,
                        error = %e,
                        "Failed to initialize report storage"
                    );
                    e
                })?,
        );

        let shutdown = CancellationToken::new();
        let backends = ReportBackends::from_database(db.clone(), storage);
        let reports = start_report_workers(&config, &backends, shutdown.clone());

        let state = AppState {
            reports,
            db: Some(db),
            max_description_length: config.builder.max_description_length,
        };

        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(http_port = port, "Report service listener bound");

        Ok(Self {
            port,
            listener,
            state,
            shutdown,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Token that stops the build pool, the sweeper and the HTTP server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        let shutdown = self.shutdown.clone();

        tracing::info!(
            service = "report-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
