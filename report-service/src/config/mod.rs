//! Configuration module for report-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReportServiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub builder: BuilderConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub local_path: String,
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub threads: usize,
    pub queue_capacity: usize,
    pub page_size: i64,
    pub max_description_length: u64,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub expires_days: i64,
    pub sweep_interval: Duration,
    pub sweep_batch_size: i64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            queue_capacity: 256,
            page_size: 1000,
            max_description_length: 128,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            expires_days: 7,
            sweep_interval: Duration::from_secs(600),
            sweep_batch_size: 100,
        }
    }
}

/// Upper bound for `REPORT_EXPIRES_DAYS`, roughly ten years.
pub const MAX_EXPIRES_DAYS: i64 = 3650;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl ReportServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_env_with(common)
    }

    /// Read the service settings on top of an already loaded common config.
    pub fn from_env_with(common: core_config::Config) -> Result<Self, AppError> {
        let builder_defaults = BuilderConfig::default();
        let retention_defaults = RetentionConfig::default();

        let expires_days = env_or("REPORT_EXPIRES_DAYS", retention_defaults.expires_days);
        if !(1..=MAX_EXPIRES_DAYS).contains(&expires_days) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REPORT_EXPIRES_DAYS must be between 1 and {}, got {}",
                MAX_EXPIRES_DAYS,
                expires_days
            )));
        }

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "report-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2),
            },
            storage: StorageConfig {
                local_path: env::var("REPORT_STORAGE_PATH")
                    .unwrap_or_else(|_| "storage/reports".to_string()),
            },
            builder: BuilderConfig {
                threads: env_or("REPORT_BUILDER_THREADS", builder_defaults.threads).max(1),
                queue_capacity: env_or("REPORT_QUEUE_CAPACITY", builder_defaults.queue_capacity)
                    .max(1),
                page_size: env_or("REPORT_PAGE_SIZE", builder_defaults.page_size).max(1),
                max_description_length: env_or(
                    "REPORT_MAX_DESCRIPTION_LENGTH",
                    builder_defaults.max_description_length,
                ),
            },
            retention: RetentionConfig {
                expires_days,
                sweep_interval: Duration::from_secs(
                    env_or(
                        "REPORT_SWEEP_INTERVAL_SECS",
                        retention_defaults.sweep_interval.as_secs(),
                    )
                    .max(1),
                ),
                sweep_batch_size: env_or(
                    "REPORT_SWEEP_BATCH_SIZE",
                    retention_defaults.sweep_batch_size,
                )
                .max(1),
            },
        })
    }
}
