//! service-core: configuration, errors, HTTP middleware and telemetry shared
//! by the ledger backend services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
