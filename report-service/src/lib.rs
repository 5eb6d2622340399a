//! Report Service - asynchronous report generation over the personal-finance ledger.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod report;
pub mod services;
pub mod startup;
