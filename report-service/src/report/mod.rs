//! Asynchronous report generation: reference context, aggregation builders,
//! the bounded build scheduler and the retention sweeper.

pub mod builders;
mod context;
mod error;
mod scheduler;
mod sweeper;

pub use builders::ReportBuilder;
pub use context::ReportContext;
pub use error::BuildError;
pub use scheduler::{BuildOutcome, ReportScheduler, SchedulerConfig, SubmitError};
pub use sweeper::{RetentionSweeper, SweepSummary};
