//! Aggregation strategies turning transaction pages into a report artifact.
//!
//! Builders receive pages in paging order and may see a logical group (one
//! day, one month) split across pages, so all running state lives on the
//! builder rather than per page.

mod list;
mod period;

pub use list::{ListArtifact, ListBuilder, ListRow};
pub use period::{
    BucketEntry, CurrencyTotals, Granularity, PeriodArtifact, PeriodBuilder, TagSubtotal,
};

use crate::models::{ReportType, Transaction};
use crate::report::{BuildError, ReportContext};
use std::collections::BTreeMap;

/// One builder per build, chosen once from the stored report type.
#[derive(Debug)]
pub enum ReportBuilder {
    List(ListBuilder),
    ByDays(PeriodBuilder),
    ByMonths(PeriodBuilder),
}

impl ReportBuilder {
    pub fn for_type(report_type: ReportType, description: &str, context: ReportContext) -> Self {
        let description = description.to_string();
        match report_type {
            ReportType::List => Self::List(ListBuilder::new(description, context)),
            ReportType::ByDays => Self::ByDays(PeriodBuilder::new(
                Granularity::Day,
                description,
                context,
            )),
            ReportType::ByMonths => Self::ByMonths(PeriodBuilder::new(
                Granularity::Month,
                description,
                context,
            )),
        }
    }

    pub fn report_type(&self) -> ReportType {
        match self {
            Self::List(_) => ReportType::List,
            Self::ByDays(_) => ReportType::ByDays,
            Self::ByMonths(_) => ReportType::ByMonths,
        }
    }

    /// Fold one page into the running state. A transaction referencing data
    /// missing from the context fails the whole build.
    pub fn consider(&mut self, page: &[Transaction]) -> Result<(), BuildError> {
        match self {
            Self::List(builder) => builder.consider(page),
            Self::ByDays(builder) | Self::ByMonths(builder) => builder.consider(page),
        }
    }

    /// Finalize and render the artifact document.
    pub fn done(self) -> Result<Vec<u8>, BuildError> {
        match self {
            Self::List(builder) => Ok(serde_json::to_vec(&builder.finish())?),
            Self::ByDays(builder) | Self::ByMonths(builder) => {
                Ok(serde_json::to_vec(&builder.finish())?)
            }
        }
    }
}

/// Column labels for an artifact, localized through the context's lang map.
pub(crate) fn headers(
    context: &ReportContext,
    columns: &[(&'static str, &'static str)],
) -> BTreeMap<&'static str, String> {
    columns
        .iter()
        .map(|(key, default)| (*key, context.label(key, default).to_string()))
        .collect()
}
