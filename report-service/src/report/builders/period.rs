use crate::models::{ReportType, Transaction};
use crate::report::builders::headers;
use crate::report::{BuildError, ReportContext};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

const COLUMNS: &[(&str, &str)] = &[
    ("period", "Period"),
    ("currency", "Currency"),
    ("tag", "Tag"),
    ("amount", "Amount"),
    ("total", "Total"),
];

/// Width of a bucket. Bucketing is done on the UTC calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Month,
}

impl Granularity {
    /// First day of the bucket `timestamp` falls in.
    pub fn bucket_start(self, timestamp: DateTime<Utc>) -> NaiveDate {
        let day = timestamp.date_naive();
        match self {
            Self::Day => day,
            Self::Month => day.with_day(1).unwrap_or(day),
        }
    }

    pub fn format_key(self, bucket: NaiveDate) -> String {
        match self {
            Self::Day => bucket.format("%Y-%m-%d").to_string(),
            Self::Month => bucket.format("%Y-%m").to_string(),
        }
    }

    fn report_type(self) -> ReportType {
        match self {
            Self::Day => ReportType::ByDays,
            Self::Month => ReportType::ByMonths,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TagSubtotal {
    pub tag: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrencyTotals {
    pub currency: String,
    pub symbol: String,
    pub total: Decimal,
    pub tags: Vec<TagSubtotal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketEntry {
    pub key: String,
    pub currencies: Vec<CurrencyTotals>,
}

#[derive(Debug, Serialize)]
pub struct PeriodArtifact {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub description: String,
    pub generated_at: DateTime<Utc>,
    pub headers: BTreeMap<&'static str, String>,
    pub buckets: Vec<BucketEntry>,
}

/// Running sums of one currency inside one bucket.
#[derive(Debug, Default)]
struct CurrencySums {
    total: Decimal,
    /// top-level tag id -> running sum
    tags: BTreeMap<i64, Decimal>,
}

/// currency id -> sums
type BucketTotals = BTreeMap<i64, CurrencySums>;

/// Per-day or per-month subtotals, split by currency and top-level tag.
#[derive(Debug)]
pub struct PeriodBuilder {
    granularity: Granularity,
    description: String,
    context: ReportContext,
    buckets: BTreeMap<NaiveDate, BucketTotals>,
}

impl PeriodBuilder {
    pub fn new(granularity: Granularity, description: String, context: ReportContext) -> Self {
        Self {
            granularity,
            description,
            context,
            buckets: BTreeMap::new(),
        }
    }

    pub fn consider(&mut self, page: &[Transaction]) -> Result<(), BuildError> {
        for transaction in page {
            // Resolve everything first so a bad record leaves no partial sum.
            let root_tag_id = self.context.root_tag(transaction.tag_id)?.id;
            self.context.account(transaction.account_id)?;
            self.context.currency(transaction.currency_id)?;

            let granularity = self.granularity;
            let bucket = granularity.bucket_start(transaction.created_at);
            let sums = self
                .buckets
                .entry(bucket)
                .or_default()
                .entry(transaction.currency_id)
                .or_default();

            let tag_sum = sums.tags.get(&root_tag_id).copied().unwrap_or(Decimal::ZERO);
            let overflow = || BuildError::AmountOverflow {
                currency_id: transaction.currency_id,
                bucket: granularity.format_key(bucket),
            };
            let tag_sum = tag_sum.checked_add(transaction.delta).ok_or_else(overflow)?;
            let total = sums.total.checked_add(transaction.delta).ok_or_else(overflow)?;

            sums.tags.insert(root_tag_id, tag_sum);
            sums.total = total;
        }

        Ok(())
    }

    pub fn finish(self) -> PeriodArtifact {
        let mut buckets = Vec::with_capacity(self.buckets.len());

        for (bucket, totals) in &self.buckets {
            let mut currencies = Vec::with_capacity(totals.len());

            for (currency_id, sums) in totals {
                // Ids were validated in consider(); the context is immutable.
                let (currency, symbol) = match self.context.currency(*currency_id) {
                    Ok(c) => (c.code.clone(), c.symbol.clone()),
                    Err(_) => (currency_id.to_string(), String::new()),
                };

                let tags: Vec<TagSubtotal> = sums
                    .tags
                    .iter()
                    .map(|(tag_id, amount)| TagSubtotal {
                        tag: self
                            .context
                            .tag(*tag_id)
                            .map(|t| t.name.clone())
                            .unwrap_or_else(|_| tag_id.to_string()),
                        amount: *amount,
                    })
                    .collect();

                currencies.push(CurrencyTotals {
                    currency,
                    symbol,
                    total: sums.total,
                    tags,
                });
            }

            buckets.push(BucketEntry {
                key: self.granularity.format_key(*bucket),
                currencies,
            });
        }

        PeriodArtifact {
            report_type: self.granularity.report_type(),
            headers: headers(&self.context, COLUMNS),
            description: self.description,
            generated_at: Utc::now(),
            buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, Currency, TransactionTag};
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn tag(id: i64, parents_tree: &str, name: &str) -> TransactionTag {
        TransactionTag {
            id,
            owner_id: 1,
            parents_tree: parents_tree.to_string(),
            name: name.to_string(),
            description: None,
        }
    }

    fn currency(id: i64, code: &str) -> Currency {
        Currency {
            id,
            owner_id: Some(1),
            code: code.to_string(),
            symbol: code.to_string(),
            decimals: 2,
            description: None,
        }
    }

    fn context() -> ReportContext {
        ReportContext::from_snapshot(
            vec![tag(1, "", "Food"), tag(2, "1", "Cafe"), tag(3, "", "Salary")],
            vec![Account {
                id: 10,
                owner_id: 1,
                currency_id: 100,
                name: "Card".to_string(),
                description: None,
            }],
            vec![currency(100, "USD"), currency(200, "EUR")],
            HashMap::new(),
        )
    }

    fn transaction(
        id: i64,
        tag_id: i64,
        currency_id: i64,
        delta: &str,
        at: DateTime<Utc>,
    ) -> Transaction {
        Transaction {
            id,
            owner_id: 1,
            tag_id,
            account_id: 10,
            currency_id,
            delta: Decimal::from_str(delta).unwrap(),
            created_at: at,
            description: None,
        }
    }

    fn at(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_bucket_keys() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 28, 23, 59, 59).unwrap();
        assert_eq!(
            Granularity::Day.format_key(Granularity::Day.bucket_start(ts)),
            "2026-02-28"
        );
        assert_eq!(
            Granularity::Month.format_key(Granularity::Month.bucket_start(ts)),
            "2026-02"
        );
    }

    #[test]
    fn test_bucket_start_is_monotonic() {
        let mut previous = None;
        for hour in (0..24 * 70).step_by(7) {
            let ts = at(1, 1, 0) + chrono::Duration::hours(hour);
            for granularity in [Granularity::Day, Granularity::Month] {
                assert!(granularity.bucket_start(ts) <= ts.date_naive());
            }
            let bucket = Granularity::Month.bucket_start(ts);
            if let Some(prev) = previous {
                assert!(bucket >= prev);
            }
            previous = Some(bucket);
        }
    }

    #[test]
    fn test_exact_decimal_sums() {
        let mut builder = PeriodBuilder::new(Granularity::Day, "d".to_string(), context());
        builder
            .consider(&[
                transaction(1, 1, 100, "10.10", at(3, 1, 8)),
                transaction(2, 1, 100, "0.05", at(3, 1, 9)),
            ])
            .unwrap();
        builder
            .consider(&[transaction(3, 1, 100, "0.05", at(3, 1, 10))])
            .unwrap();

        let artifact = builder.finish();
        assert_eq!(artifact.buckets.len(), 1);
        let usd = &artifact.buckets[0].currencies[0];
        assert_eq!(usd.total, Decimal::from_str("10.20").unwrap());
        assert_eq!(usd.total.to_string(), "10.20");
    }

    #[test]
    fn test_day_split_across_pages_lands_in_one_bucket() {
        let mut builder = PeriodBuilder::new(Granularity::Day, "d".to_string(), context());
        builder
            .consider(&[transaction(1, 2, 100, "-4.00", at(3, 1, 8))])
            .unwrap();
        builder
            .consider(&[
                transaction(2, 1, 100, "-6.00", at(3, 1, 20)),
                transaction(3, 3, 100, "100.00", at(3, 2, 9)),
            ])
            .unwrap();

        let artifact = builder.finish();
        let keys: Vec<&str> = artifact.buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["2026-03-01", "2026-03-02"]);

        // Cafe rolls up into its top-level tag Food.
        let first = &artifact.buckets[0].currencies[0];
        assert_eq!(first.tags.len(), 1);
        assert_eq!(first.tags[0].tag, "Food");
        assert_eq!(first.tags[0].amount, Decimal::from_str("-10.00").unwrap());
    }

    #[test]
    fn test_months_ascending_and_split_by_currency() {
        let mut builder = PeriodBuilder::new(Granularity::Month, "m".to_string(), context());
        builder
            .consider(&[
                transaction(1, 3, 200, "50", at(4, 2, 0)),
                transaction(2, 1, 100, "-5", at(2, 27, 0)),
                transaction(3, 1, 200, "-7", at(2, 3, 0)),
            ])
            .unwrap();

        let artifact = builder.finish();
        assert_eq!(artifact.report_type, ReportType::ByMonths);
        let keys: Vec<&str> = artifact.buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["2026-02", "2026-04"]);

        let february = &artifact.buckets[0];
        let codes: Vec<&str> = february
            .currencies
            .iter()
            .map(|c| c.currency.as_str())
            .collect();
        assert_eq!(codes, vec!["USD", "EUR"]);
    }

    #[test]
    fn test_unknown_tag_fails_without_partial_sum() {
        let mut builder = PeriodBuilder::new(Granularity::Month, "m".to_string(), context());
        let err = builder
            .consider(&[transaction(1, 99, 100, "1", at(1, 1, 0))])
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::MissingReference { entity: "tag", id: 99 }
        ));
        assert!(builder.finish().buckets.is_empty());
    }

    #[test]
    fn test_unknown_currency_fails() {
        let mut builder = PeriodBuilder::new(Granularity::Day, "d".to_string(), context());
        let err = builder
            .consider(&[transaction(1, 1, 999, "1", at(1, 1, 0))])
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::MissingReference { entity: "currency", id: 999 }
        ));
    }

    #[test]
    fn test_overflowing_sum_is_a_build_error() {
        let mut builder = PeriodBuilder::new(Granularity::Month, "m".to_string(), context());
        let mut huge = transaction(1, 1, 100, "0", at(5, 1, 0));
        huge.delta = Decimal::MAX;
        builder.consider(&[huge.clone()]).unwrap();

        huge.id = 2;
        let err = builder.consider(&[huge]).unwrap_err();
        assert!(matches!(
            err,
            BuildError::AmountOverflow { currency_id: 100, ref bucket } if bucket == "2026-05"
        ));
        assert_eq!(err.kind(), "overflow");

        // The first amount is still the only one counted.
        let artifact = builder.finish();
        assert_eq!(artifact.buckets[0].currencies[0].total, Decimal::MAX);
    }
}
