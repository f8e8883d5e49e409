//! Client-side aggregation over fetched datasets
//!
//! Chart buckets, sidebar category counts and leaderboard fallbacks.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::mapper::sender_address;
use crate::models::{
    BackendStatus, Email, EmailRecord, RouteStatsItem, SenderStatsItem, StatusCounts, UiStatus,
};

/// Chart bucket width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Hour,
    Day,
    /// Weeks start on Monday
    Week,
}

impl Period {
    /// Start of the bucket containing `local`
    fn truncate(self, local: NaiveDateTime) -> NaiveDateTime {
        let date = local.date();
        match self {
            Period::Hour => date.and_hms_opt(local.hour(), 0, 0).unwrap_or(local),
            Period::Day => date.and_time(NaiveTime::MIN),
            Period::Week => {
                let back = date.weekday().num_days_from_monday() as i64;
                (date - Duration::days(back)).and_time(NaiveTime::MIN)
            }
        }
    }

    /// Hour labels carry the date when the chart spans several days
    fn label(self, start: NaiveDateTime, multi_day: bool) -> String {
        match self {
            Period::Hour if multi_day => start.format("%b %d %H:00").to_string(),
            Period::Hour => start.format("%H:00").to_string(),
            Period::Day => start.format("%b %d").to_string(),
            Period::Week => start.format("Week of %b %d").to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Hour => f.write_str("hour"),
            Period::Day => f.write_str("day"),
            Period::Week => f.write_str("week"),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hour" => Ok(Period::Hour),
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            other => Err(format!("unknown period: {}", other)),
        }
    }
}

/// One point on the processing chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartBucket {
    pub label: String,
    pub total: u64,
    /// Decided by a human (confirmed or rejected)
    pub reviewed: u64,
    /// A reply went out (automatic or confirmed)
    pub processed: u64,
}

/// Group records into period buckets in `tz`, ascending by bucket start
pub fn bucket_by_period(records: &[EmailRecord], period: Period, tz: Tz) -> Vec<ChartBucket> {
    let mut buckets: BTreeMap<NaiveDateTime, ChartBucket> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in records {
        let Some(received) = record.received_at() else {
            skipped += 1;
            continue;
        };
        let local = tz.from_utc_datetime(&received.naive_utc()).naive_local();
        let start = period.truncate(local);

        let bucket = buckets.entry(start).or_insert_with(|| ChartBucket {
            label: String::new(),
            total: 0,
            reviewed: 0,
            processed: 0,
        });
        bucket.total += 1;
        if record.status.is_reviewed() {
            bucket.reviewed += 1;
        }
        if record.status.is_processed() {
            bucket.processed += 1;
        }
    }

    if skipped > 0 {
        warn!("Skipped {} records with unparsable timestamps", skipped);
    }
    debug!(
        "Bucketed {} records into {} {} buckets",
        records.len() - skipped,
        buckets.len(),
        period
    );

    let multi_day = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(first), Some(last)) => first.date() != last.date(),
        _ => false,
    };
    buckets
        .into_iter()
        .map(|(start, mut bucket)| {
            bucket.label = period.label(start, multi_day);
            bucket
        })
        .collect()
}

/// Latest bucket start for a record set, handy for "current period" displays
pub fn latest_bucket_start(
    records: &[EmailRecord],
    period: Period,
    tz: Tz,
) -> Option<DateTime<Tz>> {
    records
        .iter()
        .filter_map(EmailRecord::received_at)
        .max()
        .map(|utc| tz.from_utc_datetime(&utc.naive_utc()).naive_local())
        .and_then(|local| tz.from_local_datetime(&period.truncate(local)).earliest())
}

/// Emails per UI category, for the filter sidebar
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub all: u64,
    pub processed: u64,
    pub needs_review: u64,
    pub auto_replied: u64,
    pub ignored: u64,
}

impl CategoryCounts {
    pub fn get(&self, status: UiStatus) -> u64 {
        match status {
            UiStatus::Processed => self.processed,
            UiStatus::NeedsReview => self.needs_review,
            UiStatus::AutoReplied => self.auto_replied,
            UiStatus::Ignored => self.ignored,
        }
    }

    fn add(&mut self, status: UiStatus, n: u64) {
        self.all += n;
        match status {
            UiStatus::Processed => self.processed += n,
            UiStatus::NeedsReview => self.needs_review += n,
            UiStatus::AutoReplied => self.auto_replied += n,
            UiStatus::Ignored => self.ignored += n,
        }
    }
}

/// Fold backend status counts into UI categories
pub fn category_counts(counts: &StatusCounts) -> CategoryCounts {
    let mut out = CategoryCounts::default();
    for (status, n) in counts {
        let backend = BackendStatus::from(status.as_str());
        out.add(UiStatus::from_backend(&backend), *n);
    }
    out
}

/// Sender address without display name, lowercased
fn sender_key(from: &str) -> String {
    sender_address(from).to_lowercase()
}

fn ranked(counts: HashMap<String, u64>, top: usize) -> Vec<(String, u64)> {
    let mut items: Vec<_> = counts.into_iter().collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.truncate(top);
    items
}

/// Top senders by email count
pub fn sender_leaderboard(emails: &[Email], top: usize) -> Vec<SenderStatsItem> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for email in emails {
        let key = sender_key(&email.from);
        if !key.is_empty() {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    ranked(counts, top)
        .into_iter()
        .map(|(sender, count)| SenderStatsItem { sender, count })
        .collect()
}

/// Top "Origin → Destination" routes; records without both cities are ignored
pub fn route_leaderboard(records: &[EmailRecord], top: usize) -> Vec<RouteStatsItem> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for route in records.iter().filter_map(EmailRecord::route_label) {
        *counts.entry(route).or_insert(0) += 1;
    }
    ranked(counts, top)
        .into_iter()
        .map(|(route, count)| RouteStatsItem { route, count })
        .collect()
}
