//! Wire records returned by the Magus API

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the processing backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BackendStatus {
    Unprocessed,
    AutoProcessed,
    NeedsHumanDecision,
    HumanConfirmedReplied,
    HumanRejected,
    /// A status this client does not know yet, kept verbatim
    Unknown(String),
}

impl BackendStatus {
    /// All statuses the backend is known to emit
    pub const KNOWN: [BackendStatus; 5] = [
        BackendStatus::Unprocessed,
        BackendStatus::AutoProcessed,
        BackendStatus::NeedsHumanDecision,
        BackendStatus::HumanConfirmedReplied,
        BackendStatus::HumanRejected,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            BackendStatus::Unprocessed => "unprocessed",
            BackendStatus::AutoProcessed => "auto_processed",
            BackendStatus::NeedsHumanDecision => "needs_human_decision",
            BackendStatus::HumanConfirmedReplied => "human_confirmed_replied",
            BackendStatus::HumanRejected => "human_rejected",
            BackendStatus::Unknown(s) => s,
        }
    }

    /// A human looked at the email and decided
    pub fn is_reviewed(&self) -> bool {
        matches!(
            self,
            BackendStatus::HumanConfirmedReplied | BackendStatus::HumanRejected
        )
    }

    /// A reply went out, automatically or after confirmation
    pub fn is_processed(&self) -> bool {
        matches!(
            self,
            BackendStatus::AutoProcessed | BackendStatus::HumanConfirmedReplied
        )
    }
}

impl From<String> for BackendStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "unprocessed" => BackendStatus::Unprocessed,
            "auto_processed" => BackendStatus::AutoProcessed,
            "needs_human_decision" => BackendStatus::NeedsHumanDecision,
            "human_confirmed_replied" => BackendStatus::HumanConfirmedReplied,
            "human_rejected" => BackendStatus::HumanRejected,
            _ => BackendStatus::Unknown(s),
        }
    }
}

impl From<&str> for BackendStatus {
    fn from(s: &str) -> Self {
        BackendStatus::from(s.to_string())
    }
}

impl From<BackendStatus> for String {
    fn from(status: BackendStatus) -> Self {
        match status {
            BackendStatus::Unknown(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An email record as stored by the processing backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,

    /// Arrival time as sent by the API (RFC 3339 or naive ISO 8601)
    pub time: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    /// Upstream mailbox message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,

    pub from: String,

    #[serde(default)]
    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Draft or sent reply text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,

    /// Processing trace, either a JSON value or a JSON-encoded string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<serde_json::Value>,

    #[serde(default, rename = "type")]
    pub kind: String,

    pub status: BackendStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_route: Option<bool>,
}

impl EmailRecord {
    /// Parsed arrival time
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.time)
    }

    /// "Origin → Destination" when both cities are present
    pub fn route_label(&self) -> Option<String> {
        match (&self.origin_city, &self.destination_city) {
            (Some(o), Some(d)) if !o.trim().is_empty() && !d.trim().is_empty() => {
                Some(format!("{} → {}", o.trim(), d.trim()))
            }
            _ => None,
        }
    }
}

/// Parse an API timestamp. Naive timestamps are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// One page of a paged listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub limit: u32,
    pub offset: u32,
    /// Total rows behind the listing
    pub count: u64,
}

/// Per-status row counts
pub type StatusCounts = HashMap<String, u64>;

/// `status-counts` arrives either wrapped in `counts` or as a bare map
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StatusCountsResponse {
    Wrapped { counts: StatusCounts },
    Bare(StatusCounts),
}

impl StatusCountsResponse {
    pub(crate) fn into_counts(self) -> StatusCounts {
        match self {
            StatusCountsResponse::Wrapped { counts } => counts,
            StatusCountsResponse::Bare(counts) => counts,
        }
    }
}
