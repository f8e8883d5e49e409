//! UI-facing email view model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BackendStatus, TraceStep};

/// Four-way status shown to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiStatus {
    Processed,
    NeedsReview,
    AutoReplied,
    Ignored,
}

impl UiStatus {
    pub const ALL: [UiStatus; 4] = [
        UiStatus::Processed,
        UiStatus::NeedsReview,
        UiStatus::AutoReplied,
        UiStatus::Ignored,
    ];

    /// Fixed lookup from backend status. Anything unrecognised needs review.
    pub fn from_backend(status: &BackendStatus) -> Self {
        match status {
            BackendStatus::HumanConfirmedReplied => UiStatus::Processed,
            BackendStatus::AutoProcessed => UiStatus::AutoReplied,
            BackendStatus::HumanRejected => UiStatus::Ignored,
            BackendStatus::Unprocessed
            | BackendStatus::NeedsHumanDecision
            | BackendStatus::Unknown(_) => UiStatus::NeedsReview,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UiStatus::Processed => "processed",
            UiStatus::NeedsReview => "needs_review",
            UiStatus::AutoReplied => "auto_replied",
            UiStatus::Ignored => "ignored",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UiStatus::Processed => "Processed",
            UiStatus::NeedsReview => "Needs Review",
            UiStatus::AutoReplied => "Auto Replied",
            UiStatus::Ignored => "Ignored",
        }
    }
}

impl fmt::Display for UiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UiStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "processed" => Ok(UiStatus::Processed),
            "needs_review" => Ok(UiStatus::NeedsReview),
            "auto_replied" => Ok(UiStatus::AutoReplied),
            "ignored" => Ok(UiStatus::Ignored),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// A data source the pipeline consulted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Freight route and price attached to a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<String>,
}

/// An email as shown in the inbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub sender_name: String,
    pub preview: String,
    pub status: UiStatus,
    pub backend_status: BackendStatus,

    /// Raw arrival timestamp from the API
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Seconds between arrival and last update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_secs: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,

    pub draft_response: String,
    #[serde(default)]
    pub data_sources: Vec<DataSource>,

    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub steps: Vec<TraceStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteInfo>,

    /// Set only after a decision response says so
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<bool>,
}

impl Email {
    /// Still waiting on an operator
    pub fn is_pending(&self) -> bool {
        self.status == UiStatus::NeedsReview
    }

    /// Replace the backend status and re-derive the UI category
    pub fn set_backend_status(&mut self, status: BackendStatus) {
        self.status = UiStatus::from_backend(&status);
        self.backend_status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_status_maps_to_one_category() {
        let expected = [
            (BackendStatus::Unprocessed, UiStatus::NeedsReview),
            (BackendStatus::AutoProcessed, UiStatus::AutoReplied),
            (BackendStatus::NeedsHumanDecision, UiStatus::NeedsReview),
            (BackendStatus::HumanConfirmedReplied, UiStatus::Processed),
            (BackendStatus::HumanRejected, UiStatus::Ignored),
        ];
        for (backend, ui) in &expected {
            assert_eq!(UiStatus::from_backend(backend), *ui, "{}", backend);
        }
        assert_eq!(expected.len(), BackendStatus::KNOWN.len());
    }

    #[test]
    fn test_unknown_status_needs_review() {
        for raw in ["escalated", "", "HUMAN_REJECTED", "auto_processed_v2"] {
            assert_eq!(
                UiStatus::from_backend(&BackendStatus::from(raw)),
                UiStatus::NeedsReview
            );
        }
    }

    #[test]
    fn test_ui_status_parse() {
        assert_eq!("needs-review".parse::<UiStatus>(), Ok(UiStatus::NeedsReview));
        assert_eq!("Auto_Replied".parse::<UiStatus>(), Ok(UiStatus::AutoReplied));
        assert!("escalated".parse::<UiStatus>().is_err());
        for s in UiStatus::ALL {
            assert_eq!(s.as_str().parse::<UiStatus>(), Ok(s));
        }
    }
}
