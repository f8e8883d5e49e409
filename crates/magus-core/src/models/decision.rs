//! Human decision payloads

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Accept => f.write_str("accept"),
            Decision::Reject => f.write_str("reject"),
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept" => Ok(Decision::Accept),
            "reject" => Ok(Decision::Reject),
            other => Err(format!("unknown decision: {}", other)),
        }
    }
}

/// Body of `POST /email-records/decision`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub id: String,
    pub decision: Decision,
    pub refined_quote: Option<String>,
    pub comment: Option<String>,
}

impl DecisionRequest {
    /// Build a request, sending blank text fields as null
    pub fn new(
        id: impl Into<String>,
        decision: Decision,
        refined_quote: Option<&str>,
        comment: Option<&str>,
    ) -> Self {
        let non_blank = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            id: id.into(),
            decision,
            refined_quote: non_blank(refined_quote),
            comment: non_blank(comment),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResult {
    pub status_code: u16,
}

/// Response of `POST /email-records/decision`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub ok: bool,
    pub id: String,
    pub decision: Decision,
    #[serde(default)]
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookResult>,
}
