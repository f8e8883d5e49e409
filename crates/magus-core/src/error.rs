//! Error types for Magus

use thiserror::Error;

/// Result type alias using Magus's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Magus
#[derive(Error, Debug)]
pub enum Error {
    // Transport and API errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid JSON response from API: {snippet}...")]
    InvalidJson { snippet: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Data errors
    #[error("Email not found: {0}")]
    EmailNotFound(String),

    #[error("Decision for {id} was not sent")]
    DecisionNotSent { id: String },

    #[error("Completion API returned no answer")]
    EmptyCompletion,

    // Configuration errors
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true for failures that happened before a response arrived
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(e) if e.status().is_none())
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns a stable error code for JSON output
    pub fn code(&self) -> &'static str {
        match self {
            Error::Http(_) if self.is_transport() => "TRANSPORT_ERROR",
            Error::Http(_) | Error::Api { .. } => "HTTP_STATUS",
            Error::InvalidJson { .. } | Error::Json(_) => "MALFORMED_JSON",
            Error::MissingConfig(_) => "MISSING_CONFIG",
            Error::Config(_) | Error::InvalidConfig { .. } | Error::TomlParse(_) | Error::Url(_) => {
                "CONFIG_ERROR"
            }
            Error::EmailNotFound(_) => "EMAIL_NOT_FOUND",
            Error::DecisionNotSent { .. } => "DECISION_NOT_SENT",
            Error::EmptyCompletion => "EMPTY_COMPLETION",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-friendly action message for recoverable errors
    pub fn action_hint(&self) -> Option<&'static str> {
        match self {
            Error::Http(_) if self.is_transport() => Some("Check your network connection"),
            Error::Api { status, .. } if *status >= 500 => {
                Some("The Magus API is failing, re-run the command to retry")
            }
            Error::InvalidJson { .. } => Some("Check that api.base_url points at the Magus API"),
            Error::MissingConfig(_) => Some("Set the missing value in config.toml or the environment"),
            Error::DecisionNotSent { .. } => Some("The reply was not sent, review the quote and resend"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_carries_status_and_body() {
        let err = Error::Api {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "API error 502: bad gateway");
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.code(), "HTTP_STATUS");
        assert!(err.action_hint().is_some());
    }

    #[test]
    fn test_codes() {
        let err = Error::InvalidJson {
            snippet: "<html>".to_string(),
        };
        assert_eq!(err.code(), "MALFORMED_JSON");
        assert_eq!(Error::MissingConfig("key".into()).code(), "MISSING_CONFIG");
        assert_eq!(
            Error::DecisionNotSent { id: "1".into() }.code(),
            "DECISION_NOT_SENT"
        );
        assert_eq!(Error::Other("x".into()).action_hint(), None);
    }
}
