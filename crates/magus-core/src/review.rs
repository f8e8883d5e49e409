//! Human decisions on pending emails
//!
//! Local state only changes once the backend answers. An accept that did
//! not go out, or a reject the backend refused, leaves the email as it was
//! and comes back as [`Error::DecisionNotSent`].

use tracing::{info, warn};

use crate::api::MagusApi;
use crate::error::{Error, Result};
use crate::models::{BackendStatus, Decision, DecisionRequest, DecisionResponse, Email};

/// Submit a decision for `email` and apply the outcome to it
pub async fn submit_decision(
    api: &dyn MagusApi,
    email: &mut Email,
    decision: Decision,
    refined_quote: Option<&str>,
    comment: Option<&str>,
) -> Result<DecisionResponse> {
    let request = DecisionRequest::new(email.id.clone(), decision, refined_quote, comment);
    info!("Submitting {} for email {}", decision, email.id);

    let response = api.submit_decision(&request).await?;

    match decision {
        Decision::Accept if response.sent => {
            email.sent = Some(true);
            email.set_backend_status(BackendStatus::HumanConfirmedReplied);
        }
        Decision::Reject if response.ok => {
            email.sent = Some(response.sent);
            email.set_backend_status(BackendStatus::HumanRejected);
        }
        _ => {
            warn!(
                "Decision {} for email {} was not applied (ok={}, sent={})",
                decision, email.id, response.ok, response.sent
            );
            return Err(Error::DecisionNotSent {
                id: email.id.clone(),
            });
        }
    }

    if let Some(webhook) = &response.webhook {
        info!("Webhook for {} answered {}", email.id, webhook.status_code);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{map_record, MapperOptions};
    use crate::models::UiStatus;
    use crate::test_support::{record, FakeApi};

    fn pending() -> Email {
        map_record(
            &record("e1", "2025-01-10T09:00:00", "needs_human_decision"),
            &MapperOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_accept_sent_marks_processed() {
        let api = FakeApi::new(Vec::new());
        let mut email = pending();

        let response = submit_decision(
            &api,
            &mut email,
            Decision::Accept,
            Some("USD 2,328.75"),
            Some("  "),
        )
        .await
        .unwrap();

        assert_eq!(response.quote_text.as_deref(), Some("USD 2,328.75"));
        assert_eq!(email.sent, Some(true));
        assert_eq!(email.status, UiStatus::Processed);
        assert_eq!(email.backend_status, BackendStatus::HumanConfirmedReplied);
        assert_eq!(api.calls(), vec!["decision:e1"]);
    }

    #[tokio::test]
    async fn test_accept_not_sent_leaves_email_pending() {
        let mut api = FakeApi::new(Vec::new());
        api.decision_sent = false;
        let mut email = pending();

        let err = submit_decision(&api, &mut email, Decision::Accept, Some("USD 900"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DecisionNotSent { ref id } if id == "e1"));
        assert_eq!(email.sent, None);
        assert!(email.is_pending());
    }

    #[tokio::test]
    async fn test_reject_marks_ignored() {
        let mut api = FakeApi::new(Vec::new());
        api.decision_sent = false;
        let mut email = pending();

        submit_decision(&api, &mut email, Decision::Reject, None, Some("not our lane"))
            .await
            .unwrap();

        assert_eq!(email.status, UiStatus::Ignored);
        assert_eq!(email.sent, Some(false));
    }

    #[tokio::test]
    async fn test_reject_refused_leaves_email_pending() {
        let mut api = FakeApi::new(Vec::new());
        api.decision_ok = false;
        let mut email = pending();

        let err = submit_decision(&api, &mut email, Decision::Reject, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DECISION_NOT_SENT");
        assert!(email.is_pending());
    }

    #[tokio::test]
    async fn test_transport_error_leaves_email_untouched() {
        let api = FakeApi::new(Vec::new());
        api.set_failure(Some(502));
        let mut email = pending();

        let err = submit_decision(&api, &mut email, Decision::Accept, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert!(email.is_pending());
        assert_eq!(email.sent, None);
    }
}
