//! Record-to-view mapping
//!
//! [`map_record`] turns a backend [`EmailRecord`] into the inbox [`Email`]
//! view model. It never fails: fields that cannot be derived fall back to
//! something displayable, and an unreadable trace becomes an empty step list.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::InboxConfig;
use crate::error::{Error, Result};
use crate::models::{
    parse_timestamp, DataSource, Email, EmailRecord, RouteInfo, StepClassifier, StepKind,
    TitleHeuristic, TraceStep, UiStatus,
};

static BLOCK_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(style|script|head)\b[^>]*>.*?</(style|script|head)>").expect("valid regex")
});
static BREAK_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6])>").expect("valid regex"));
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Settings for [`map_record`]
#[derive(Clone)]
pub struct MapperOptions {
    /// Character budget for the preview
    pub preview_chars: usize,
    /// Step classifier used to find data lookups
    pub classifier: Arc<dyn StepClassifier>,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            preview_chars: 120,
            classifier: Arc::new(TitleHeuristic),
        }
    }
}

impl From<&InboxConfig> for MapperOptions {
    fn from(cfg: &InboxConfig) -> Self {
        Self {
            preview_chars: cfg.preview_chars,
            ..Self::default()
        }
    }
}

/// Map a backend record to the inbox view model
pub fn map_record(record: &EmailRecord, options: &MapperOptions) -> Email {
    let steps = parse_steps(record.trace.as_ref());
    let data_sources = data_sources(&steps, options.classifier.as_ref());
    let body = record.body.clone().unwrap_or_default();
    let received_at = record.received_at();

    let response_time_secs = match (received_at, record.updated_at.as_deref().and_then(parse_timestamp)) {
        (Some(start), Some(end)) if end >= start => Some((end - start).num_seconds()),
        _ => None,
    };

    Email {
        id: record.id.clone(),
        sender_name: sender_display_name(&record.from),
        preview: preview(&body, options.preview_chars),
        status: UiStatus::from_backend(&record.status),
        backend_status: record.status.clone(),
        timestamp: record.time.clone(),
        received_at,
        updated_at: record.updated_at.clone(),
        response_time_secs,
        confidence: record.confidence.clone(),
        confidence_score: record.confidence.as_deref().and_then(confidence_score),
        draft_response: record.reply.clone().unwrap_or_default(),
        data_sources,
        from: record.from.clone(),
        to: record.to.clone(),
        subject: record
            .subject
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "(No Subject)".to_string()),
        body,
        steps,
        route: route_info(record),
        sent: None,
    }
}

/// Map a batch of records
pub fn map_records(records: &[EmailRecord], options: &MapperOptions) -> Vec<Email> {
    records.iter().map(|r| map_record(r, options)).collect()
}

/// Human-readable sender name from an address.
///
/// `john.doe@acme.com` and `"J. Doe" <john.doe@acme.com>` both become
/// `John Doe`. Returns the raw input when there is no usable local part.
pub fn sender_display_name(from: &str) -> String {
    let raw = from.trim();
    let address = sender_address(raw);

    let Some((local, domain)) = address.split_once('@') else {
        return raw.to_string();
    };
    if domain.is_empty() {
        return raw.to_string();
    }
    let local = local.split('+').next().unwrap_or(local);

    let parts: Vec<String> = local
        .split('.')
        .filter(|s| !s.is_empty())
        .map(capitalize)
        .collect();

    if parts.is_empty() {
        raw.to_string()
    } else {
        parts.join(" ")
    }
}

/// Bare address from a `From` value: the last `<...>` group if present,
/// otherwise the whole value, trimmed
pub fn sender_address(from: &str) -> &str {
    let from = from.trim();
    match (from.rfind('<'), from.rfind('>')) {
        (Some(start), Some(end)) if start < end => from[start + 1..end].trim(),
        _ => from,
    }
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Plain-text preview of a (possibly HTML) body, cut to `budget` characters
pub fn preview(body: &str, budget: usize) -> String {
    let text = strip_html(body);
    if text.chars().count() <= budget {
        return text;
    }
    let mut cut: String = text.chars().take(budget).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

/// Remove tags, decode common entities and collapse whitespace
pub fn strip_html(html: &str) -> String {
    let text = BLOCK_TAGS.replace_all(html, " ");
    let text = BREAK_TAGS.replace_all(&text, " ");
    let text = ANY_TAG.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Parse a trace into steps. Unreadable traces are logged and yield `[]`.
pub fn parse_steps(trace: Option<&Value>) -> Vec<TraceStep> {
    match try_parse_steps(trace) {
        Ok(steps) => steps,
        Err(e) => {
            warn!("Failed to parse trace, showing no steps: {}", e);
            Vec::new()
        }
    }
}

fn try_parse_steps(trace: Option<&Value>) -> Result<Vec<TraceStep>> {
    let decoded;
    let value = match trace {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(s)) => {
            decoded = serde_json::from_str::<Value>(s)?;
            &decoded
        }
        Some(v) => v,
    };

    let list = match value {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("steps").or_else(|| obj.get("trace").and_then(|t| t.get("steps"))) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::Other(format!(
                    "trace steps is not an array: {}",
                    json_kind(other)
                )))
            }
            None => {
                debug!("Trace object has no steps");
                return Ok(Vec::new());
            }
        },
        other => {
            return Err(Error::Other(format!(
                "trace is not a list or object: {}",
                json_kind(other)
            )))
        }
    };

    Ok(list.iter().cloned().map(TraceStep::from_value).collect())
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn data_sources(steps: &[TraceStep], classifier: &dyn StepClassifier) -> Vec<DataSource> {
    let mut sources: Vec<DataSource> = Vec::new();
    for step in steps {
        if classifier.classify(step) != StepKind::DataLookup {
            continue;
        }
        let Some(name) = step.title() else { continue };
        if sources.iter().any(|s| s.name == name) {
            continue;
        }
        let lower = name.to_lowercase();
        let kind = if lower.contains("excel") || lower.contains("sheet") {
            "excel"
        } else if lower.contains("api") {
            "api"
        } else if lower.contains("database") || lower.contains("sop") {
            "database"
        } else {
            "other"
        };
        sources.push(DataSource {
            name: name.to_string(),
            kind: kind.to_string(),
        });
    }
    sources
}

/// Numeric confidence in 0..=1 from "0.82", "82", "82%" or high/medium/low
fn confidence_score(raw: &str) -> Option<f64> {
    let s = raw.trim().trim_end_matches('%').trim();
    match s.to_lowercase().as_str() {
        "high" => return Some(0.9),
        "medium" => return Some(0.6),
        "low" => return Some(0.3),
        _ => {}
    }
    let n: f64 = s.parse().ok()?;
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    if n <= 1.0 {
        Some(n)
    } else if n <= 100.0 {
        Some(n / 100.0)
    } else {
        None
    }
}

fn route_info(record: &EmailRecord) -> Option<RouteInfo> {
    if record.origin_city.is_none() && record.destination_city.is_none() && record.price.is_none() {
        return None;
    }
    Some(RouteInfo {
        origin: record.origin_city.clone(),
        destination: record.destination_city.clone(),
        price: record.price,
        currency: record.currency.clone(),
        transport_type: record.transport_type.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackendStatus;
    use serde_json::json;

    fn record(v: Value) -> EmailRecord {
        let mut base = json!({
            "id": "r1",
            "time": "2025-01-10T09:15:00",
            "from": "jane.doe@acme.com",
            "to": "quotes@freightco.com",
            "type": "quote",
            "status": "needs_human_decision"
        });
        if let (Some(b), Some(extra)) = (base.as_object_mut(), v.as_object()) {
            for (k, val) in extra {
                b.insert(k.clone(), val.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn test_sender_display_name() {
        assert_eq!(sender_display_name("jane.doe@acme.com"), "Jane Doe");
        assert_eq!(sender_display_name("\"Jane\" <jane.m.doe@acme.com>"), "Jane M Doe");
        assert_eq!(sender_display_name("ops+quotes@acme.com"), "Ops");
        assert_eq!(sender_display_name("érik.dupont@fret.fr"), "Érik Dupont");
        // fallbacks keep the raw value
        assert_eq!(sender_display_name("not-an-address"), "not-an-address");
        assert_eq!(sender_display_name("...@acme.com"), "...@acme.com");
        assert_eq!(sender_display_name("jane@"), "jane@");
    }

    #[test]
    fn test_sender_address() {
        assert_eq!(sender_address(" ops@acme.com "), "ops@acme.com");
        assert_eq!(sender_address("Jane <jane@acme.com>"), "jane@acme.com");
        // a '<' inside the display name does not hide the address
        assert_eq!(
            sender_address("\"Ops <EU>\" < ops.eu@acme.com >"),
            "ops.eu@acme.com"
        );
        assert_eq!(sender_display_name("\"Ops <EU>\" <ops.eu@acme.com>"), "Ops Eu");
        assert_eq!(sender_address("broken <jane@acme.com"), "broken <jane@acme.com");
    }

    #[test]
    fn test_preview_strips_html_and_truncates() {
        let body = "<html><head><style>p{color:red}</style></head><body><p>Hello&nbsp;team,</p><p>Need a quote for 2x40ft &amp; insurance.</p></body></html>";
        assert_eq!(preview(body, 200), "Hello team, Need a quote for 2x40ft & insurance.");
        assert_eq!(preview(body, 10), "Hello team…");
        assert_eq!(preview("", 10), "");
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        let p = preview("ääääää", 3);
        assert_eq!(p, "äää…");
    }

    #[test]
    fn test_steps_from_string_and_object() {
        let as_string = json!("{\"steps\": [{\"title\": \"Load Email\"}, {\"title\": \"SOP Lookup\"}]}");
        let as_object = json!({"steps": [{"title": "Load Email"}, {"title": "SOP Lookup"}]});
        let as_array = json!([{"title": "Load Email"}, {"title": "SOP Lookup"}]);
        let nested = json!({"trace": {"steps": [{"title": "Load Email"}, {"title": "SOP Lookup"}]}});

        let a = parse_steps(Some(&as_string));
        assert_eq!(a.len(), 2);
        assert_eq!(a, parse_steps(Some(&as_object)));
        assert_eq!(a, parse_steps(Some(&as_array)));
        assert_eq!(a, parse_steps(Some(&nested)));
    }

    #[test]
    fn test_malformed_trace_yields_empty_steps() {
        for bad in [
            json!("{\"steps\": [ {\"title\": "),
            json!("not json at all"),
            json!({"steps": "nope"}),
            json!(42),
        ] {
            assert!(parse_steps(Some(&bad)).is_empty(), "{}", bad);
        }
        assert!(parse_steps(None).is_empty());
        assert!(parse_steps(Some(&json!(""))).is_empty());

        let email = map_record(&record(json!({"trace": "{{{"})), &MapperOptions::default());
        assert!(email.steps.is_empty());
        assert_eq!(email.sender_name, "Jane Doe");
    }

    #[test]
    fn test_map_record_full() {
        let r = record(json!({
            "updated_at": "2025-01-10T09:19:12Z",
            "subject": "Air freight SFO → FRA",
            "body": "<p>Please quote 120kg</p>",
            "reply": "Dear Jane, ...",
            "confidence": "82%",
            "status": "human_confirmed_replied",
            "origin_city": "San Francisco",
            "destination_city": "Frankfurt",
            "price": 2328.75,
            "currency": "USD",
            "trace": {"steps": [
                {"title": "Load Email"},
                {"title": "Tariff Sheet Lookup (Excel)"},
                {"title": "Carrier API lookup"},
                {"title": "Carrier API lookup"},
                {"title": "Calculate Quote (Air)", "data": {"final_amount": 2328.75}}
            ]}
        }));
        let email = map_record(&r, &MapperOptions::default());

        assert_eq!(email.status, UiStatus::Processed);
        assert_eq!(email.backend_status, BackendStatus::HumanConfirmedReplied);
        assert_eq!(email.preview, "Please quote 120kg");
        assert_eq!(email.response_time_secs, Some(252));
        assert_eq!(email.confidence_score, Some(0.82));
        assert_eq!(email.draft_response, "Dear Jane, ...");
        assert_eq!(email.steps.len(), 5);
        assert_eq!(
            email.data_sources,
            vec![
                DataSource { name: "Tariff Sheet Lookup (Excel)".into(), kind: "excel".into() },
                DataSource { name: "Carrier API lookup".into(), kind: "api".into() },
            ]
        );
        let route = email.route.unwrap();
        assert_eq!(route.destination.as_deref(), Some("Frankfurt"));
        assert!(email.sent.is_none());
    }

    #[test]
    fn test_map_record_is_deterministic() {
        let r = record(json!({"trace": [{"title": "Load Email"}], "body": "hi"}));
        let a = serde_json::to_value(map_record(&r, &MapperOptions::default())).unwrap();
        let b = serde_json::to_value(map_record(&r, &MapperOptions::default())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_confidence_score() {
        assert_eq!(confidence_score("high"), Some(0.9));
        assert_eq!(confidence_score("0.5"), Some(0.5));
        assert_eq!(confidence_score("75"), Some(0.75));
        assert_eq!(confidence_score("n/a"), None);
        assert_eq!(confidence_score("250"), None);
    }
}
