//! Processing trace steps
//!
//! The backend records how it handled each email as a loosely structured
//! list of steps. Steps that look like step objects become
//! [`TraceStep::Step`]; anything else is kept as [`TraceStep::Unknown`].
//! Icon choice and decision detection go through a [`StepClassifier`] so
//! the title heuristic can be swapped out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting attached to LLM-backed steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

/// A recognised trace step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// From `title`, `action` or `step`, first one present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// From `output` or `reason`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_usage: Option<LlmUsage>,
}

/// One entry of a processing trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TraceStep {
    Step(StepRecord),
    Unknown(Value),
}

const STEP_KEYS: [&str; 7] = [
    "title", "action", "step", "summary", "data", "output", "reason",
];

impl TraceStep {
    /// Interpret a single JSON value from the trace
    pub fn from_value(value: Value) -> Self {
        let Some(obj) = value.as_object() else {
            return TraceStep::Unknown(value);
        };
        if !STEP_KEYS.iter().any(|k| obj.contains_key(*k)) {
            return TraceStep::Unknown(value);
        }

        let text = |key: &str| -> Option<String> {
            match obj.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            }
        };
        let present = |key: &str| obj.get(key).filter(|v| !v.is_null()).cloned();

        TraceStep::Step(StepRecord {
            title: text("title").or_else(|| text("action")).or_else(|| text("step")),
            summary: text("summary"),
            data: present("data"),
            output: present("output").or_else(|| present("reason")),
            timestamp: text("timestamp"),
            llm_usage: obj
                .get("llm_usage")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
        })
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            TraceStep::Step(s) => s.title.as_deref(),
            TraceStep::Unknown(_) => None,
        }
    }

    pub fn as_step(&self) -> Option<&StepRecord> {
        match self {
            TraceStep::Step(s) => Some(s),
            TraceStep::Unknown(_) => None,
        }
    }
}

/// Coarse category of a trace step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Load,
    Extraction,
    DataLookup,
    Quote,
    Decision,
    Reply,
    Other,
}

impl StepKind {
    /// Terminal glyph for `--human` output
    pub fn glyph(self) -> &'static str {
        match self {
            StepKind::Load => "📥",
            StepKind::Extraction => "🧠",
            StepKind::DataLookup => "🗄",
            StepKind::Quote => "🧮",
            StepKind::Decision => "🧑",
            StepKind::Reply => "📤",
            StepKind::Other => "•",
        }
    }
}

/// Decides what kind of step a trace entry is
pub trait StepClassifier: Send + Sync {
    fn classify(&self, step: &TraceStep) -> StepKind;

    fn is_decision(&self, step: &TraceStep) -> bool {
        self.classify(step) == StepKind::Decision
    }
}

/// Substring matching on the lowercased step title.
///
/// Order matters: "human"/"decision" win over everything else, so a title
/// like "Human review of quote" counts as a decision, not a quote.
#[derive(Debug, Clone, Copy, Default)]
pub struct TitleHeuristic;

const TITLE_RULES: &[(&[&str], StepKind)] = &[
    (&["human", "decision", "approval", "review"], StepKind::Decision),
    (&["reply", "send", "respond", "webhook"], StepKind::Reply),
    (&["quote", "price", "pricing", "calculate", "rate"], StepKind::Quote),
    (
        &["lookup", "sop", "database", "excel", "sheet", "api", "search", "match"],
        StepKind::DataLookup,
    ),
    (&["extract", "parse", "llm", "openai", "classif"], StepKind::Extraction),
    (&["load", "fetch", "receive", "ingest"], StepKind::Load),
];

impl StepClassifier for TitleHeuristic {
    fn classify(&self, step: &TraceStep) -> StepKind {
        let Some(title) = step.title() else {
            return StepKind::Other;
        };
        let title = title.to_lowercase();
        TITLE_RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| title.contains(n)))
            .map(|(_, kind)| *kind)
            .unwrap_or(StepKind::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_aliases() {
        let step = TraceStep::from_value(json!({
            "action": "Extraction: OpenAI",
            "reason": "low confidence on weight",
            "llm_usage": {"model": "gpt-4o", "total_tokens": 812}
        }));
        let rec = step.as_step().unwrap();
        assert_eq!(rec.title.as_deref(), Some("Extraction: OpenAI"));
        assert_eq!(rec.output, Some(json!("low confidence on weight")));
        assert_eq!(rec.llm_usage.as_ref().unwrap().total_tokens, Some(812));
    }

    #[test]
    fn test_numeric_step_becomes_title() {
        let step = TraceStep::from_value(json!({"step": 3, "summary": "done"}));
        assert_eq!(step.title(), Some("3"));
    }

    #[test]
    fn test_unknown_variants() {
        assert!(matches!(TraceStep::from_value(json!("free text")), TraceStep::Unknown(_)));
        assert!(matches!(TraceStep::from_value(json!({"foo": 1})), TraceStep::Unknown(_)));
        assert!(matches!(TraceStep::from_value(json!(null)), TraceStep::Unknown(_)));
    }

    #[test]
    fn test_malformed_llm_usage_is_dropped() {
        let step = TraceStep::from_value(json!({"title": "LLM", "llm_usage": "lots"}));
        assert!(step.as_step().unwrap().llm_usage.is_none());
    }

    #[test]
    fn test_title_heuristic() {
        let c = TitleHeuristic;
        let kind = |t: &str| c.classify(&TraceStep::from_value(json!({ "title": t })));

        assert_eq!(kind("Load Email"), StepKind::Load);
        assert_eq!(kind("Extraction: OpenAI"), StepKind::Extraction);
        assert_eq!(kind("SOP Lookup"), StepKind::DataLookup);
        assert_eq!(kind("Calculate Quote (Air)"), StepKind::Quote);
        assert_eq!(kind("Human Decision Required"), StepKind::Decision);
        assert_eq!(kind("Send Reply"), StepKind::Reply);
        assert_eq!(kind("Something else"), StepKind::Other);
        assert!(c.is_decision(&TraceStep::from_value(json!({"title": "Awaiting human"}))));
        assert_eq!(c.classify(&TraceStep::Unknown(json!(1))), StepKind::Other);
    }

    #[test]
    fn test_custom_classifier() {
        struct Everything;
        impl StepClassifier for Everything {
            fn classify(&self, _: &TraceStep) -> StepKind {
                StepKind::Decision
            }
        }
        assert!(Everything.is_decision(&TraceStep::Unknown(json!(null))));
    }
}
