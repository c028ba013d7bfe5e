use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

use crate::AnalysisError;
use crate::provider::{FinishReason, ProviderReply};

static OPEN_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\r?\n?").expect("valid regex"));

static CLOSE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*```\s*$").expect("valid regex"));

static JSON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^json\b\s*").expect("valid regex"));

/// Recover the JSON object from a provider reply.
///
/// Replies cut off at the token limit are rejected outright.
pub fn repair(reply: &ProviderReply) -> Result<Map<String, Value>, AnalysisError> {
    if reply.finish_reason == FinishReason::MaxTokens {
        return Err(AnalysisError::UnparseableResponse(
            "response truncated at the token limit".into(),
        ));
    }
    repair_text(&reply.text)
}

/// Clean `raw` of fences, a leading `json` label and surrounding prose, then
/// parse what remains as a JSON object.
pub fn repair_text(raw: &str) -> Result<Map<String, Value>, AnalysisError> {
    let mut text = raw.trim();
    if let Some(m) = OPEN_FENCE_RE.find(text) {
        text = &text[m.end()..];
    }
    if let Some(m) = CLOSE_FENCE_RE.find(text) {
        text = &text[..m.start()];
    }
    text = text.trim();
    if let Some(m) = JSON_WORD_RE.find(text) {
        text = &text[m.end()..];
    }

    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(AnalysisError::UnparseableResponse(
                "no JSON object found in response".into(),
            ));
        }
    };
    let candidate = &text[start..=end];
    trace!(%candidate, "repaired provider response");

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AnalysisError::UnparseableResponse(
            "response is not a JSON object".into(),
        )),
        Err(e) => Err(AnalysisError::UnparseableResponse(e.to_string())),
    }
}
