//! JSON-object extraction from loose model output, and the bounded-retry
//! structured-output call.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::LlmError;
use crate::llm::{CompletionRequest, LlmProvider};

/// Pull the JSON object out of a model reply.
///
/// Models wrap objects in prose or code fences often enough that a strict
/// parse is useless; take the span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.starts_with('{') && text.ends_with('}') {
        return Some(text);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Run a completion and parse its reply as a JSON object, retrying up to
/// `max_attempts` times (no backoff). Fails terminally for this call only —
/// callers degrade to cached data or a fallback message.
pub async fn complete_json(
    llm: &dyn LlmProvider,
    request: CompletionRequest,
    max_attempts: u32,
) -> Result<Map<String, Value>, LlmError> {
    let attempts = max_attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=attempts {
        match llm.complete(request.clone()).await {
            Ok(resp) => {
                let raw = extract_json_object(&resp.content).unwrap_or_default();
                match serde_json::from_str::<Value>(raw) {
                    Ok(Value::Object(map)) => return Ok(map),
                    Ok(_) => last_reason = "model JSON was not an object".to_string(),
                    Err(e) => last_reason = e.to_string(),
                }
            }
            Err(e) => last_reason = e.to_string(),
        }
        warn!(attempt, max_attempts = attempts, reason = %last_reason, "structured output attempt failed");
    }

    Err(LlmError::InvalidResponse {
        provider: llm.model_name().to_string(),
        reason: format!("JSON parsing failed after {attempts} attempts: {last_reason}"),
    })
}

// ── Tests ───────────────────────────────────────────────────────────
