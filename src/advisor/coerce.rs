//! Response coercion layer.
//!
//! The boundary between untrusted generated JSON and the typed data model.
//! Every helper here degrades invalid input to defaults — this module never
//! returns an error and never panics.
//!
//! Caps: advisory actions ≤5, cautions ≤3, safety notes ≤2, rationale ≤220
//! chars; diagnosis causes/actions ≤3, cautions ≤2.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::session::{Advisory, Confidence, ImageDiagnosis, Stage};

const FALLBACK_HEADLINE: &str = "Advisory update";
const FALLBACK_ISSUE: &str = "Unclear issue from image (needs clearer photo or more details).";

const MAX_ACTIONS: usize = 5;
const MAX_WATCH: usize = 3;
const MAX_SAFETY: usize = 2;
const MAX_RATIONALE_CHARS: usize = 220;

const MAX_DIAG_CAUSES: usize = 3;
const MAX_DIAG_ACTIONS: usize = 3;
const MAX_DIAG_WATCH: usize = 2;

static LIST_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\n•]+").unwrap());

/// Coerce a list field: accepts a real array, or a single newline/bullet
/// delimited string (split and trimmed). Anything else becomes empty.
fn coerce_list(v: Option<&Value>, cap: usize) -> Vec<String> {
    let items: Vec<String> = match v {
        Some(Value::Array(arr)) => arr
            .iter()
            .map(|x| match x {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string().trim().to_string(),
            })
            .collect(),
        Some(Value::String(s)) => LIST_SPLIT_RE
            .split(s)
            .map(|p| p.trim().to_string())
            .collect(),
        _ => Vec::new(),
    };
    items.into_iter().filter(|s| !s.is_empty()).take(cap).collect()
}

/// First non-empty string found under any of the given keys.
fn first_string<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| {
        data.get(k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

/// Boolean-like coercion: real booleans pass through, `"true"/"yes"/"1"`
/// strings become true, everything else false.
fn coerce_bool(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn coerce_confidence(v: Option<&Value>) -> Confidence {
    match v.and_then(Value::as_str) {
        Some(s) => Confidence::parse_or_default(s),
        None => Confidence::Medium,
    }
}

/// Char-aware truncation (byte slicing can land inside a UTF-8 boundary).
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Normalize loosely-structured model output into an `Advisory`.
pub fn coerce_advisory(data: &Value) -> Advisory {
    let headline = first_string(data, &["headline"])
        .unwrap_or(FALLBACK_HEADLINE)
        .to_string();

    let stage = data
        .get("stage")
        .and_then(Value::as_str)
        .and_then(Stage::parse)
        .unwrap_or_default();

    let rationale = data
        .get("rationale_brief")
        .and_then(Value::as_str)
        .map(str::trim)
        .map(|s| truncate_chars(s, MAX_RATIONALE_CHARS))
        .unwrap_or_default();

    Advisory {
        headline,
        stage,
        actions_now: coerce_list(data.get("actions_now"), MAX_ACTIONS),
        watch_out_for: coerce_list(data.get("watch_out_for"), MAX_WATCH),
        rationale_brief: rationale,
        safety_notes: coerce_list(data.get("safety_notes"), MAX_SAFETY),
        confidence: coerce_confidence(data.get("confidence")),
        needs_human_review: coerce_bool(data.get("needs_human_review")),
    }
}

/// Normalize loosely-structured model output into an `ImageDiagnosis`.
///
/// Vision models name the issue field inconsistently; probe the usual
/// aliases before giving up.
pub fn coerce_image_diagnosis(data: &Value) -> ImageDiagnosis {
    let issue = first_string(
        data,
        &[
            "issue",
            "problem",
            "disease",
            "diagnosis",
            "issue_detected",
            "observation",
        ],
    )
    .unwrap_or(FALLBACK_ISSUE)
    .to_string();

    let likely_causes = coerce_list(
        data.get("likely_causes").or_else(|| data.get("causes")),
        MAX_DIAG_CAUSES,
    );
    let actions_now = coerce_list(
        data.get("actions_now")
            .or_else(|| data.get("actions"))
            .or_else(|| data.get("remedy")),
        MAX_DIAG_ACTIONS,
    );
    let watch_out_for = coerce_list(
        data.get("watch_out_for")
            .or_else(|| data.get("precautions"))
            .or_else(|| data.get("watch")),
        MAX_DIAG_WATCH,
    );

    ImageDiagnosis {
        issue,
        likely_causes,
        actions_now,
        watch_out_for,
        confidence: coerce_confidence(data.get("confidence")),
        needs_human_review: coerce_bool(data.get("needs_human_review")),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
