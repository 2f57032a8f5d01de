//! Deterministic text signals.
//!
//! Everything the orchestrator decides without a model call: the reserved
//! action-marker protocol (UI button presses wired through as literal
//! strings), the stage-statement patterns, crop-recommendation intent
//! phrases, and opportunistic lat/lon extraction from free text.
//!
//! Markers are translated into the closed [`Action`] enum at this boundary;
//! raw marker strings never travel through routing logic.

use std::sync::LazyLock;

use regex::Regex;

use crate::session::Stage;

/// Prefix shared by every reserved action marker. The front-end must never
/// let a user type these literally.
pub const ACTION_PREFIX: &str = "__ACTION__:";

pub const ACTION_SCHEMES: &str = "__ACTION__:SCHEMES";
pub const ACTION_MARKET: &str = "__ACTION__:MARKET";
pub const ACTION_DIGEST: &str = "__ACTION__:DIGEST";
pub const ACTION_CROP_RECO: &str = "__ACTION__:CROP_RECO";
pub const ACTION_BUY: &str = "__ACTION__:BUY";
pub const ACTION_SET_LANG_PREFIX: &str = "__ACTION__:SET_LANG:";

/// A UI button press, decoded from its reserved marker string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Schemes,
    Market,
    Digest,
    CropReco,
    Buy,
    SetLanguage(String),
}

impl Action {
    /// Decode a message into an action, by exact match only. Ordinary user
    /// text (including text that merely contains a marker) returns `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            ACTION_SCHEMES => Some(Self::Schemes),
            ACTION_MARKET => Some(Self::Market),
            ACTION_DIGEST => Some(Self::Digest),
            ACTION_CROP_RECO => Some(Self::CropReco),
            ACTION_BUY => Some(Self::Buy),
            _ => text
                .strip_prefix(ACTION_SET_LANG_PREFIX)
                .filter(|code| !code.is_empty())
                .map(|code| Self::SetLanguage(code.trim().to_lowercase())),
        }
    }
}

/// True for any reserved marker message (used by intake to skip extraction).
pub fn is_action_message(text: &str) -> bool {
    !text.is_empty() && text.starts_with(ACTION_PREFIX)
}

static STAGE_UPDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*my\s+stage\s+is\s+([a-z_]+)\.?\s*$").unwrap());
static STAGE_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*stage\s*:\s*([a-z_]+)\s*$").unwrap());

/// Extract a stage from a deterministic stage statement
/// (`"my stage is X."` or `"stage: X"`). The word must be a member of the
/// stage enumeration to take effect.
pub fn stage_statement(text: &str) -> Option<Stage> {
    if text.is_empty() {
        return None;
    }
    let caps = STAGE_UPDATE_RE
        .captures(text)
        .or_else(|| STAGE_INLINE_RE.captures(text))?;
    Stage::parse(caps.get(1)?.as_str())
}

const CROP_RECO_PHRASES: &[&str] = &[
    // English
    "recommend crop",
    "suggest crop",
    "which crop",
    "what crop",
    "crop suggestion",
    "crop recommendations",
    // Hindi
    "कौन सी फसल",
    "फसल सुझाव",
    "फसल बताओ",
    "फसल recommend",
    // Marathi
    "कोणते पीक",
    "पीक सुचवा",
    "पीक recommendation",
    "पीक सुचना",
];

/// Whether free text independently signals a crop-recommendation request.
pub fn wants_crop_reco(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let t = text.trim().to_lowercase();
    if t == ACTION_CROP_RECO.to_lowercase() {
        return true;
    }
    CROP_RECO_PHRASES.iter().any(|p| t.contains(p))
}

static LATLON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<lat>-?\d{1,3}(?:\.\d+)?)\s*[, ]\s*(?P<lon>-?\d{1,3}(?:\.\d+)?)").unwrap()
});

/// Opportunistically extract a "lat,lon" pair from free text. Out-of-range
/// coordinates are rejected.
pub fn extract_lat_lon(text: &str) -> Option<(f64, f64)> {
    let caps = LATLON_RE.captures(text.trim())?;
    let lat: f64 = caps.name("lat")?.as_str().parse().ok()?;
    let lon: f64 = caps.name("lon")?.as_str().parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some((lat, lon))
}

// ── Tests ───────────────────────────────────────────────────────────
