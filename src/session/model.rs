//! Session data model — farmer context, observations, enrichment snapshots,
//! and the output-only advisory records.
//!
//! `SessionState` is the sole unit of persistence: one per chat identifier,
//! serialized as a JSON blob by the store. It is always handled as an owned
//! value — the orchestrator clones the loaded state, advances the copy step
//! by step, and returns it.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Message log cap — oldest entries are dropped past this.
pub const MESSAGE_LOG_CAP: usize = 16;

/// Current UTC time as an RFC 3339 string with seconds precision.
///
/// Canonical format for all snapshot timestamps.
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── Closed enumerations ─────────────────────────────────────────────

/// Crop growth stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Unknown,
    PreSowing,
    Sowing,
    Germination,
    Vegetative,
    Flowering,
    Fruiting,
    Maturity,
    Harvest,
    PostHarvest,
}

impl Stage {
    /// Parse a stage name, case-insensitively. Anything outside the closed
    /// enumeration is rejected with `None` — callers keep their prior value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "unknown" => Some(Self::Unknown),
            "pre_sowing" => Some(Self::PreSowing),
            "sowing" => Some(Self::Sowing),
            "germination" => Some(Self::Germination),
            "vegetative" => Some(Self::Vegetative),
            "flowering" => Some(Self::Flowering),
            "fruiting" => Some(Self::Fruiting),
            "maturity" => Some(Self::Maturity),
            "harvest" => Some(Self::Harvest),
            "post_harvest" => Some(Self::PostHarvest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::PreSowing => "pre_sowing",
            Self::Sowing => "sowing",
            Self::Germination => "germination",
            Self::Vegetative => "vegetative",
            Self::Flowering => "flowering",
            Self::Fruiting => "fruiting",
            Self::Maturity => "maturity",
            Self::Harvest => "harvest",
            Self::PostHarvest => "post_harvest",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Symptom urgency. Ordered: merges may only raise it, never lower.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Confidence of a generated advisory or diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

impl Confidence {
    /// Parse a confidence level; anything unrecognized defaults to `Medium`.
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

// ── Message log ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Farmer profile & observation ────────────────────────────────────

/// Accumulated farmer profile. Mutated only by the merge engine or by
/// deterministic direct assignment (GPS share, stage button, language button).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FarmerContext {
    pub farmer_name: Option<String>,
    pub crop: Option<String>,
    #[serde(default)]
    pub stage: Stage,

    pub land_size: Option<f64>,
    pub land_unit: Option<String>,

    pub location_text: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,

    pub sowing_date: Option<String>,
    pub irrigation: Option<String>,
    pub soil_type: Option<String>,
    pub notes: Option<String>,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl FarmerContext {
    /// A location is known when either coordinates or a non-empty free-text
    /// location is present.
    pub fn has_location(&self) -> bool {
        (self.lat.is_some() && self.lon.is_some())
            || self
                .location_text
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
    }

    pub fn has_coordinates(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    /// Best printable location: the free text, else "lat,lon".
    pub fn location_label(&self) -> String {
        if let Some(t) = self.location_text.as_deref()
            && !t.trim().is_empty()
        {
            return t.trim().to_string();
        }
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => format!("{lat:.4},{lon:.4}"),
            _ => String::new(),
        }
    }
}

/// Accumulated symptom/pest observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub pests_seen: Vec<String>,
    #[serde(default)]
    pub urgency: Urgency,
}

// ── Enrichment snapshots ────────────────────────────────────────────

/// Weather snapshot. `fetched_at_utc` drives the staleness check and is kept
/// as a string so an unparsable stored value degrades to "maximally stale"
/// instead of a load failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    #[serde(default)]
    pub fetched_at_utc: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub alerts: Vec<String>,
    /// Short per-day outlook hints, today first.
    #[serde(default)]
    pub daily: Vec<String>,
}

/// Web search snapshot — also the shape of the schemes, market, and
/// buy-links results (those are scoped web searches).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebContext {
    #[serde(default)]
    pub fetched_at_utc: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub snippets: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

// ── Image pipeline ──────────────────────────────────────────────────

/// A crop photo awaiting (or having received) diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub file_path: String,
    pub remote_file_id: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub created_at_utc: String,
}

/// Diagnosis produced from a crop photo. Output-only: produced fresh by the
/// coercion layer, replaces the prior value wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDiagnosis {
    pub issue: String,
    #[serde(default)]
    pub likely_causes: Vec<String>,
    #[serde(default)]
    pub actions_now: Vec<String>,
    #[serde(default)]
    pub watch_out_for: Vec<String>,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub needs_human_review: bool,
}

// ── Advisory ────────────────────────────────────────────────────────

/// The turn's deliverable. Output-only: built exclusively by the coercion
/// layer and replaced wholesale each time a generation step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub headline: String,
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub actions_now: Vec<String>,
    #[serde(default)]
    pub watch_out_for: Vec<String>,
    #[serde(default)]
    pub rationale_brief: String,
    #[serde(default)]
    pub safety_notes: Vec<String>,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub needs_human_review: bool,
}

// ── Session state ───────────────────────────────────────────────────

/// One per chat/session identifier; the sole unit of persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub turn_count: u64,
    pub last_step: Option<crate::advisor::StepName>,

    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    #[serde(default)]
    pub context: FarmerContext,
    #[serde(default)]
    pub observation: Observation,

    pub weather: Option<WeatherSnapshot>,
    pub web: Option<WebContext>,
    pub schemes: Option<WebContext>,
    pub market: Option<WebContext>,

    pub last_image: Option<ImageAsset>,
    pub image_diagnosis: Option<ImageDiagnosis>,

    pub advisory: Option<Advisory>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            context: FarmerContext {
                language: default_language(),
                ..FarmerContext::default()
            },
            ..Self::default()
        }
    }

    pub fn add_user(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::user(text));
        self.compact_messages();
    }

    pub fn add_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(text));
        self.compact_messages();
    }

    /// Cap the message log, dropping the oldest entries.
    pub fn compact_messages(&mut self) {
        if self.messages.len() > MESSAGE_LOG_CAP {
            let excess = self.messages.len() - MESSAGE_LOG_CAP;
            self.messages.drain(..excess);
        }
    }

    /// Most recent user-authored message, trimmed. Empty string if none.
    pub fn last_user_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default()
    }

    /// Most recent assistant-authored message, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Assistant)
            .map(|m| m.content.as_str())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_parse_accepts_all_members() {
        for name in [
            "unknown",
            "pre_sowing",
            "sowing",
            "germination",
            "vegetative",
            "flowering",
            "fruiting",
            "maturity",
            "harvest",
            "post_harvest",
        ] {
            let stage = Stage::parse(name).expect(name);
            assert_eq!(stage.as_str(), name);
        }
    }

    #[test]
    fn stage_parse_rejects_unknown_words() {
        assert_eq!(Stage::parse("bogus"), None);
        assert_eq!(Stage::parse(""), None);
        assert_eq!(Stage::parse("sowing!"), None);
    }

    #[test]
    fn stage_parse_is_case_insensitive() {
        assert_eq!(Stage::parse("Flowering"), Some(Stage::Flowering));
        assert_eq!(Stage::parse("  HARVEST "), Some(Stage::Harvest));
    }

    #[test]
    fn urgency_ordering() {
        assert!(Urgency::Low < Urgency::Medium);
        assert!(Urgency::Medium < Urgency::High);
        assert_eq!(Urgency::parse("weird"), None);
    }

    #[test]
    fn confidence_defaults_to_medium() {
        assert_eq!(Confidence::parse_or_default("high"), Confidence::High);
        assert_eq!(Confidence::parse_or_default("???"), Confidence::Medium);
        assert_eq!(Confidence::default(), Confidence::Medium);
    }

    #[test]
    fn message_log_capped_at_sixteen() {
        let mut state = SessionState::new("1");
        for i in 0..40 {
            state.add_user(format!("msg {i}"));
        }
        assert_eq!(state.messages.len(), MESSAGE_LOG_CAP);
        // Oldest dropped, newest kept.
        assert_eq!(state.messages.last().unwrap().content, "msg 39");
        assert_eq!(state.messages.first().unwrap().content, "msg 24");
    }

    #[test]
    fn last_user_text_skips_assistant_messages() {
        let mut state = SessionState::new("1");
        state.add_user("  hello  ");
        state.add_assistant("hi there");
        assert_eq!(state.last_user_text(), "hello");
        assert_eq!(state.last_assistant_text(), Some("hi there"));
    }

    #[test]
    fn last_user_text_empty_when_no_user_messages() {
        let state = SessionState::new("1");
        assert_eq!(state.last_user_text(), "");
    }

    #[test]
    fn has_location_from_text_or_coordinates() {
        let mut ctx = FarmerContext::default();
        assert!(!ctx.has_location());

        ctx.location_text = Some("   ".into());
        assert!(!ctx.has_location());

        ctx.location_text = Some("Pune".into());
        assert!(ctx.has_location());
        assert!(!ctx.has_coordinates());

        ctx.location_text = None;
        ctx.lat = Some(18.52);
        assert!(!ctx.has_location());
        ctx.lon = Some(73.86);
        assert!(ctx.has_location());
        assert!(ctx.has_coordinates());
    }

    #[test]
    fn location_label_prefers_text() {
        let ctx = FarmerContext {
            location_text: Some("Pune".into()),
            lat: Some(18.52),
            lon: Some(73.86),
            ..FarmerContext::default()
        };
        assert_eq!(ctx.location_label(), "Pune");

        let ctx = FarmerContext {
            lat: Some(18.52),
            lon: Some(73.86),
            ..FarmerContext::default()
        };
        assert_eq!(ctx.location_label(), "18.5200,73.8600");
    }

    #[test]
    fn session_state_roundtrips_through_json() {
        let mut state = SessionState::new("chat-42");
        state.context.crop = Some("rice".into());
        state.context.stage = Stage::Germination;
        state.observation.symptoms.push("yellow leaves".into());
        state.weather = Some(WeatherSnapshot {
            fetched_at_utc: utc_now_iso(),
            summary: "Clear • 31°".into(),
            alerts: vec![],
            daily: vec!["clear sky".into()],
        });

        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, "chat-42");
        assert_eq!(back.context.crop.as_deref(), Some("rice"));
        assert_eq!(back.context.stage, Stage::Germination);
        assert_eq!(back.observation.symptoms, vec!["yellow leaves"]);
        assert!(back.weather.is_some());
    }

    #[test]
    fn utc_now_iso_has_seconds_precision() {
        let ts = utc_now_iso();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        assert!(!ts.contains('.'));
    }
}
