//! Routing decision function.
//!
//! A pure function of the session state: given the most recent user message
//! and the accumulated state, pick the next step from a fixed priority list.
//! First match wins; order is load-bearing and covered by tests.
//!
//! Freshness-driven steps are revisited at most once per turn because
//! executing them stamps a new fetch time. The orchestrator still enforces a
//! hard iteration ceiling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::advisor::signals::{self, Action};
use crate::advisor::staleness::FreshnessPolicy;
use crate::session::{SessionState, Stage};

/// The closed set of steps. Terminal steps end the turn; the rest route back
/// through [`route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Ask,
    CropReco,
    Buy,
    Vision,
    Weather,
    Web,
    Schemes,
    Market,
    Advice,
}

impl StepName {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ask | Self::CropReco | Self::Buy | Self::Advice)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::CropReco => "crop_reco",
            Self::Buy => "buy",
            Self::Vision => "vision",
            Self::Weather => "weather",
            Self::Web => "web",
            Self::Schemes => "schemes",
            Self::Market => "market",
            Self::Advice => "advice",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decide the next step for the current state.
pub fn route(state: &SessionState, now: DateTime<Utc>, policy: &FreshnessPolicy) -> StepName {
    let last_user = state.last_user_text();
    let action = Action::parse(&last_user);
    let is_digest = action == Some(Action::Digest);
    let ctx = &state.context;

    // 1. Buy button overrides everything.
    if action == Some(Action::Buy) {
        return StepName::Buy;
    }

    // 2. Crop-recommendation button, or auto-recommend once when the crop is
    //    missing but a location is known. The "last step was not crop_reco OR
    //    the text explicitly asks" guard makes the auto path one-shot.
    let auto_reco = ctx.crop.is_none() && ctx.has_location() && !is_digest;
    if action == Some(Action::CropReco)
        || (auto_reco
            && (state.last_step != Some(StepName::CropReco)
                || signals::wants_crop_reco(&last_user)))
    {
        return StepName::CropReco;
    }

    // 3. Deterministic stage statement goes straight to advice; the stage
    //    itself was already applied by the intake shortcut.
    if signals::stage_statement(&last_user).is_some() {
        return StepName::Advice;
    }

    // 4. The auto-recommend precondition held but its one-shot guard failed.
    if auto_reco {
        return StepName::Ask;
    }

    // 5. A pending photo with no diagnosis yet.
    if state.last_image.is_some() && state.image_diagnosis.is_none() {
        return StepName::Vision;
    }

    // 6. Profile gaps block everything except digest turns.
    if needs_profile_questions(state) && !is_digest {
        return StepName::Ask;
    }

    // 7–10. Freshness-driven enrichment.
    if ctx.has_coordinates() && policy.weather_stale(state.weather.as_ref(), now) {
        return StepName::Weather;
    }

    if (!state.observation.symptoms.is_empty() || is_digest)
        && policy.web_stale(state.web.as_ref(), now)
    {
        return StepName::Web;
    }

    if (action == Some(Action::Schemes) || is_digest)
        && policy.schemes_stale(state.schemes.as_ref(), now)
    {
        return StepName::Schemes;
    }

    if (action == Some(Action::Market) || is_digest)
        && policy.market_stale(state.market.as_ref(), now)
    {
        return StepName::Market;
    }

    // 11. Everything known and fresh enough.
    StepName::Advice
}

/// Any of {name, location, crop, stage, land size} still missing?
fn needs_profile_questions(state: &SessionState) -> bool {
    let c = &state.context;
    c.farmer_name.is_none()
        || !c.has_location()
        || c.crop.is_none()
        || c.stage == Stage::Unknown
        || c.land_size.is_none()
}

// ── Tests ───────────────────────────────────────────────────────────
