//! Generation steps — crop recommendation and the final advice. Both call
//! the model in generation mode and run its JSON through the coercion
//! layer; on total failure they emit a fixed fallback message instead of an
//! advisory.

use serde_json::json;
use tracing::warn;

use crate::advisor::coerce::coerce_advisory;
use crate::advisor::lang::{language_name, tr};
use crate::advisor::orchestrator::Advisor;
use crate::advisor::route::StepName;
use crate::advisor::signals::{self, Action};
use crate::advisor::steps::StepUpdate;
use crate::llm::{CompletionRequest, DEFAULT_JSON_ATTEMPTS, complete_json};
use crate::providers::TimeRange;
use crate::session::{ChatMessage, SessionState};

const CROP_RECO_TEMPERATURE: f32 = 0.2;
const ADVICE_TEMPERATURE: f32 = 0.25;

/// Key list handed to the model so its JSON matches the advisory shape.
const ADVISORY_KEYS: &str = "headline (string), stage (string), actions_now (list), \
                             watch_out_for (list), safety_notes (list), rationale_brief (string), \
                             confidence (low|medium|high), needs_human_review (boolean)";

impl Advisor {
    /// Recommend crops for the farmer's location. Terminal.
    pub(crate) async fn step_crop_reco(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::for_step(StepName::CropReco);
        let mut ctx = state.context.clone();

        // Resolve coordinates from the location text if needed.
        if !ctx.has_coordinates()
            && let Some(loc) = ctx.location_text.clone()
        {
            match self.enrichment.geocode(&loc).await {
                Ok(geo) => {
                    if let (Some(lat), Some(lon)) = (geo.lat, geo.lon) {
                        ctx.lat = Some(lat);
                        ctx.lon = Some(lon);
                        ctx.location_text = Some(geo.resolved_name);
                    }
                }
                Err(e) => warn!(error = %e, "geocoding failed in crop_reco"),
            }
        }

        let loc_text = ctx.location_label();

        // Opportunistic weather refresh for the prompt.
        let mut weather = state.weather.clone();
        if let (Some(lat), Some(lon)) = (ctx.lat, ctx.lon)
            && self
                .freshness
                .weather_stale(weather.as_ref(), chrono::Utc::now())
        {
            match self.enrichment.weather(lat, lon).await {
                Ok(snap) => weather = Some(snap),
                Err(e) => warn!(error = %e, "weather refresh failed in crop_reco"),
            }
        }

        let mut soil_snippets: Vec<String> = Vec::new();
        let mut crop_snippets: Vec<String> = Vec::new();
        let mut web = None;

        match self
            .enrichment
            .web_search(
                &format!("typical soil pH in {loc_text} agriculture"),
                TimeRange::Year,
            )
            .await
        {
            Ok(found) => soil_snippets = found.snippets.iter().take(3).cloned().collect(),
            Err(e) => warn!(error = %e, "soil pH search failed in crop_reco"),
        }
        match self
            .enrichment
            .web_search(
                &format!("best crops suitable for climate in {loc_text} India"),
                TimeRange::Year,
            )
            .await
        {
            Ok(found) => {
                crop_snippets = found.snippets.iter().take(4).cloned().collect();
                web = Some(found);
            }
            Err(e) => warn!(error = %e, "crop suitability search failed in crop_reco"),
        }

        let lang = ctx.language.clone();
        let system = format!(
            "You are an agronomy assistant.\n\
             Goal: Recommend crops for the farmer's location.\n\
             Return ONLY a JSON object with keys: {ADVISORY_KEYS}.\n\
             Constraints:\n\
             - stage MUST be 'pre_sowing'\n\
             - headline must mention location and estimated soil pH RANGE (approx)\n\
             - actions_now must include: (1) 5-7 crop options (list), (2) 2-3 next steps to validate soil/pH locally\n\
             - watch_out_for: 2-3 risks\n\
             - safety_notes: 0-2\n\
             - No pesticide dosage/mixing ratios.\n\
             Respond in {}.\n",
            language_name(&lang)
        );
        let user = format!(
            "Location: {loc_text}\n\
             Weather summary: {}\n\
             Soil pH web snippets: {}\n\
             Crop suitability web snippets: {}\n\
             Known farmer land size: {} {}\n\
             Now produce crop recommendations.",
            weather.as_ref().map(|w| w.summary.as_str()).unwrap_or("null"),
            json!(soil_snippets),
            json!(crop_snippets),
            ctx.land_size.map_or("null".to_string(), |v| v.to_string()),
            ctx.land_unit.as_deref().unwrap_or(""),
        );

        let request = CompletionRequest::new(user)
            .with_system(system)
            .with_temperature(CROP_RECO_TEMPERATURE);

        let mut messages = state.messages.clone();
        match complete_json(self.llm.as_ref(), request, DEFAULT_JSON_ATTEMPTS).await {
            Ok(map) => {
                let advisory = coerce_advisory(&serde_json::Value::Object(map));
                messages.push(ChatMessage::assistant(advisory.headline.clone()));
                update.context = Some(ctx);
                if let Some(w) = weather {
                    update.weather = Some(w);
                }
                if let Some(w) = web {
                    update.web = Some(w);
                }
                update.advisory = Some(Some(advisory));
                update.messages = Some(messages);
            }
            Err(e) => {
                warn!(error = %e, "crop recommendation generation failed");
                messages.push(ChatMessage::assistant(tr(
                    &lang,
                    "Share location and ask: recommend crops.",
                    "स्थान भेजें और पूछें: recommend crops।",
                    "ठिकाण पाठवा आणि विचारा: recommend crops.",
                )));
                update.advisory = Some(None);
                update.messages = Some(messages);
            }
        }

        update
    }

    /// Produce the turn's advisory from everything accumulated. Terminal.
    pub(crate) async fn step_advice(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::for_step(StepName::Advice);
        let ctx = &state.context;
        let lang = ctx.language.clone();

        let last_user = state.last_user_text();
        let action = Action::parse(&last_user);
        let is_digest = action == Some(Action::Digest);
        let wants_schemes = action == Some(Action::Schemes) || is_digest;
        let wants_market = action == Some(Action::Market) || is_digest;

        let weather = state.weather.as_ref().map(|w| {
            json!({
                "summary": w.summary,
                "alerts": w.alerts.iter().take(2).collect::<Vec<_>>(),
            })
        });
        let web = state
            .web
            .as_ref()
            .map(|w| json!({"snippets": w.snippets.iter().take(2).collect::<Vec<_>>()}));
        let schemes = state
            .schemes
            .as_ref()
            .filter(|_| wants_schemes)
            .map(|s| json!({"snippets": s.snippets.iter().take(2).collect::<Vec<_>>()}));
        let market = state
            .market
            .as_ref()
            .filter(|_| wants_market)
            .map(|m| json!({"snippets": m.snippets.iter().take(2).collect::<Vec<_>>()}));

        // Photo findings are folded in only for organic turns; stage updates
        // and button presses should not resurface an old diagnosis.
        let include_image = state.image_diagnosis.is_some()
            && signals::stage_statement(&last_user).is_none()
            && !signals::is_action_message(&last_user);
        let image = state
            .image_diagnosis
            .as_ref()
            .filter(|_| include_image)
            .map(|d| json!(d));

        let system = format!(
            "Return ONLY a JSON object with keys: {ADVISORY_KEYS}.\n\
             Keep concise.\n\
             actions_now: 3-5, watch_out_for: 2-3, safety_notes: 0-2, rationale_brief <= 200 chars.\n\
             No pesticide dosage/mixing ratios.\n\
             Respond in {}.\n",
            language_name(&lang)
        );
        let user = format!(
            "Context:{}\nObs:{}\nWeather:{}\nWeb:{}\nSchemes:{}\nMarket:{}\nImage:{}\n",
            json!(ctx),
            json!(&state.observation),
            json!(weather),
            json!(web),
            json!(schemes),
            json!(market),
            json!(image),
        );

        let request = CompletionRequest::new(user)
            .with_system(system)
            .with_temperature(ADVICE_TEMPERATURE);

        let mut messages = state.messages.clone();
        match complete_json(self.llm.as_ref(), request, DEFAULT_JSON_ATTEMPTS).await {
            Ok(map) => {
                let advisory = coerce_advisory(&serde_json::Value::Object(map));
                messages.push(ChatMessage::assistant(advisory.headline.clone()));
                update.advisory = Some(Some(advisory));
                update.messages = Some(messages);
            }
            Err(e) => {
                warn!(error = %e, "advice generation failed");
                messages.push(ChatMessage::assistant(
                    crate::advisor::lang::generic_fallback(&lang),
                ));
                update.advisory = Some(None);
                update.messages = Some(messages);
            }
        }

        update
    }
}
