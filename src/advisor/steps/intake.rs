//! Intake — runs once per turn, before the routing loop.
//!
//! Deterministic shortcuts come first: a direct stage statement updates the
//! stage and returns early, and action-marker messages skip extraction
//! entirely (a language marker applies its code on the way out). Otherwise
//! lat/lon are opportunistically parsed from the text, the location is
//! geocoded if still unresolved, and the structured-extraction client turns
//! the message into a partial update for the merge engine.

use serde_json::json;
use tracing::warn;

use crate::advisor::lang::language_name;
use crate::advisor::merge::{IntakeExtraction, merge_context, merge_observation};
use crate::advisor::orchestrator::Advisor;
use crate::advisor::signals::{self, Action};
use crate::advisor::steps::StepUpdate;
use crate::llm::{CompletionRequest, DEFAULT_JSON_ATTEMPTS, complete_json};
use crate::session::SessionState;

const INTAKE_TEMPERATURE: f32 = 0.1;

const ALLOWED_STAGES: &str = "unknown, pre_sowing, sowing, germination, vegetative, \
                              flowering, fruiting, maturity, harvest, post_harvest";

impl Advisor {
    /// Intake never stamps `last_step`: the one-shot auto-recommendation
    /// guard in routing reads the previous turn's terminal step.
    pub(crate) async fn step_intake(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::default();
        let last_user = state.last_user_text();

        // Deterministic stage statement: apply and stop.
        if let Some(stage) = signals::stage_statement(&last_user) {
            let mut ctx = state.context.clone();
            ctx.stage = stage;
            update.context = Some(ctx);
            return update;
        }

        // Button presses carry no extractable content.
        if let Some(action) = Action::parse(&last_user) {
            if let Action::SetLanguage(code) = action {
                let mut ctx = state.context.clone();
                ctx.language = code;
                update.context = Some(ctx);
            }
            return update;
        }
        if signals::is_action_message(&last_user) {
            return update;
        }

        // Opportunistic lat/lon from free text.
        let mut ctx = state.context.clone();
        if let Some((lat, lon)) = signals::extract_lat_lon(&last_user)
            && !ctx.has_coordinates()
        {
            ctx.lat = Some(lat);
            ctx.lon = Some(lon);
        }

        let system = format!(
            "Extract farmer + crop context.\n\
             Return ONLY JSON object.\n\
             Allowed stages: {ALLOWED_STAGES}.\n\
             Urgency: low|medium|high.\n\
             Responding language: {}.\n",
            language_name(&ctx.language)
        );
        let user = format!(
            "Known context:\n{}\n\nKnown observation:\n{}\n\nNew message:\n{last_user}\n\n\
             Extract keys: farmer_name, land_size, land_unit, crop, stage, location_text, \
             sowing_date, irrigation, soil_type, notes, symptoms, pests_seen, urgency.",
            json!(&ctx),
            json!(&state.observation),
        );

        let request = CompletionRequest::new(user)
            .with_system(system)
            .with_temperature(INTAKE_TEMPERATURE);

        match complete_json(self.llm.as_ref(), request, DEFAULT_JSON_ATTEMPTS).await {
            Ok(map) => {
                let extraction = IntakeExtraction::from_value(&serde_json::Value::Object(map));
                let mut merged = merge_context(&ctx, &extraction);

                // Resolve a freshly-learned location so the freshness rules
                // can route to weather this same turn.
                if !merged.has_coordinates()
                    && let Some(loc) = merged.location_text.clone()
                    && !loc.trim().is_empty()
                {
                    match self.enrichment.geocode(&loc).await {
                        Ok(geo) => {
                            if let (Some(lat), Some(lon)) = (geo.lat, geo.lon) {
                                merged.lat = Some(lat);
                                merged.lon = Some(lon);
                                merged.location_text = Some(geo.resolved_name);
                            }
                        }
                        Err(e) => warn!(error = %e, "geocoding failed during intake"),
                    }
                }

                update.observation = Some(merge_observation(&state.observation, &extraction));
                update.context = Some(merged);
            }
            Err(e) => {
                warn!(error = %e, "intake extraction failed");
                // Keep the (possibly lat/lon-enriched) context.
                update.context = Some(ctx);
            }
        }

        update
    }
}
