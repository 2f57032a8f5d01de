//! Turn orchestrator.
//!
//! Drives one inbound message through {intake → route → execute → merge}
//! until a terminal step is reached. The incoming state is never mutated in
//! place: the loop advances a deep copy and returns it, leaving persistence
//! to the session store.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::advisor::lang;
use crate::advisor::route::{StepName, route};
use crate::advisor::staleness::FreshnessPolicy;
use crate::advisor::steps::StepUpdate;
use crate::llm::LlmProvider;
use crate::providers::Enrichment;
use crate::session::SessionState;

/// Hard ceiling on routing iterations per turn. Routing is freshness-bounded
/// and normally terminates in well under this many steps; the ceiling guards
/// against a future rule change introducing a cycle and against providers
/// that fail without ever stamping a fresh snapshot.
pub const MAX_STEPS_PER_TURN: usize = 8;

/// The turn orchestrator. One instance serves all sessions; each turn works
/// on its own owned copy of the session state.
pub struct Advisor {
    pub(crate) llm: Arc<dyn LlmProvider>,
    pub(crate) enrichment: Arc<dyn Enrichment>,
    pub(crate) freshness: FreshnessPolicy,
}

impl Advisor {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        enrichment: Arc<dyn Enrichment>,
        freshness: FreshnessPolicy,
    ) -> Self {
        Self {
            llm,
            enrichment,
            freshness,
        }
    }

    /// Run one full turn: append the inbound message, extract once, then
    /// loop through the routing decision function until a terminal step.
    pub async fn run_turn(&self, state: &SessionState, user_text: &str) -> SessionState {
        let mut s = state.clone();
        s.add_user(user_text);
        s.turn_count += 1;

        let update = self.step_intake(&s).await;
        apply_update(&mut s, update);

        for iteration in 0..MAX_STEPS_PER_TURN {
            let step = route(&s, Utc::now(), &self.freshness);
            debug!(session = %s.session_id, %step, iteration, "routing");

            let update = self.execute(step, &s).await;
            apply_update(&mut s, update);

            if step.is_terminal() {
                return s;
            }
        }

        // Ceiling reached without a terminal step. A turn must still reply.
        warn!(
            session = %s.session_id,
            ceiling = MAX_STEPS_PER_TURN,
            "routing ceiling reached without a terminal step"
        );
        let fallback = lang::generic_fallback(&s.context.language).to_string();
        s.add_assistant(fallback);
        s
    }

    async fn execute(&self, step: StepName, state: &SessionState) -> StepUpdate {
        match step {
            StepName::Ask => self.step_ask(state),
            StepName::CropReco => self.step_crop_reco(state).await,
            StepName::Buy => self.step_buy(state).await,
            StepName::Vision => self.step_vision(state).await,
            StepName::Weather => self.step_weather(state).await,
            StepName::Web => self.step_web(state).await,
            StepName::Schemes => self.step_schemes(state).await,
            StepName::Market => self.step_market(state).await,
            StepName::Advice => self.step_advice(state).await,
        }
    }
}

/// Merge a sparse update into the working state. List-valued fields replace
/// wholesale; the message log is re-capped after every change.
pub(crate) fn apply_update(state: &mut SessionState, update: StepUpdate) {
    if let Some(step) = update.step {
        state.last_step = Some(step);
    }
    if let Some(context) = update.context {
        state.context = context;
    }
    if let Some(observation) = update.observation {
        state.observation = observation;
    }
    if let Some(weather) = update.weather {
        state.weather = Some(weather);
    }
    if let Some(web) = update.web {
        state.web = Some(web);
    }
    if let Some(schemes) = update.schemes {
        state.schemes = Some(schemes);
    }
    if let Some(market) = update.market {
        state.market = Some(market);
    }
    if let Some(diagnosis) = update.image_diagnosis {
        state.image_diagnosis = diagnosis;
    }
    if let Some(advisory) = update.advisory {
        state.advisory = advisory;
    }
    if let Some(messages) = update.messages {
        state.messages = messages;
    }
    state.compact_messages();
}
