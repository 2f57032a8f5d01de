//! The turn orchestrator and its parts: routing, merging, staleness,
//! coercion, and the step executors.

pub mod coerce;
pub mod lang;
pub mod merge;
pub mod orchestrator;
pub mod route;
pub mod signals;
pub mod staleness;
pub mod steps;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub(crate) mod testing;

pub use merge::{IntakeExtraction, merge_context, merge_observation};
pub use orchestrator::{Advisor, MAX_STEPS_PER_TURN};
pub use route::{StepName, route};
pub use signals::Action;
pub use staleness::{FreshnessPolicy, is_stale};

// ── Orchestrator tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::testing::{StubEnrichment, StubLlm};
    use super::*;
    use crate::session::{SessionState, Stage};

    fn advisor(llm: StubLlm, enrichment: StubEnrichment) -> Advisor {
        Advisor::new(Arc::new(llm), Arc::new(enrichment), FreshnessPolicy::default())
    }

    fn advisory_reply(headline: &str) -> serde_json::Value {
        json!({
            "headline": headline,
            "stage": "germination",
            "actions_now": ["check drainage"],
            "watch_out_for": ["standing water"],
            "confidence": "medium",
            "needs_human_review": false,
        })
    }

    /// First contact: one message carrying name, crop+stage, land, and
    /// location. Intake extracts, the location resolves, weather refreshes,
    /// and the turn ends with a generated advisory.
    #[tokio::test]
    async fn first_contact_end_to_end() {
        let extraction = json!({
            "farmer_name": "Ramesh",
            "crop": "Rice",
            "stage": "germination",
            "land_size": 2,
            "land_unit": "acres",
            "location_text": "Pune",
        });
        let llm = StubLlm::scripted(vec![extraction, advisory_reply("Rice germination care")]);
        let enrichment = Arc::new(StubEnrichment::default());
        let advisor = Advisor::new(
            Arc::new(llm),
            Arc::clone(&enrichment) as Arc<dyn crate::providers::Enrichment>,
            FreshnessPolicy::default(),
        );

        let state = SessionState::new("chat-1");
        let out = advisor
            .run_turn(&state, "My name is Ramesh. Rice germination. 2 acres. Pune.")
            .await;

        // Incoming state untouched (copy-on-write).
        assert_eq!(state.turn_count, 0);
        assert!(state.messages.is_empty());

        assert_eq!(out.turn_count, 1);
        assert_eq!(out.context.farmer_name.as_deref(), Some("Ramesh"));
        assert_eq!(out.context.crop.as_deref(), Some("rice"));
        assert_eq!(out.context.stage, Stage::Germination);
        assert_eq!(out.context.land_size, Some(2.0));
        // Location resolved during intake.
        assert!(out.context.has_coordinates());

        // Weather fetched on the way to the advisory.
        let calls = enrichment.call_log();
        assert!(calls.contains(&"geocode".to_string()));
        assert!(calls.contains(&"weather".to_string()));
        assert!(out.weather.is_some());

        let advisory = out.advisory.clone().expect("advisory produced");
        assert_eq!(advisory.headline, "Rice germination care");
        assert_eq!(out.last_step, Some(StepName::Advice));
        assert_eq!(out.last_assistant_text(), Some("Rice germination care"));
    }

    /// Digest turn over a complete profile with every snapshot absent:
    /// exactly one visit each to weather → web → schemes → market, then
    /// advice, all within the iteration ceiling.
    #[tokio::test]
    async fn digest_visits_each_refresh_step_once() {
        let llm = StubLlm::scripted(vec![advisory_reply("Daily digest")]);
        let enrichment = Arc::new(StubEnrichment::default());
        let advisor = Advisor::new(
            Arc::new(llm),
            Arc::clone(&enrichment) as Arc<dyn crate::providers::Enrichment>,
            FreshnessPolicy::default(),
        );

        let mut state = SessionState::new("chat-1");
        state.context.farmer_name = Some("Ramesh".into());
        state.context.crop = Some("rice".into());
        state.context.stage = Stage::Vegetative;
        state.context.land_size = Some(2.0);
        state.context.location_text = Some("Pune".into());
        state.context.lat = Some(18.52);
        state.context.lon = Some(73.86);
        state.observation.symptoms.push("yellow leaves".into());

        let out = advisor.run_turn(&state, signals::ACTION_DIGEST).await;

        let calls = enrichment.call_log();
        assert_eq!(
            calls,
            vec!["weather", "web_search", "schemes_search", "market_search"]
        );
        assert!(out.weather.is_some());
        assert!(out.web.is_some());
        assert!(out.schemes.is_some());
        assert!(out.market.is_some());
        assert_eq!(out.last_step, Some(StepName::Advice));
        assert!(out.advisory.is_some());
    }

    /// Second digest right after the first finds everything fresh and goes
    /// straight to advice.
    #[tokio::test]
    async fn fresh_snapshots_are_not_refetched() {
        let llm = StubLlm::scripted(vec![advisory_reply("Daily digest")]);
        let enrichment = Arc::new(StubEnrichment::default());
        let advisor = Advisor::new(
            Arc::new(llm),
            Arc::clone(&enrichment) as Arc<dyn crate::providers::Enrichment>,
            FreshnessPolicy::default(),
        );

        let mut state = SessionState::new("chat-1");
        state.context.farmer_name = Some("Ramesh".into());
        state.context.crop = Some("rice".into());
        state.context.stage = Stage::Vegetative;
        state.context.land_size = Some(2.0);
        state.context.location_text = Some("Pune".into());
        state.context.lat = Some(18.52);
        state.context.lon = Some(73.86);

        let first = advisor.run_turn(&state, signals::ACTION_DIGEST).await;
        let calls_after_first = enrichment.call_log().len();

        let second = advisor.run_turn(&first, signals::ACTION_DIGEST).await;
        assert_eq!(enrichment.call_log().len(), calls_after_first);
        assert_eq!(second.last_step, Some(StepName::Advice));
    }

    /// A weather provider that keeps failing can never stamp a fresh
    /// snapshot; the ceiling ends the turn and the user still gets a reply.
    #[tokio::test]
    async fn persistent_provider_failure_hits_ceiling_but_replies() {
        let llm = StubLlm::scripted(vec![advisory_reply("unused")]);
        let advisor = advisor(
            llm,
            StubEnrichment {
                fail_weather: true,
                ..StubEnrichment::default()
            },
        );

        let mut state = SessionState::new("chat-1");
        state.context.farmer_name = Some("Ramesh".into());
        state.context.crop = Some("rice".into());
        state.context.stage = Stage::Vegetative;
        state.context.land_size = Some(2.0);
        state.context.location_text = Some("Pune".into());
        state.context.lat = Some(18.52);
        state.context.lon = Some(73.86);

        let out = advisor.run_turn(&state, "how are things").await;
        assert!(out.weather.is_none());
        assert!(out.last_assistant_text().is_some());
    }

    /// Stage statements bypass extraction and land directly in advice.
    #[tokio::test]
    async fn stage_statement_turn() {
        let llm = StubLlm::scripted(vec![advisory_reply("Flowering care")]);
        let enrichment = Arc::new(StubEnrichment::default());
        let advisor = Advisor::new(
            Arc::new(llm),
            Arc::clone(&enrichment) as Arc<dyn crate::providers::Enrichment>,
            FreshnessPolicy::default(),
        );

        let mut state = SessionState::new("chat-1");
        state.context.farmer_name = Some("Ramesh".into());
        state.context.crop = Some("rice".into());
        state.context.stage = Stage::Vegetative;
        state.context.land_size = Some(2.0);
        state.context.location_text = Some("Pune".into());

        let out = advisor.run_turn(&state, "My stage is flowering.").await;
        assert_eq!(out.context.stage, Stage::Flowering);
        assert_eq!(out.last_step, Some(StepName::Advice));
        // No geocode call: stage shortcut skipped extraction entirely.
        assert!(!enrichment.call_log().contains(&"geocode".to_string()));
    }

    /// Failed extraction still yields a turn with a reply (ask for the
    /// missing profile fields).
    #[tokio::test]
    async fn extraction_failure_degrades_to_ask() {
        let advisor = advisor(StubLlm::failing(), StubEnrichment::default());
        let state = SessionState::new("chat-1");

        let out = advisor.run_turn(&state, "hello there").await;
        assert_eq!(out.last_step, Some(StepName::Ask));
        assert_eq!(out.last_assistant_text(), Some("Name?"));
        assert!(out.advisory.is_none());
    }

    /// The language marker is applied by intake and skips extraction.
    #[tokio::test]
    async fn language_marker_sets_language() {
        let llm = StubLlm::default();
        let advisor = advisor(llm, StubEnrichment::default());
        let state = SessionState::new("chat-1");

        let out = advisor.run_turn(&state, "__ACTION__:SET_LANG:hi").await;
        assert_eq!(out.context.language, "hi");
        // Profile empty → ask, localized.
        assert_eq!(out.last_assistant_text(), Some("नाम?"));
    }

    /// Buy marker wins over everything, even an empty profile.
    #[tokio::test]
    async fn buy_marker_routes_to_buy() {
        let advisor = advisor(StubLlm::default(), StubEnrichment::default());
        let state = SessionState::new("chat-1");

        let out = advisor.run_turn(&state, signals::ACTION_BUY).await;
        assert_eq!(out.last_step, Some(StepName::Buy));
        let advisory = out.advisory.expect("guidance advisory");
        assert!(advisory.headline.contains("Set crop first"));
    }
}
