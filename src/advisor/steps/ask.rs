//! Ask — terminal step that requests the first missing profile field.

use crate::advisor::lang::tr;
use crate::advisor::orchestrator::Advisor;
use crate::advisor::route::StepName;
use crate::advisor::steps::StepUpdate;
use crate::session::{SessionState, Stage};

impl Advisor {
    pub(crate) fn step_ask(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::for_step(StepName::Ask);
        let c = &state.context;
        let lang = c.language.as_str();

        let msg = if c.farmer_name.is_none() {
            tr(lang, "Name?", "नाम?", "नाव?")
        } else if !c.has_location() {
            tr(
                lang,
                "Location (city/village or lat,lon)?",
                "स्थान (गांव/शहर या lat,lon)?",
                "ठिकाण (गाव/शहर किंवा lat,lon)?",
            )
        } else if c.crop.is_none() {
            tr(
                lang,
                "Pick one crop from the suggestions (reply: Crop: ___).",
                "सुझाव से एक फसल चुनें (उत्तर: Crop: ___).",
                "सुचनांमधून एक पीक निवडा (उत्तर: Crop: ___).",
            )
        } else if c.stage == Stage::Unknown {
            tr(
                lang,
                "Stage? (sowing/germination/vegetative/flowering/fruiting/maturity/harvest)",
                "चरण? (बुवाई/अंकुरण/वृद्धि/फूल/फल/पकना/कटाई)",
                "अवस्था? (पेरणी/अंकुरण/वाढ/फुलोरा/फळ/पक्वता/कापणी)",
            )
        } else if c.land_size.is_none() {
            tr(
                lang,
                "Land size? (acres/hectare)",
                "जमीन? (एकड़/हेक्टेयर)",
                "जमीन? (एकर/हेक्टर)",
            )
        } else {
            tr(
                lang,
                "Send symptoms or photo.",
                "लक्षण या फोटो भेजें।",
                "लक्षणं किंवा फोटो पाठवा.",
            )
        };

        let mut messages = state.messages.clone();
        messages.push(crate::session::ChatMessage::assistant(msg));
        update.messages = Some(messages);
        // A question turn has no advisory deliverable.
        update.advisory = Some(None);
        update
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::advisor::staleness::FreshnessPolicy;
    use crate::advisor::testing::{StubEnrichment, StubLlm};
    use crate::session::ChatRole;

    fn advisor() -> Advisor {
        Advisor::new(
            Arc::new(StubLlm::default()),
            Arc::new(StubEnrichment::default()),
            FreshnessPolicy::default(),
        )
    }

    #[test]
    fn asks_for_first_missing_field_in_order() {
        let advisor = advisor();
        let mut state = SessionState::new("1");

        let update = advisor.step_ask(&state);
        let messages = update.messages.unwrap();
        assert_eq!(messages.last().unwrap().content, "Name?");

        state.context.farmer_name = Some("Ramesh".into());
        let update = advisor.step_ask(&state);
        let messages = update.messages.unwrap();
        let msg = &messages.last().unwrap().content;
        assert!(msg.starts_with("Location"));

        state.context.location_text = Some("Pune".into());
        let update = advisor.step_ask(&state);
        let messages = update.messages.unwrap();
        let msg = &messages.last().unwrap().content;
        assert!(msg.contains("Crop:"));

        state.context.crop = Some("rice".into());
        let update = advisor.step_ask(&state);
        let messages = update.messages.unwrap();
        let msg = &messages.last().unwrap().content;
        assert!(msg.starts_with("Stage?"));

        state.context.stage = Stage::Sowing;
        let update = advisor.step_ask(&state);
        let messages = update.messages.unwrap();
        let msg = &messages.last().unwrap().content;
        assert!(msg.starts_with("Land size?"));

        state.context.land_size = Some(2.0);
        let update = advisor.step_ask(&state);
        let messages = update.messages.unwrap();
        let msg = &messages.last().unwrap().content;
        assert_eq!(msg, "Send symptoms or photo.");
    }

    #[test]
    fn ask_clears_advisory_and_appends_assistant_message() {
        let advisor = advisor();
        let mut state = SessionState::new("1");
        state.add_user("hello");

        let update = advisor.step_ask(&state);
        assert_eq!(update.step, Some(StepName::Ask));
        assert_eq!(update.advisory, Some(None));
        let messages = update.messages.unwrap();
        assert_eq!(messages.last().unwrap().role, ChatRole::Assistant);
    }

    #[test]
    fn ask_localizes_by_context_language() {
        let advisor = advisor();
        let mut state = SessionState::new("1");
        state.context.language = "hi".into();
        let update = advisor.step_ask(&state);
        assert_eq!(update.messages.unwrap().last().unwrap().content, "नाम?");
    }
}
