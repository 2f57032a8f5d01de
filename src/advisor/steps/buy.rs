//! Buy — deterministic, model-free. Requires a known crop and location,
//! fetches shopping links, and buckets the first six URLs into seed /
//! fertilizer / crop-protection labels two at a time. The hand-built JSON
//! still goes through the coercion layer like every other advisory.

use serde_json::json;
use tracing::warn;

use crate::advisor::coerce::coerce_advisory;
use crate::advisor::lang::tr;
use crate::advisor::orchestrator::Advisor;
use crate::advisor::route::StepName;
use crate::advisor::steps::StepUpdate;
use crate::session::{Advisory, ChatMessage, SessionState};

const MAX_BUY_BULLETS: usize = 6;

impl Advisor {
    pub(crate) async fn step_buy(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::for_step(StepName::Buy);
        let ctx = &state.context;
        let lang = ctx.language.as_str();

        let crop = ctx.crop.as_deref().unwrap_or("").trim().to_lowercase();
        let loc = ctx.location_label();

        if crop.is_empty() {
            let msg = tr(
                lang,
                "Set crop first (reply: Crop: rice) then tap Buy Inputs.",
                "पहले फसल सेट करें (उत्तर: Crop: rice) फिर खरीद लिंक दबाएँ।",
                "आधी पीक सेट करा (उत्तर: Crop: rice) मग खरेदी लिंक दाबा.",
            );
            return finish(update, state, guidance_advisory(state, msg, "high"));
        }

        if loc.is_empty() {
            let msg = tr(
                lang,
                "Set location first (send city/village or share GPS), then tap Buy Inputs.",
                "पहले स्थान सेट करें (शहर/गाँव या GPS भेजें) फिर खरीद लिंक दबाएँ।",
                "आधी ठिकाण सेट करा (शहर/गाव किंवा GPS) मग खरेदी लिंक दाबा.",
            );
            return finish(update, state, guidance_advisory(state, msg, "high"));
        }

        let links = match self.enrichment.buy_inputs(&loc, &crop).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "buy-inputs search failed");
                let msg = tr(
                    lang,
                    "Buying links not available right now. Try again in a minute.",
                    "खरीद लिंक अभी उपलब्ध नहीं। 1 मिनट बाद फिर प्रयास करें।",
                    "खरेदी लिंक्स आत्ता मिळत नाहीत. 1 मिनिटाने पुन्हा प्रयत्न करा.",
                );
                return finish(update, state, guidance_advisory(state, msg, "medium"));
            }
        };

        let seed_label = tr(lang, "Seeds", "बीज", "बियाणे");
        let fert_label = tr(lang, "Fertilizer", "उर्वरक", "खते");
        let prot_label = tr(lang, "Crop protection", "फसल सुरक्षा", "पीक संरक्षण");
        let note = tr(
            lang,
            "Tip: compare prices + seller ratings.",
            "टिप: कीमत + रेटिंग तुलना करें।",
            "टिप: किंमत + रेटिंग तुलना करा.",
        );

        // First two links read as seeds, next two fertilizer, next two
        // protection.
        let labels = [seed_label, seed_label, fert_label, fert_label, prot_label, prot_label];
        let mut bullets: Vec<String> = links
            .urls
            .iter()
            .take(MAX_BUY_BULLETS)
            .zip(labels.iter())
            .map(|(url, label)| format!("{label}: {url}"))
            .collect();
        if bullets.is_empty() {
            bullets.push(note.to_string());
        }

        let crop_title = title_case(&crop);
        let headline = tr(
            lang,
            &format!("Buy inputs for {crop_title} ({loc})"),
            &format!("{crop_title} के लिए खरीद लिंक ({loc})"),
            &format!("{crop_title} साठी खरेदी लिंक्स ({loc})"),
        )
        .to_string();

        let advisory = coerce_advisory(&json!({
            "headline": headline,
            "stage": state.context.stage.as_str(),
            "actions_now": bullets,
            "watch_out_for": [tr(
                lang,
                "Avoid unknown sellers; check expiry date.",
                "अनजान विक्रेता से बचें; एक्सपायरी देखें।",
                "अनोळखी विक्रेते टाळा; एक्सपायरी तपासा.",
            )],
            "safety_notes": [],
            "rationale_brief": note,
            "confidence": "high",
            "needs_human_review": false,
        }));

        finish(update, state, advisory)
    }
}

fn guidance_advisory(state: &SessionState, msg: &str, confidence: &str) -> Advisory {
    coerce_advisory(&json!({
        "headline": msg,
        "stage": state.context.stage.as_str(),
        "actions_now": [],
        "watch_out_for": [],
        "safety_notes": [],
        "rationale_brief": "",
        "confidence": confidence,
        "needs_human_review": false,
    }))
}

fn finish(mut update: StepUpdate, state: &SessionState, advisory: Advisory) -> StepUpdate {
    let mut messages = state.messages.clone();
    messages.push(ChatMessage::assistant(advisory.headline.clone()));
    update.advisory = Some(Some(advisory));
    update.messages = Some(messages);
    update
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::advisor::staleness::FreshnessPolicy;
    use crate::advisor::testing::{StubEnrichment, StubLlm};
    use crate::session::Confidence;

    fn advisor_with(enrichment: StubEnrichment) -> Advisor {
        Advisor::new(
            Arc::new(StubLlm::default()),
            Arc::new(enrichment),
            FreshnessPolicy::default(),
        )
    }

    fn ready_state() -> SessionState {
        let mut state = SessionState::new("1");
        state.context.crop = Some("rice".into());
        state.context.location_text = Some("Pune".into());
        state
    }

    #[tokio::test]
    async fn buy_requires_crop() {
        let advisor = advisor_with(StubEnrichment::default());
        let mut state = SessionState::new("1");
        state.context.location_text = Some("Pune".into());

        let update = advisor.step_buy(&state).await;
        let advisory = update.advisory.unwrap().unwrap();
        assert!(advisory.headline.contains("Set crop first"));
        assert_eq!(advisory.confidence, Confidence::High);
        assert!(advisory.actions_now.is_empty());
    }

    #[tokio::test]
    async fn buy_requires_location() {
        let advisor = advisor_with(StubEnrichment::default());
        let mut state = SessionState::new("1");
        state.context.crop = Some("rice".into());

        let update = advisor.step_buy(&state).await;
        let advisory = update.advisory.unwrap().unwrap();
        assert!(advisory.headline.contains("Set location first"));
    }

    #[tokio::test]
    async fn buy_buckets_links_two_per_category() {
        let advisor = advisor_with(StubEnrichment::default());
        let update = advisor.step_buy(&ready_state()).await;
        let advisory = update.advisory.unwrap().unwrap();

        assert!(advisory.headline.contains("Buy inputs for Rice"));
        // Coercion caps actions at 5; the first five buckets survive.
        assert_eq!(advisory.actions_now.len(), 5);
        assert!(advisory.actions_now[0].starts_with("Seeds: "));
        assert!(advisory.actions_now[1].starts_with("Seeds: "));
        assert!(advisory.actions_now[2].starts_with("Fertilizer: "));
        assert!(advisory.actions_now[3].starts_with("Fertilizer: "));
        assert!(advisory.actions_now[4].starts_with("Crop protection: "));
    }

    #[tokio::test]
    async fn buy_soft_fails_when_provider_errors() {
        let advisor = advisor_with(StubEnrichment {
            fail_search: true,
            ..StubEnrichment::default()
        });
        let update = advisor.step_buy(&ready_state()).await;
        let advisory = update.advisory.unwrap().unwrap();
        assert!(advisory.headline.contains("not available"));
        assert_eq!(advisory.confidence, Confidence::Medium);
        // Still a terminal reply.
        assert!(update.messages.is_some());
    }
}
