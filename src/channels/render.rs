//! Reply rendering — session state to Telegram HTML.
//!
//! The turn's deliverable is the advisory when one was produced, the last
//! assistant message for pure question turns, and a generic nudge when
//! neither exists. Schemes/market button turns render their snapshot
//! directly instead of an advisory.

use crate::advisor::Action;
use crate::advisor::lang::tr;
use crate::session::{SessionState, WebContext};

const MAX_RENDER_SNIPPETS: usize = 3;
const MAX_RENDER_LINKS: usize = 3;
const MAX_RENDER_ACTIONS: usize = 6;
const MAX_RENDER_WATCH: usize = 3;

/// Render the reply for a finished turn.
pub fn format_reply(state: &SessionState, digest: bool) -> String {
    let lang = state.context.language.as_str();
    let last_user = state.last_user_text();

    match Action::parse(&last_user) {
        Some(Action::Schemes) => return render_schemes_only(state),
        Some(Action::Market) => return render_market_only(state),
        _ => {}
    }

    let Some(adv) = &state.advisory else {
        return state
            .last_assistant_text()
            .map(str::to_string)
            .unwrap_or_else(|| generic_error(lang).to_string());
    };

    let crop = title_case(state.context.crop.as_deref().unwrap_or("Crop"));
    let stage = title_case(&adv.stage.as_str().replace('_', " "));

    let mut parts: Vec<String> = Vec::new();
    if digest {
        parts.push(format!(
            "<b>{}</b>",
            tr(lang, "Daily update", "दैनिक अपडेट", "दैनिक अपडेट")
        ));
    }

    parts.push(format!("<b>{}</b>", adv.headline));
    parts.push(format!("<i>{crop} • {stage}</i>"));

    if let Some(weather) = &state.weather
        && !weather.summary.is_empty()
    {
        parts.push(format!("<i>Weather:</i> {}", weather.summary));
    }

    if let Some(diag) = &state.image_diagnosis {
        parts.push(format!("\n<b>{}</b>", tr(lang, "Photo", "फोटो", "फोटो")));
        parts.push(format!("• {}", diag.issue));
    }

    if !adv.actions_now.is_empty() {
        parts.push(format!(
            "\n<b>{}</b>",
            tr(lang, "Do now", "अभी करें", "आत्ता करा")
        ));
        for action in adv.actions_now.iter().take(MAX_RENDER_ACTIONS) {
            parts.push(format!("• {action}"));
        }
    }

    if !adv.watch_out_for.is_empty() {
        parts.push(format!(
            "\n<b>{}</b>",
            tr(lang, "Watch", "ध्यान रखें", "पहा")
        ));
        for watch in adv.watch_out_for.iter().take(MAX_RENDER_WATCH) {
            parts.push(format!("• {watch}"));
        }
    }

    let mut footer = format!(
        "\n<i>{}:</i> {}",
        tr(lang, "Conf", "विश्वास", "विश्वास"),
        adv.confidence.as_str().to_uppercase()
    );
    let review = adv.needs_human_review
        || state
            .image_diagnosis
            .as_ref()
            .is_some_and(|d| d.needs_human_review);
    if review {
        footer.push_str(" • <b>Expert review</b>");
    }
    parts.push(footer);

    parts.join("\n").trim().to_string()
}

fn render_snapshot_only(
    state: &SessionState,
    snapshot: Option<&WebContext>,
    title: &str,
    failure: &str,
) -> String {
    let lang = state.context.language.as_str();
    let crop = title_case(state.context.crop.as_deref().unwrap_or("crop"));
    let loc = {
        let label = state.context.location_label();
        if label.is_empty() { "—".to_string() } else { label }
    };
    let header = format!("<b>{title}</b>\n<i>{crop} • {loc}</i>");

    let Some(snapshot) = snapshot.filter(|s| !s.snippets.is_empty()) else {
        return format!("{header}\n\n{failure}");
    };

    let mut lines = vec![header, String::new()];
    for snippet in snapshot.snippets.iter().take(MAX_RENDER_SNIPPETS) {
        lines.push(format!("• {snippet}"));
    }
    if !snapshot.urls.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "<i>{}:</i>",
            tr(lang, "Links", "लिंक", "लिंक्स")
        ));
        for url in snapshot.urls.iter().take(MAX_RENDER_LINKS) {
            lines.push(format!("• {url}"));
        }
    }
    lines.join("\n").trim().to_string()
}

/// Render only the government-schemes snapshot (schemes button turns).
pub fn render_schemes_only(state: &SessionState) -> String {
    let lang = state.context.language.as_str();
    render_snapshot_only(
        state,
        state.schemes.as_ref(),
        tr(lang, "Govt Schemes", "सरकारी योजनाएँ", "सरकारी योजना"),
        tr(
            lang,
            "Schemes not available now. Set location + crop then try again.",
            "अभी योजना नहीं मिल रही। पहले स्थान + फसल सेट करें।",
            "आत्ता योजना मिळत नाहीत. आधी ठिकाण + पीक सेट करा.",
        ),
    )
}

/// Render only the market snapshot (market button turns).
pub fn render_market_only(state: &SessionState) -> String {
    let lang = state.context.language.as_str();
    let mut out = render_snapshot_only(
        state,
        state.market.as_ref(),
        tr(lang, "Market Prices", "बाजार भाव", "बाजार भाव"),
        tr(
            lang,
            "Market snapshot not available now. Try again in a moment.",
            "बाजार जानकारी अभी नहीं मिल रही। थोड़ी देर बाद कोशिश करें।",
            "बाजार माहिती आत्ता मिळत नाही. थोड्या वेळाने प्रयत्न करा.",
        ),
    );
    if state.market.as_ref().is_some_and(|m| !m.snippets.is_empty()) {
        out.push_str(&format!(
            "\n\n<i>{}</i>",
            tr(
                lang,
                "Note: Web snapshot—confirm at your local mandi.",
                "नोट: वेब स्नैपशॉट—स्थानीय मंडी में पुष्टि करें।",
                "नोट: वेब स्नॅपशॉट—स्थानिक मंडीत पडताळा.",
            )
        ));
    }
    out
}

pub fn generic_error(lang: &str) -> &'static str {
    tr(
        lang,
        "Error. Send: name + crop + stage + land + location.",
        "त्रुटि। भेजें: नाम + फसल + चरण + जमीन + स्थान।",
        "त्रुटी. पाठवा: नाव + पीक + अवस्था + जमीन + ठिकाण.",
    )
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
