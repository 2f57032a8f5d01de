//! Tri-lingual helpers for the deterministic user-facing messages the
//! orchestrator emits itself (questions, guidance, fallbacks).
//!
//! The preferred language lives on the farmer context (`en`/`hi`/`mr`,
//! default English). Generated advisories are localized by the model via
//! the prompt instead.

/// Pick the variant for a language code; unknown codes fall back to English.
pub fn tr<'a>(lang: &str, en: &'a str, hi: &'a str, mr: &'a str) -> &'a str {
    match lang {
        "hi" => hi,
        "mr" => mr,
        _ => en,
    }
}

/// Human-readable language name for prompt construction.
pub fn language_name(lang: &str) -> &'static str {
    match lang {
        "hi" => "Hindi",
        "mr" => "Marathi",
        _ => "English",
    }
}

/// The fixed fallback when generation fails — a turn must always reply.
pub fn generic_fallback(lang: &str) -> &'static str {
    tr(
        lang,
        "Send crop + stage + location (or upload a clear photo).",
        "फसल + चरण + स्थान भेजें (या साफ फोटो अपलोड करें)।",
        "पीक + अवस्था + ठिकाण पाठवा (किंवा स्पष्ट फोटो अपलोड करा).",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_falls_back_to_english() {
        assert_eq!(tr("xx", "a", "b", "c"), "a");
        assert_eq!(tr("", "a", "b", "c"), "a");
        assert_eq!(tr("hi", "a", "b", "c"), "b");
        assert_eq!(tr("mr", "a", "b", "c"), "c");
        assert_eq!(language_name("hi"), "Hindi");
        assert_eq!(language_name("de"), "English");
    }
}
