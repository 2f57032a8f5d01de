//! Context merge engine.
//!
//! Folds a per-turn extraction record into the durable farmer context and
//! observation. The central invariant is non-destructive merging: a field
//! that is absent or empty in the update never clears the accumulated value.
//! Urgency only ever rises; an invalid stage keeps the prior one.

use serde_json::Value;

use crate::session::{FarmerContext, Observation, Stage, Urgency};

/// Transient per-turn record produced by the structured-extraction client.
/// Never persisted; exists only to feed the merge below.
#[derive(Debug, Clone, Default)]
pub struct IntakeExtraction {
    pub farmer_name: Option<String>,
    pub land_size: Option<f64>,
    pub land_unit: Option<String>,
    pub crop: Option<String>,
    pub stage: Option<String>,
    pub location_text: Option<String>,
    pub sowing_date: Option<String>,
    pub irrigation: Option<String>,
    pub soil_type: Option<String>,
    pub notes: Option<String>,
    pub symptoms: Vec<String>,
    pub pests_seen: Vec<String>,
    pub urgency: Option<String>,
}

fn opt_string(v: Option<&Value>) -> Option<String> {
    let s = v?.as_str()?.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

fn opt_number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        // Models routinely emit "2" or "2 acres"; take a leading number.
        Value::String(s) => {
            let head: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            head.parse().ok()
        }
        _ => None,
    }
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s.trim().to_string()),
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

impl IntakeExtraction {
    /// Build an extraction from untrusted model JSON. Wrong-typed or
    /// missing fields become absent, never an error.
    pub fn from_value(data: &Value) -> Self {
        Self {
            farmer_name: opt_string(data.get("farmer_name")),
            land_size: opt_number(data.get("land_size")),
            land_unit: opt_string(data.get("land_unit")),
            crop: opt_string(data.get("crop")),
            stage: opt_string(data.get("stage")),
            location_text: opt_string(data.get("location_text")),
            sowing_date: opt_string(data.get("sowing_date")),
            irrigation: opt_string(data.get("irrigation")),
            soil_type: opt_string(data.get("soil_type")),
            notes: opt_string(data.get("notes")),
            symptoms: string_list(data.get("symptoms")),
            pests_seen: string_list(data.get("pests_seen")),
            urgency: opt_string(data.get("urgency")),
        }
    }
}

/// Merge an extraction into the farmer context.
///
/// Scalar strings overwrite when present and non-empty after trimming;
/// `crop` is lower-cased; `stage` overwrites only when it parses as a member
/// of the stage enumeration; `land_size` overwrites on any numeric value.
pub fn merge_context(old: &FarmerContext, upd: &IntakeExtraction) -> FarmerContext {
    let mut ctx = old.clone();

    if let Some(name) = &upd.farmer_name {
        ctx.farmer_name = Some(name.trim().to_string());
    }

    if let Some(size) = upd.land_size {
        ctx.land_size = Some(size);
    }

    if let Some(unit) = &upd.land_unit {
        ctx.land_unit = Some(unit.trim().to_string());
    }

    if let Some(crop) = &upd.crop {
        ctx.crop = Some(crop.trim().to_lowercase());
    }

    if let Some(stage) = upd.stage.as_deref().and_then(Stage::parse) {
        ctx.stage = stage;
    }

    if let Some(loc) = &upd.location_text {
        ctx.location_text = Some(loc.trim().to_string());
    }

    if let Some(date) = &upd.sowing_date {
        ctx.sowing_date = Some(date.trim().to_string());
    }

    if let Some(irrigation) = &upd.irrigation {
        ctx.irrigation = Some(irrigation.trim().to_string());
    }

    if let Some(soil) = &upd.soil_type {
        ctx.soil_type = Some(soil.trim().to_string());
    }

    if let Some(notes) = &upd.notes {
        ctx.notes = Some(notes.trim().to_string());
    }

    ctx
}

/// Merge an extraction into the observation.
///
/// Symptom/pest lists append with case-insensitive dedup, first-appearance
/// order preserved. Urgency overwrites only with a strictly higher level.
pub fn merge_observation(old: &Observation, upd: &IntakeExtraction) -> Observation {
    let mut obs = old.clone();

    append_unique(&mut obs.symptoms, &upd.symptoms);
    append_unique(&mut obs.pests_seen, &upd.pests_seen);

    if let Some(u) = upd.urgency.as_deref().and_then(Urgency::parse)
        && u > obs.urgency
    {
        obs.urgency = u;
    }

    obs
}

fn append_unique(into: &mut Vec<String>, items: &[String]) {
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if !into.iter().any(|x| x.to_lowercase() == lower) {
            into.push(trimmed.to_string());
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn full_context() -> FarmerContext {
        FarmerContext {
            farmer_name: Some("Ramesh".into()),
            crop: Some("rice".into()),
            stage: Stage::Germination,
            land_size: Some(2.0),
            land_unit: Some("acres".into()),
            location_text: Some("Pune".into()),
            lat: Some(18.52),
            lon: Some(73.86),
            sowing_date: Some("2026-06-10".into()),
            irrigation: Some("drip".into()),
            soil_type: Some("black".into()),
            notes: Some("first season".into()),
            language: "en".into(),
        }
    }

    #[test]
    fn empty_update_preserves_everything() {
        let old = full_context();
        let merged = merge_context(&old, &IntakeExtraction::default());
        assert_eq!(merged.farmer_name, old.farmer_name);
        assert_eq!(merged.crop, old.crop);
        assert_eq!(merged.stage, old.stage);
        assert_eq!(merged.land_size, old.land_size);
        assert_eq!(merged.location_text, old.location_text);
        assert_eq!(merged.notes, old.notes);
    }

    #[test]
    fn scalar_fields_overwrite_when_present() {
        let old = full_context();
        let upd = IntakeExtraction {
            farmer_name: Some("  Suresh  ".into()),
            soil_type: Some("loamy".into()),
            ..IntakeExtraction::default()
        };
        let merged = merge_context(&old, &upd);
        assert_eq!(merged.farmer_name.as_deref(), Some("Suresh"));
        assert_eq!(merged.soil_type.as_deref(), Some("loamy"));
        // Untouched fields survive.
        assert_eq!(merged.crop.as_deref(), Some("rice"));
    }

    #[test]
    fn crop_is_lowercased() {
        let upd = IntakeExtraction {
            crop: Some("  Wheat ".into()),
            ..IntakeExtraction::default()
        };
        let merged = merge_context(&FarmerContext::default(), &upd);
        assert_eq!(merged.crop.as_deref(), Some("wheat"));
    }

    #[test]
    fn invalid_stage_keeps_prior_value() {
        let old = full_context();
        let upd = IntakeExtraction {
            stage: Some("bogus".into()),
            ..IntakeExtraction::default()
        };
        assert_eq!(merge_context(&old, &upd).stage, Stage::Germination);

        let upd = IntakeExtraction {
            stage: Some("flowering".into()),
            ..IntakeExtraction::default()
        };
        assert_eq!(merge_context(&old, &upd).stage, Stage::Flowering);
    }

    #[test]
    fn land_size_accepts_legitimate_replacement() {
        let old = full_context();
        let upd = IntakeExtraction {
            land_size: Some(3.5),
            ..IntakeExtraction::default()
        };
        assert_eq!(merge_context(&old, &upd).land_size, Some(3.5));
    }

    #[test]
    fn symptoms_append_with_case_insensitive_dedup() {
        let old = Observation {
            symptoms: vec!["Yellow leaves".into()],
            ..Observation::default()
        };
        let upd = IntakeExtraction {
            symptoms: vec![
                "yellow LEAVES".into(),
                "leaf spots".into(),
                "  ".into(),
                "Leaf Spots".into(),
            ],
            ..IntakeExtraction::default()
        };
        let merged = merge_observation(&old, &upd);
        assert_eq!(merged.symptoms, vec!["Yellow leaves", "leaf spots"]);
    }

    #[test]
    fn urgency_only_rises() {
        let old = Observation {
            urgency: Urgency::Medium,
            ..Observation::default()
        };

        let lower = IntakeExtraction {
            urgency: Some("low".into()),
            ..IntakeExtraction::default()
        };
        assert_eq!(merge_observation(&old, &lower).urgency, Urgency::Medium);

        let same = IntakeExtraction {
            urgency: Some("medium".into()),
            ..IntakeExtraction::default()
        };
        assert_eq!(merge_observation(&old, &same).urgency, Urgency::Medium);

        let higher = IntakeExtraction {
            urgency: Some("high".into()),
            ..IntakeExtraction::default()
        };
        assert_eq!(merge_observation(&old, &higher).urgency, Urgency::High);

        let garbage = IntakeExtraction {
            urgency: Some("panic!!".into()),
            ..IntakeExtraction::default()
        };
        assert_eq!(merge_observation(&old, &garbage).urgency, Urgency::Medium);
    }

    #[test]
    fn from_value_tolerates_loose_types() {
        let upd = IntakeExtraction::from_value(&json!({
            "farmer_name": "Ramesh",
            "land_size": "2 acres",
            "crop": "Rice",
            "stage": "germination",
            "symptoms": "yellow leaves",
            "urgency": "high",
            "notes": 42,
        }));
        assert_eq!(upd.farmer_name.as_deref(), Some("Ramesh"));
        assert_eq!(upd.land_size, Some(2.0));
        assert_eq!(upd.crop.as_deref(), Some("Rice"));
        assert_eq!(upd.symptoms, vec!["yellow leaves"]);
        assert_eq!(upd.urgency.as_deref(), Some("high"));
        // Wrong-typed scalar becomes absent, not an error.
        assert_eq!(upd.notes, None);
    }

    #[test]
    fn from_value_handles_numeric_land_size() {
        let upd = IntakeExtraction::from_value(&json!({"land_size": 2.5}));
        assert_eq!(upd.land_size, Some(2.5));
    }

    #[test]
    fn empty_strings_do_not_clear_fields() {
        let old = full_context();
        let upd = IntakeExtraction::from_value(&json!({
            "farmer_name": "   ",
            "crop": "",
            "location_text": "",
        }));
        let merged = merge_context(&old, &upd);
        assert_eq!(merged.farmer_name.as_deref(), Some("Ramesh"));
        assert_eq!(merged.crop.as_deref(), Some("rice"));
        assert_eq!(merged.location_text.as_deref(), Some("Pune"));
    }
}
