//! Property tests for the merge engine and staleness evaluator.

use chrono::{Duration, SecondsFormat, TimeZone, Utc};
use proptest::prelude::*;

use crate::advisor::merge::{IntakeExtraction, merge_context, merge_observation};
use crate::advisor::staleness::is_stale;
use crate::session::{FarmerContext, Observation, Stage, Urgency};

fn arb_opt_string() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-zA-Z ]{1,12}")
}

fn arb_urgency() -> impl Strategy<Value = Urgency> {
    prop_oneof![
        Just(Urgency::Low),
        Just(Urgency::Medium),
        Just(Urgency::High),
    ]
}

fn arb_context() -> impl Strategy<Value = FarmerContext> {
    (
        arb_opt_string(),
        arb_opt_string(),
        proptest::option::of(0.1f64..100.0),
        arb_opt_string(),
    )
        .prop_map(|(farmer_name, crop, land_size, location_text)| FarmerContext {
            farmer_name,
            crop: crop.map(|c| c.to_lowercase()),
            stage: Stage::Vegetative,
            land_size,
            location_text,
            language: "en".into(),
            ..FarmerContext::default()
        })
}

fn arb_observation() -> impl Strategy<Value = Observation> {
    (
        proptest::collection::vec("[a-z ]{1,10}", 0..4),
        arb_urgency(),
    )
        .prop_map(|(symptoms, urgency)| Observation {
            symptoms,
            pests_seen: vec![],
            urgency,
        })
}

proptest! {
    /// Fields absent from the update never clear accumulated values.
    #[test]
    fn merge_is_non_destructive(old in arb_context(), name in arb_opt_string()) {
        let upd = IntakeExtraction {
            farmer_name: name,
            ..IntakeExtraction::default()
        };
        let merged = merge_context(&old, &upd);

        if upd.farmer_name.is_none() {
            prop_assert_eq!(&merged.farmer_name, &old.farmer_name);
        }
        prop_assert_eq!(&merged.crop, &old.crop);
        prop_assert_eq!(merged.stage, old.stage);
        prop_assert_eq!(merged.land_size, old.land_size);
        prop_assert_eq!(&merged.location_text, &old.location_text);
    }

    /// Urgency merges to max(old, update) under the fixed ordinal order.
    #[test]
    fn urgency_merges_to_max(old in arb_observation(), upd_urgency in arb_urgency()) {
        let upd = IntakeExtraction {
            urgency: Some(upd_urgency.as_str().to_string()),
            ..IntakeExtraction::default()
        };
        let merged = merge_observation(&old, &upd);
        prop_assert_eq!(merged.urgency, old.urgency.max(upd_urgency));
        prop_assert!(merged.urgency >= old.urgency);
    }

    /// Observation merging preserves every prior symptom, in order, and
    /// never introduces case-insensitive duplicates.
    #[test]
    fn symptom_merge_preserves_and_dedups(
        old in arb_observation(),
        extra in proptest::collection::vec("[a-zA-Z ]{1,10}", 0..4),
    ) {
        let upd = IntakeExtraction {
            symptoms: extra,
            ..IntakeExtraction::default()
        };
        let merged = merge_observation(&old, &upd);

        // Prefix-preserving: old entries first, same order.
        prop_assert!(merged.symptoms.len() >= old.symptoms.len());
        for (i, s) in old.symptoms.iter().enumerate() {
            prop_assert_eq!(&merged.symptoms[i], s);
        }

        let lowered: Vec<String> = merged.symptoms.iter().map(|s| s.to_lowercase()).collect();
        let mut unique = lowered.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(lowered.len(), unique.len());
    }

    /// An invalid stage never changes the stored stage.
    #[test]
    fn bogus_stage_is_rejected(old in arb_context(), word in "[a-z]{1,12}") {
        let upd = IntakeExtraction {
            stage: Some(word.clone()),
            ..IntakeExtraction::default()
        };
        let merged = merge_context(&old, &upd);
        match Stage::parse(&word) {
            Some(stage) => prop_assert_eq!(merged.stage, stage),
            None => prop_assert_eq!(merged.stage, old.stage),
        }
    }

    /// Staleness is strict-greater on age: fresh within the threshold,
    /// stale past it, regardless of the chosen threshold.
    #[test]
    fn staleness_strict_comparison(age_secs in 0i64..1_000_000, max_secs in 1i64..1_000_000) {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let fetched = (now - Duration::seconds(age_secs))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let stale = is_stale(Some(&fetched), now, Duration::seconds(max_secs));
        prop_assert_eq!(stale, age_secs > max_secs);
    }
}
