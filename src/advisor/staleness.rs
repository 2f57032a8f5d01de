//! Staleness evaluation for enrichment snapshots.
//!
//! A snapshot is stale when it is absent, its fetch timestamp fails to
//! parse, or its age strictly exceeds the category threshold. Age exactly
//! equal to the threshold is not stale.

use chrono::{DateTime, Duration, Utc};

use crate::session::{WeatherSnapshot, WebContext};

/// Per-category freshness thresholds.
///
/// The defaults balance provider cost against data relevance; deployments
/// can override them through `Settings`.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    pub weather_max_age: Duration,
    pub web_max_age: Duration,
    pub schemes_max_age: Duration,
    pub market_max_age: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            weather_max_age: Duration::hours(6),
            web_max_age: Duration::hours(24),
            schemes_max_age: Duration::days(7),
            market_max_age: Duration::hours(12),
        }
    }
}

/// Core check: stale iff the timestamp is absent, unparsable, or strictly
/// older than `max_age`.
pub fn is_stale(fetched_at_utc: Option<&str>, now: DateTime<Utc>, max_age: Duration) -> bool {
    let Some(raw) = fetched_at_utc else {
        return true;
    };
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(t) => now.signed_duration_since(t.with_timezone(&Utc)) > max_age,
        Err(_) => true,
    }
}

impl FreshnessPolicy {
    pub fn weather_stale(&self, snapshot: Option<&WeatherSnapshot>, now: DateTime<Utc>) -> bool {
        is_stale(
            snapshot.map(|s| s.fetched_at_utc.as_str()),
            now,
            self.weather_max_age,
        )
    }

    pub fn web_stale(&self, snapshot: Option<&WebContext>, now: DateTime<Utc>) -> bool {
        is_stale(
            snapshot.map(|s| s.fetched_at_utc.as_str()),
            now,
            self.web_max_age,
        )
    }

    pub fn schemes_stale(&self, snapshot: Option<&WebContext>, now: DateTime<Utc>) -> bool {
        is_stale(
            snapshot.map(|s| s.fetched_at_utc.as_str()),
            now,
            self.schemes_max_age,
        )
    }

    pub fn market_stale(&self, snapshot: Option<&WebContext>, now: DateTime<Utc>) -> bool {
        is_stale(
            snapshot.map(|s| s.fetched_at_utc.as_str()),
            now,
            self.market_max_age,
        )
    }
}

// ── Tests ───────────────────────────────────────────────────────────
