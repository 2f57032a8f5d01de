//! Freshness-driven refresh steps: weather, web, schemes, market.
//!
//! All four are non-terminal and share the soft-failure rule: a provider
//! error keeps the previous cached snapshot for that category, and the next
//! turn's staleness check retries.

use tracing::warn;

use crate::advisor::orchestrator::Advisor;
use crate::advisor::route::StepName;
use crate::advisor::steps::StepUpdate;
use crate::providers::TimeRange;
use crate::session::SessionState;

impl Advisor {
    /// Refresh the weather snapshot, geocoding the free-text location first
    /// when coordinates are still unknown.
    pub(crate) async fn step_weather(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::for_step(StepName::Weather);
        let mut ctx = state.context.clone();

        if !ctx.has_coordinates()
            && let Some(loc) = ctx.location_text.clone()
        {
            match self.enrichment.geocode(&loc).await {
                Ok(geo) => {
                    if let (Some(lat), Some(lon)) = (geo.lat, geo.lon) {
                        ctx.lat = Some(lat);
                        ctx.lon = Some(lon);
                        ctx.location_text = Some(geo.resolved_name);
                        update.context = Some(ctx.clone());
                    }
                }
                Err(e) => warn!(error = %e, "geocoding failed"),
            }
        }

        let (Some(lat), Some(lon)) = (ctx.lat, ctx.lon) else {
            return update;
        };

        match self.enrichment.weather(lat, lon).await {
            Ok(snapshot) => update.weather = Some(snapshot),
            Err(e) => warn!(error = %e, "weather refresh failed"),
        }
        update
    }

    /// Refresh the general web snapshot for the current crop/symptoms.
    pub(crate) async fn step_web(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::for_step(StepName::Web);
        let ctx = &state.context;

        let loc = ctx
            .location_text
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_string();
        let query = match ctx.crop.as_deref() {
            None | Some("") => {
                format!("best farming practices {loc} seasonal crops kharif rabi soil pH")
            }
            Some(crop) => {
                let symptoms = state
                    .observation
                    .symptoms
                    .iter()
                    .take(2)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{crop} {} symptoms {symptoms} best practice {loc}", ctx.stage)
            }
        };

        match self
            .enrichment
            .web_search(query.trim(), TimeRange::Month)
            .await
        {
            Ok(snapshot) => update.web = Some(snapshot),
            Err(e) => warn!(error = %e, "web refresh failed"),
        }
        update
    }

    /// Refresh the government-schemes snapshot. Needs a location text.
    pub(crate) async fn step_schemes(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::for_step(StepName::Schemes);
        let Some(loc) = state
            .context
            .location_text
            .as_deref()
            .filter(|l| !l.trim().is_empty())
        else {
            return update;
        };

        match self
            .enrichment
            .schemes_search(loc, state.context.crop.as_deref())
            .await
        {
            Ok(snapshot) => update.schemes = Some(snapshot),
            Err(e) => warn!(error = %e, "schemes refresh failed"),
        }
        update
    }

    /// Refresh the market-prices snapshot.
    pub(crate) async fn step_market(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::for_step(StepName::Market);
        let loc = state
            .context
            .location_text
            .as_deref()
            .unwrap_or("")
            .to_string();

        match self
            .enrichment
            .market_search(&loc, state.context.crop.as_deref())
            .await
        {
            Ok(snapshot) => update.market = Some(snapshot),
            Err(e) => warn!(error = %e, "market refresh failed"),
        }
        update
    }
}

// ── Tests ───────────────────────────────────────────────────────────
