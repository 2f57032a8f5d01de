//! Enrichment providers — geocoding, weather, and the web-search family.
//!
//! Consumed by the step executors through the [`Enrichment`] trait so the
//! orchestrator can be driven with stubs in tests. Every operation stamps
//! its result with the current UTC fetch time.

pub mod openweather;
pub mod tavily;

pub use openweather::OpenWeatherClient;
pub use tavily::TavilyClient;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::session::{WeatherSnapshot, WebContext};

/// Result of a geocoding lookup. `resolved_name` is the provider's canonical
/// name for the place (falls back to the query).
#[derive(Debug, Clone)]
pub struct GeocodeResult {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub resolved_name: String,
}

/// Recency window for a web search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Week,
    Month,
    Year,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

/// The external data-gathering capabilities the orchestrator consumes.
#[async_trait]
pub trait Enrichment: Send + Sync {
    async fn geocode(&self, location_text: &str) -> Result<GeocodeResult, ProviderError>;

    async fn weather(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot, ProviderError>;

    async fn web_search(
        &self,
        query: &str,
        time_range: TimeRange,
    ) -> Result<WebContext, ProviderError>;

    /// Government-scheme search — a scoped web search.
    async fn schemes_search(
        &self,
        location: &str,
        crop: Option<&str>,
    ) -> Result<WebContext, ProviderError>;

    /// Market-price search — a scoped web search.
    async fn market_search(
        &self,
        location: &str,
        crop: Option<&str>,
    ) -> Result<WebContext, ProviderError>;

    /// Shopping-link search: three scoped searches merged and deduplicated.
    async fn buy_inputs(&self, location: &str, crop: &str) -> Result<WebContext, ProviderError>;
}

/// Production bundle: OpenWeather for geo/weather, Tavily for search.
pub struct LiveEnrichment {
    weather: OpenWeatherClient,
    search: TavilyClient,
}

impl LiveEnrichment {
    pub fn new(weather: OpenWeatherClient, search: TavilyClient) -> Arc<Self> {
        Arc::new(Self { weather, search })
    }
}

#[async_trait]
impl Enrichment for LiveEnrichment {
    async fn geocode(&self, location_text: &str) -> Result<GeocodeResult, ProviderError> {
        self.weather.geocode(location_text).await
    }

    async fn weather(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot, ProviderError> {
        self.weather.weather(lat, lon).await
    }

    async fn web_search(
        &self,
        query: &str,
        time_range: TimeRange,
    ) -> Result<WebContext, ProviderError> {
        self.search.search(query, time_range).await
    }

    async fn schemes_search(
        &self,
        location: &str,
        crop: Option<&str>,
    ) -> Result<WebContext, ProviderError> {
        self.search.schemes(location, crop).await
    }

    async fn market_search(
        &self,
        location: &str,
        crop: Option<&str>,
    ) -> Result<WebContext, ProviderError> {
        self.search.market_prices(location, crop).await
    }

    async fn buy_inputs(&self, location: &str, crop: &str) -> Result<WebContext, ProviderError> {
        self.search.buy_inputs(location, crop).await
    }
}
