//! Scripted stub providers for orchestrator and step tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{LlmError, ProviderError};
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::providers::{Enrichment, GeocodeResult, TimeRange};
use crate::session::{WeatherSnapshot, WebContext, utc_now_iso};

/// LLM stub that pops canned JSON replies in order. When the script runs
/// out it keeps returning the last reply; with no script it errors.
#[derive(Default)]
pub struct StubLlm {
    replies: Mutex<Vec<Value>>,
    /// When set, every call fails.
    pub fail: bool,
    pub calls: Mutex<Vec<String>>,
}

impl StubLlm {
    pub fn scripted(replies: Vec<Value>) -> Self {
        Self {
            replies: Mutex::new(replies),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.lock().unwrap().push(request.user.clone());
        if self.fail {
            return Err(LlmError::RequestFailed {
                provider: "stub".into(),
                reason: "scripted failure".into(),
            });
        }
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.remove(0)
        } else if let Some(last) = replies.first() {
            last.clone()
        } else {
            return Err(LlmError::RequestFailed {
                provider: "stub".into(),
                reason: "no scripted reply".into(),
            });
        };
        Ok(CompletionResponse {
            content: reply.to_string(),
        })
    }
}

/// Enrichment stub that records every operation name in order and serves
/// canned data. Individual operations can be switched to fail.
#[derive(Default)]
pub struct StubEnrichment {
    pub calls: Mutex<Vec<String>>,
    pub fail_weather: bool,
    pub fail_search: bool,
    pub fail_geocode: bool,
}

impl StubEnrichment {
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str) {
        self.calls.lock().unwrap().push(op.to_string());
    }

    fn web(&self, query: &str) -> WebContext {
        WebContext {
            fetched_at_utc: utc_now_iso(),
            query: query.to_string(),
            snippets: vec![format!("snippet for {query}")],
            urls: vec![
                "https://example.com/1".into(),
                "https://example.com/2".into(),
                "https://example.com/3".into(),
                "https://example.com/4".into(),
                "https://example.com/5".into(),
                "https://example.com/6".into(),
            ],
        }
    }
}

#[async_trait]
impl Enrichment for StubEnrichment {
    async fn geocode(&self, location_text: &str) -> Result<GeocodeResult, ProviderError> {
        self.record("geocode");
        if self.fail_geocode {
            return Err(ProviderError::RequestFailed {
                name: "stub".into(),
                reason: "scripted failure".into(),
            });
        }
        Ok(GeocodeResult {
            lat: Some(18.52),
            lon: Some(73.86),
            resolved_name: format!("{}, MH, IN", location_text.trim()),
        })
    }

    async fn weather(&self, _lat: f64, _lon: f64) -> Result<WeatherSnapshot, ProviderError> {
        self.record("weather");
        if self.fail_weather {
            return Err(ProviderError::RequestFailed {
                name: "stub".into(),
                reason: "scripted failure".into(),
            });
        }
        Ok(WeatherSnapshot {
            fetched_at_utc: utc_now_iso(),
            summary: "Clear • 30°".into(),
            alerts: vec![],
            daily: vec!["clear sky".into()],
        })
    }

    async fn web_search(
        &self,
        query: &str,
        _time_range: TimeRange,
    ) -> Result<WebContext, ProviderError> {
        self.record("web_search");
        if self.fail_search {
            return Err(ProviderError::RequestFailed {
                name: "stub".into(),
                reason: "scripted failure".into(),
            });
        }
        Ok(self.web(query))
    }

    async fn schemes_search(
        &self,
        location: &str,
        _crop: Option<&str>,
    ) -> Result<WebContext, ProviderError> {
        self.record("schemes_search");
        if self.fail_search {
            return Err(ProviderError::RequestFailed {
                name: "stub".into(),
                reason: "scripted failure".into(),
            });
        }
        Ok(self.web(&format!("schemes {location}")))
    }

    async fn market_search(
        &self,
        location: &str,
        _crop: Option<&str>,
    ) -> Result<WebContext, ProviderError> {
        self.record("market_search");
        if self.fail_search {
            return Err(ProviderError::RequestFailed {
                name: "stub".into(),
                reason: "scripted failure".into(),
            });
        }
        Ok(self.web(&format!("market {location}")))
    }

    async fn buy_inputs(&self, location: &str, crop: &str) -> Result<WebContext, ProviderError> {
        self.record("buy_inputs");
        if self.fail_search {
            return Err(ProviderError::RequestFailed {
                name: "stub".into(),
                reason: "scripted failure".into(),
            });
        }
        Ok(self.web(&format!("buy inputs {crop} {location}")))
    }
}
