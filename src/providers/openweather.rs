//! OpenWeather client — geocoding and weather snapshots.
//!
//! Weather tries One Call 3.0 first, falls back to One Call 2.5 (accounts
//! without the 3.0 subscription), then to the plain current-weather
//! endpoint. Whatever responds becomes the snapshot.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::warn;

use crate::error::ProviderError;
use crate::providers::GeocodeResult;
use crate::session::{WeatherSnapshot, utc_now_iso};

const GEO_URL: &str = "https://api.openweathermap.org/geo/1.0/direct";
const ONECALL_30_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";
const ONECALL_25_URL: &str = "https://api.openweathermap.org/data/2.5/onecall";
const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_ALERTS: usize = 3;
const MAX_DAILY_HINTS: usize = 3;

pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: SecretString,
    units: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: SecretString, units: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            units: units.into(),
        }
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        let key = self.api_key.expose_secret();
        if key.is_empty() {
            return Err(ProviderError::MissingCredential {
                name: "openweather".into(),
                key: "OPENWEATHER_API_KEY".into(),
            });
        }
        Ok(key)
    }

    async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ProviderError> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        name: "openweather".into(),
                        timeout: REQUEST_TIMEOUT,
                    }
                } else {
                    ProviderError::RequestFailed {
                        name: "openweather".into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::RequestFailed {
                name: "openweather".into(),
                reason: format!("status {status}"),
            });
        }

        resp.json().await.map_err(|e| ProviderError::InvalidPayload {
            name: "openweather".into(),
            reason: e.to_string(),
        })
    }

    /// Resolve a free-text location to coordinates and a canonical name.
    pub async fn geocode(&self, location_text: &str) -> Result<GeocodeResult, ProviderError> {
        let q = location_text.trim();
        if q.is_empty() {
            return Ok(GeocodeResult {
                lat: None,
                lon: None,
                resolved_name: String::new(),
            });
        }
        let key = self.require_key()?.to_string();

        let data = self
            .get_json(
                GEO_URL,
                &[
                    ("q", q.to_string()),
                    ("limit", "1".to_string()),
                    ("appid", key),
                ],
            )
            .await?;

        let Some(item) = data.as_array().and_then(|a| a.first()) else {
            return Ok(GeocodeResult {
                lat: None,
                lon: None,
                resolved_name: q.to_string(),
            });
        };

        let name = item.get("name").and_then(Value::as_str).unwrap_or(q);
        let state = item.get("state").and_then(Value::as_str).unwrap_or("");
        let country = item.get("country").and_then(Value::as_str).unwrap_or("");
        let resolved: String = [name, state, country]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ");

        Ok(GeocodeResult {
            lat: item.get("lat").and_then(Value::as_f64),
            lon: item.get("lon").and_then(Value::as_f64),
            resolved_name: if resolved.is_empty() {
                q.to_string()
            } else {
                resolved
            },
        })
    }

    /// Fetch a weather snapshot with the 3.0 → 2.5 → current fallback chain.
    pub async fn weather(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot, ProviderError> {
        let key = self.require_key()?.to_string();

        let onecall_params = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("appid", key.clone()),
            ("units", self.units.clone()),
            ("exclude", "minutely,hourly".to_string()),
        ];

        match self.get_json(ONECALL_30_URL, &onecall_params).await {
            Ok(data) => return Ok(snapshot_from_onecall(&data)),
            Err(e) => warn!(error = %e, "One Call 3.0 failed, trying 2.5"),
        }

        match self.get_json(ONECALL_25_URL, &onecall_params).await {
            Ok(data) => return Ok(snapshot_from_onecall(&data)),
            Err(e) => warn!(error = %e, "One Call 2.5 failed, trying current weather"),
        }

        let current_params = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("appid", key),
            ("units", self.units.clone()),
        ];
        let data = self.get_json(CURRENT_URL, &current_params).await?;
        Ok(snapshot_from_current(&data))
    }
}

// ── Payload shaping ─────────────────────────────────────────────────

fn first_weather_description(v: Option<&Value>) -> String {
    v.and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(|w| w.get("description"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn coerce_alerts(data: &Value) -> Vec<String> {
    let Some(alerts) = data.get("alerts").and_then(Value::as_array) else {
        return Vec::new();
    };
    alerts
        .iter()
        .take(MAX_ALERTS)
        .filter_map(|a| {
            let event = a.get("event").and_then(Value::as_str)?.trim();
            if event.is_empty() {
                return None;
            }
            let sender = a
                .get("sender_name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim();
            Some(if sender.is_empty() {
                event.to_string()
            } else {
                format!("{event} ({sender})")
            })
        })
        .collect()
}

fn snapshot_from_onecall(data: &Value) -> WeatherSnapshot {
    let current = data.get("current");
    let desc = first_weather_description(current.and_then(|c| c.get("weather")));
    let temp = current
        .and_then(|c| c.get("temp"))
        .and_then(Value::as_f64);

    let daily: Vec<String> = data
        .get("daily")
        .and_then(Value::as_array)
        .map(|days| {
            days.iter()
                .take(MAX_DAILY_HINTS)
                .map(|d| first_weather_description(d.get("weather")))
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut parts = Vec::new();
    if !desc.is_empty() {
        parts.push(capitalize(&desc));
    }
    if let Some(t) = temp {
        parts.push(format!("{t:.0}°"));
    }
    if let Some(today) = daily.first()
        && today.to_lowercase() != desc.to_lowercase()
    {
        parts.push(format!("Today: {today}"));
    }
    let summary = if parts.is_empty() {
        "Weather data available.".to_string()
    } else {
        parts.join(" • ")
    };

    WeatherSnapshot {
        fetched_at_utc: utc_now_iso(),
        summary,
        alerts: coerce_alerts(data),
        daily,
    }
}

fn snapshot_from_current(data: &Value) -> WeatherSnapshot {
    let desc = first_weather_description(data.get("weather"));
    let temp = data
        .get("main")
        .and_then(|m| m.get("temp"))
        .and_then(Value::as_f64);

    let mut parts = Vec::new();
    if !desc.is_empty() {
        parts.push(capitalize(&desc));
    }
    if let Some(t) = temp {
        parts.push(format!("{t:.0}°"));
    }
    let summary = if parts.is_empty() {
        "Weather data available.".to_string()
    } else {
        parts.join(" • ")
    };

    WeatherSnapshot {
        fetched_at_utc: utc_now_iso(),
        summary,
        alerts: Vec::new(),
        daily: Vec::new(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
