//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use secrecy::SecretString;

use crate::advisor::FreshnessPolicy;
use crate::error::ConfigError;

/// Runtime settings, read once from the environment at startup. Missing
/// required values are fatal at the boundary.
#[derive(Debug, Clone)]
pub struct Settings {
    // Model
    pub openai_api_key: SecretString,
    pub openai_model: String,
    pub openai_base_url: Option<String>,

    // Search
    pub tavily_api_key: SecretString,
    pub tavily_max_results: usize,

    // Weather
    pub openweather_api_key: SecretString,
    pub openweather_units: String,

    // Telegram
    pub telegram_bot_token: String,

    // Storage
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,

    // Digest push
    pub digest_interval: Duration,

    // Snapshot freshness
    pub freshness: FreshnessPolicy,
}

fn require(name: &str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn as_i64(name: &str, default: i64) -> Result<i64, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: name.to_string(),
            message: format!("not an integer: {raw}"),
        }),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let openai_api_key = SecretString::from(require("OPENAI_API_KEY")?);
        let openai_model =
            optional("OPENAI_MODEL").unwrap_or_else(|| "gpt-4.1-mini".to_string());
        let openai_base_url = optional("OPENAI_BASE_URL");

        let tavily_api_key = SecretString::from(require("TAVILY_API_KEY")?);
        let tavily_max_results = as_i64("TAVILY_MAX_RESULTS", 5)? as usize;

        let openweather_api_key = SecretString::from(require("OPENWEATHER_API_KEY")?);
        let openweather_units =
            optional("OPENWEATHER_UNITS").unwrap_or_else(|| "metric".to_string());
        if !matches!(openweather_units.as_str(), "metric" | "imperial" | "standard") {
            return Err(ConfigError::InvalidValue {
                key: "OPENWEATHER_UNITS".to_string(),
                message: "must be one of: metric, imperial, standard".to_string(),
            });
        }

        let telegram_bot_token = require("TELEGRAM_BOT_TOKEN")?;

        let data_dir = PathBuf::from(optional("DATA_DIR").unwrap_or_else(|| "./data".to_string()));
        let db_path = optional("DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("crop-advisor.db"));
        let media_dir = optional("MEDIA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("media"));
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(&media_dir)?;

        // Default 24h; shorten for testing.
        let digest_interval =
            Duration::from_secs(as_i64("DIGEST_INTERVAL_SECONDS", 86_400)?.max(1) as u64);

        let freshness = FreshnessPolicy {
            weather_max_age: ChronoDuration::hours(as_i64("WEATHER_MAX_AGE_HOURS", 6)?),
            web_max_age: ChronoDuration::hours(as_i64("WEB_MAX_AGE_HOURS", 24)?),
            schemes_max_age: ChronoDuration::days(as_i64("SCHEMES_MAX_AGE_DAYS", 7)?),
            market_max_age: ChronoDuration::hours(as_i64("MARKET_MAX_AGE_HOURS", 12)?),
        };

        Ok(Self {
            openai_api_key,
            openai_model,
            openai_base_url,
            tavily_api_key,
            tavily_max_results,
            openweather_api_key,
            openweather_units,
            telegram_bot_token,
            data_dir,
            db_path,
            media_dir,
            digest_interval,
            freshness,
        })
    }
}
