//! Error types for the crop advisor.

use std::time::Duration;

/// Top-level error type for the advisor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session store errors.
///
/// Only infrastructure failures surface here; a missing or corrupt session
/// row is self-healing (the store hands back a fresh state instead).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Unusable session identifier: {0:?}")]
    InvalidSessionId(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Messaging channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Media download failed: {0}")]
    MediaDownload(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Model (structured-extraction / generation) errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Enrichment provider errors (geocoding, weather, search).
///
/// Step executors recover these locally: the step keeps the previous cached
/// snapshot and the next staleness check retries.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {name} request failed: {reason}")]
    RequestFailed { name: String, reason: String },

    #[error("Provider {name} returned an unusable payload: {reason}")]
    InvalidPayload { name: String, reason: String },

    #[error("Provider {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Missing credential for provider {name}: {key}")]
    MissingCredential { name: String, key: String },

    #[error("Invalid parameters for provider {name}: {reason}")]
    InvalidParameters { name: String, reason: String },
}

/// Result type alias for the advisor.
pub type Result<T> = std::result::Result<T, Error>;
