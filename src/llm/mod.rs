//! Model integration — the structured-extraction / generation client.
//!
//! One narrow seam: [`LlmProvider`] takes a (system, user[, image]) request
//! and returns text. Everything JSON-shaped on top of it lives in
//! [`json`] — extraction of a JSON object from loose model output and the
//! bounded-retry `complete_json` contract.

pub mod json;

pub use json::{complete_json, extract_json_object};

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;

/// Default number of attempts for a structured-output call.
pub const DEFAULT_JSON_ATTEMPTS: u32 = 2;

/// A single completion request. `image_data_url`, when present, is attached
/// to the user message as an image part (vision diagnosis).
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user: String,
    pub image_data_url: Option<String>,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            image_data_url: None,
            temperature: 0.2,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image_data_url(mut self, url: impl Into<String>) -> Self {
        self.image_data_url = Some(url.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// LLM provider seam. Live implementation below; tests use scripted stubs.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// OpenAI-compatible chat-completions client.
///
/// Works against api.openai.com or any compatible gateway via `base_url`.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model calls are bounded by this host-level timeout.
const MODEL_TIMEOUT: Duration = Duration::from_secs(120);

impl OpenAiCompatProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>, base_url: Option<&str>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(MODEL_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url,
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }

        let user_content = match &request.image_data_url {
            Some(url) => serde_json::json!([
                {"type": "text", "text": request.user},
                {"type": "image_url", "image_url": {"url": url}},
            ]),
            None => serde_json::json!(request.user),
        };
        messages.push(serde_json::json!({"role": "user", "content": user_content}));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
        });

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed {
                provider: "openai".into(),
            });
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "openai".into(),
                reason: format!("status {status}: {detail}"),
            });
        }

        let data: serde_json::Value = resp.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: "openai".into(),
            reason: e.to_string(),
        })?;

        let content = data
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: "openai".into(),
                reason: "missing choices[0].message.content".into(),
            })?;

        Ok(CompletionResponse {
            content: content.trim().to_string(),
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
