//! Judge transport.
//!
//! The pipeline talks to the judge through the [`JudgeClient`] trait; the
//! HTTP implementation targets an Anthropic-compatible messages endpoint.
//! The API credential is read from the environment variable named in config
//! and never serialized anywhere.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::config::JudgeConfig;
use crate::judge::JudgeError;

const API_VERSION: &str = "2023-06-01";

/// A completion backend for the judge. Implemented by the HTTP client and by
/// test mocks.
pub trait JudgeClient: Send + Sync {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, JudgeError>;
}

/// Blocking HTTP client for the judge endpoint.
pub struct HttpJudgeClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f64,
}

impl HttpJudgeClient {
    /// Build a client from config, resolving the credential from the
    /// environment. Fails fast if the env var is unset so a whole batch is
    /// never burned on auth errors.
    pub fn from_config(config: &JudgeConfig) -> Result<Self, JudgeError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| JudgeError::MissingCredential(config.api_key_env.clone()))?;

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| JudgeError::Connection(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/v1/messages", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn classify(e: reqwest::Error) -> JudgeError {
        if e.is_timeout() {
            JudgeError::Timeout(e.to_string())
        } else {
            JudgeError::Connection(e.to_string())
        }
    }
}

impl JudgeClient for HttpJudgeClient {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, JudgeError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system,
            "messages": [{"role": "user", "content": prompt}],
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending judge request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(JudgeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().map_err(Self::classify)?;
        payload["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                JudgeError::MalformedResponse("no text block in response content".to_string())
            })
    }
}

#[cfg(test)]
pub use mock::MockJudgeClient;
