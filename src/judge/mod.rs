//! Layer 2: LLM judge.
//!
//! Sends transcript + note to a judge model and parses its structured
//! verdict. Calls go through a trait so the pipeline can run against a mock
//! in tests. Temperature is pinned at 0 and each note is judged
//! independently, no cross-note context.

pub mod client;
pub mod parser;
pub mod prompt;

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::JudgeConfig;
use crate::models::JudgmentResult;
use crate::pipeline::rate_limit::RateLimiter;

pub use client::{HttpJudgeClient, JudgeClient};

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("connection to judge endpoint failed: {0}")]
    Connection(String),

    #[error("judge request timed out: {0}")]
    Timeout(String),

    #[error("judge API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("judge response missing expected content: {0}")]
    MalformedResponse(String),

    #[error("judge output is not valid JSON: {0}")]
    JsonParsing(String),

    #[error("unknown severity '{0}' in judge output")]
    UnknownSeverity(String),

    #[error("unknown hallucination type '{0}' in judge output")]
    UnknownHallucinationType(String),

    #[error("unknown section '{0}' in judge output")]
    UnknownSection(String),

    #[error("rating {value} for '{field}' outside 1..=5")]
    RatingOutOfRange { field: String, value: i64 },

    #[error("credential env var {0} is not set")]
    MissingCredential(String),
}

impl JudgeError {
    /// Transient errors are worth retrying with backoff. Parse-family errors
    /// are retried differently, by re-prompting with a strict-JSON reminder.
    pub fn is_transient(&self) -> bool {
        match self {
            JudgeError::Connection(_) | JudgeError::Timeout(_) => true,
            JudgeError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            JudgeError::MalformedResponse(_)
                | JudgeError::JsonParsing(_)
                | JudgeError::UnknownSeverity(_)
                | JudgeError::UnknownHallucinationType(_)
                | JudgeError::UnknownSection(_)
                | JudgeError::RatingOutOfRange { .. }
        )
    }
}

/// Judge one note with retries.
///
/// Every attempt passes through the rate limiter. Transient failures back
/// off exponentially; unparseable output is retried with [`prompt::RETRY_SUFFIX`]
/// appended. Anything else (auth, 4xx) fails immediately.
pub fn evaluate_note(
    client: &dyn JudgeClient,
    limiter: &RateLimiter,
    config: &JudgeConfig,
    transcript: &str,
    soap_note: &str,
) -> Result<JudgmentResult, JudgeError> {
    let base_prompt = prompt::evaluation_prompt(transcript, soap_note);
    let mut last_error: Option<JudgeError> = None;

    for attempt in 0..=config.max_retries {
        let current_prompt = if attempt == 0 {
            base_prompt.clone()
        } else {
            format!("{base_prompt}{}", prompt::RETRY_SUFFIX)
        };

        limiter.wait();
        match client.complete(prompt::SYSTEM_PROMPT, &current_prompt) {
            Ok(text) => match parser::parse_judgment(&text) {
                Ok(result) => return Ok(result),
                Err(err) if err.is_parse_failure() && attempt < config.max_retries => {
                    warn!(attempt, error = %err, "judge output unparseable, re-prompting");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            },
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = Duration::from_millis(config.backoff_base_ms << attempt);
                warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "transient judge failure, backing off");
                thread::sleep(delay);
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error
        .unwrap_or_else(|| JudgeError::MalformedResponse("retries exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::client::MockJudgeClient;
    use crate::judge::parser::tests_support::minimal_valid_response;

    fn test_config() -> JudgeConfig {
        JudgeConfig {
            max_retries: 2,
            backoff_base_ms: 1,
            requests_per_minute: 60_000,
            ..JudgeConfig::default()
        }
    }

    fn test_limiter(config: &JudgeConfig) -> RateLimiter {
        RateLimiter::new(config.requests_per_minute)
    }

    #[test]
    fn valid_response_parses_first_try() {
        let client = MockJudgeClient::canned(minimal_valid_response());
        let config = test_config();
        let result = evaluate_note(&client, &test_limiter(&config), &config, "t", "n").unwrap();
        assert_eq!(result.overall_quality, 4);
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn malformed_then_valid_retries_with_strict_suffix() {
        let client = MockJudgeClient::scripted(vec![
            Ok("this is not json at all".to_string()),
            Ok(minimal_valid_response()),
        ]);
        let config = test_config();
        let result = evaluate_note(&client, &test_limiter(&config), &config, "t", "n").unwrap();
        assert_eq!(result.overall_quality, 4);
        assert_eq!(client.calls(), 2);
        assert!(client.last_prompt().contains("valid JSON only"));
    }

    #[test]
    fn transient_errors_retried_until_exhausted() {
        let client = MockJudgeClient::scripted(vec![
            Err(JudgeError::Timeout("read timeout".into())),
            Err(JudgeError::Api {
                status: 503,
                body: "overloaded".into(),
            }),
            Err(JudgeError::Timeout("read timeout".into())),
        ]);
        let config = test_config();
        let err = evaluate_note(&client, &test_limiter(&config), &config, "t", "n").unwrap_err();
        assert!(err.is_transient());
        assert_eq!(client.calls(), 3); // initial + max_retries
    }

    #[test]
    fn non_transient_api_error_fails_immediately() {
        let client = MockJudgeClient::scripted(vec![Err(JudgeError::Api {
            status: 401,
            body: "invalid x-api-key".into(),
        })]);
        let config = test_config();
        let err = evaluate_note(&client, &test_limiter(&config), &config, "t", "n").unwrap_err();
        assert!(matches!(err, JudgeError::Api { status: 401, .. }));
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn rate_limit_status_is_transient() {
        let err = JudgeError::Api {
            status: 429,
            body: "rate limited".into(),
        };
        assert!(err.is_transient());
        let err = JudgeError::Api {
            status: 400,
            body: "bad request".into(),
        };
        assert!(!err.is_transient());
    }
}
