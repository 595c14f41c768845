//! Answer submission with bounded retries.
//!
//! Only transport-level faults are retried: non-2xx statuses, connection
//! errors, timeouts and 2xx bodies that do not match
//! `schemas/submit_response.schema.json`. A well-formed `correct: false` is an
//! answer, not a fault, and comes back on the first attempt.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use jsonschema::{Draft, Validator};
use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::budget::{is_expired, remaining_budget};
use crate::core::types::{Answer, SubmitFeedback};
use crate::io::config::QuizConfig;

const RESPONSE_SCHEMA: &str = include_str!("../../schemas/submit_response.schema.json");

/// Terminal submission failures. The loop branches on the variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("submission failed after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },
    #[error("time exceeded before submission attempt {}", .attempts + 1)]
    TimeExceeded { attempts: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct SubmitRequest<'a> {
    /// Quiz URL the answer belongs to.
    pub url: &'a str,
    pub answer: &'a Answer,
    pub deadline: Instant,
}

#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, request: &SubmitRequest<'_>) -> Result<SubmitFeedback, SubmitError>;
}

/// Submitter posting `{email, secret, url, answer}` to a fixed endpoint.
pub struct HttpSubmitter {
    client: Client,
    endpoint: String,
    email: String,
    secret: String,
    retries: u32,
    retry_delay: Duration,
    timeout: Duration,
    schema: Validator,
}

impl HttpSubmitter {
    pub fn new(config: &QuizConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("build submit client")?;
        let schema_value: Value =
            serde_json::from_str(RESPONSE_SCHEMA).context("parse submit response schema")?;
        let schema = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema_value)
            .context("compile submit response schema")?;
        Ok(Self {
            client,
            endpoint: config.submit.url.clone(),
            email: config.email.clone(),
            secret: config.secret.clone(),
            retries: config.submit.retries.max(1),
            retry_delay: Duration::from_millis(config.submit.retry_delay_ms),
            timeout: Duration::from_secs(config.submit.timeout_secs),
            schema,
        })
    }

    async fn attempt(&self, body: &Value, deadline: Instant) -> Result<SubmitFeedback> {
        let timeout = remaining_budget(deadline)?.min(self.timeout);
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;
        let status = response.status();
        let text = response.text().await.context("read submit response")?;
        if !status.is_success() {
            return Err(anyhow!("HTTP {status}: {}", snippet(&text)));
        }
        self.parse_feedback(&text)
    }

    fn parse_feedback(&self, text: &str) -> Result<SubmitFeedback> {
        let value: Value = serde_json::from_str(text)
            .with_context(|| format!("submit response is not JSON: {}", snippet(text)))?;
        let messages: Vec<String> = self
            .schema
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            return Err(anyhow!(
                "submit response schema validation failed: {}",
                messages.join("; ")
            ));
        }
        serde_json::from_value(value).context("deserialize submit response")
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    #[instrument(skip_all, fields(url = %request.url, answer = %request.answer))]
    async fn submit(&self, request: &SubmitRequest<'_>) -> Result<SubmitFeedback, SubmitError> {
        let body = json!({
            "email": self.email,
            "secret": self.secret,
            "url": request.url,
            "answer": request.answer,
        });

        let attempts = AtomicU32::new(0);
        let (body, attempts_ref) = (&body, &attempts);
        let outcome = (|| async move {
            if is_expired(request.deadline) {
                return Err(AttemptError::Deadline);
            }
            let attempt = attempts_ref.fetch_add(1, Ordering::Relaxed) + 1;
            let feedback = self
                .attempt(body, request.deadline)
                .await
                .map_err(|err| AttemptError::Transport(format!("{err:#}")))?;
            info!(attempt, correct = feedback.correct, "submission answered");
            Ok(feedback)
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(self.retry_delay)
                .with_max_times(self.retries.saturating_sub(1) as usize),
        )
        .when(|err| matches!(err, AttemptError::Transport(_)))
        .notify(|err: &AttemptError, dur: Duration| {
            warn!(
                retries = self.retries,
                delay_ms = dur.as_millis() as u64,
                err = %err,
                "submission attempt failed, retrying"
            );
        })
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        outcome.map_err(|err| match err {
            AttemptError::Deadline => {
                warn!(attempts, "deadline passed before submission attempt");
                SubmitError::TimeExceeded { attempts }
            }
            AttemptError::Transport(message) => {
                warn!(attempts, err = %message, "submission failed");
                SubmitError::Transport { attempts, message }
            }
        })
    }
}

/// Outcome of one attempt; only transport faults are retried.
#[derive(Debug, Error)]
enum AttemptError {
    #[error("deadline passed")]
    Deadline,
    #[error("{0}")]
    Transport(String),
}

fn snippet(text: &str) -> String {
    const MAX: usize = 200;
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitter() -> HttpSubmitter {
        HttpSubmitter::new(&QuizConfig::default()).expect("submitter")
    }

    #[test]
    fn parses_feedback_with_url_alias() {
        let feedback = submitter()
            .parse_feedback(r#"{"correct": true, "url": "https://quiz.example/2", "reason": null}"#)
            .expect("parse");
        assert!(feedback.correct);
        assert_eq!(feedback.next_url(), Some("https://quiz.example/2"));
    }

    #[test]
    fn rejects_schema_violations() {
        let err = submitter()
            .parse_feedback(r#"{"correct": "yes"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));

        let err = submitter().parse_feedback(r#"{"url": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn rejects_non_json_body() {
        let err = submitter().parse_feedback("<html>oops</html>").unwrap_err();
        assert!(err.to_string().contains("not JSON"));
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let long = "x".repeat(500);
        assert_eq!(snippet(&long).len(), 203);
        assert_eq!(snippet("  short "), "short");
    }

    #[test]
    fn time_exceeded_names_next_attempt() {
        let err = SubmitError::TimeExceeded { attempts: 1 };
        assert_eq!(err.to_string(), "time exceeded before submission attempt 2");
    }
}
