//! Shared deterministic types for the agent loop.
//!
//! These types define the contract between the loop and its collaborators and
//! the shape of the session returned to callers. They carry no I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Candidate answer for a quiz page.
///
/// Answers are arbitrary JSON (numbers, strings, objects). `null` and blank
/// strings are not answers; see [`Answer::from_value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answer(Value);

impl Answer {
    /// Wrap a value, returning `None` for `null` and blank strings.
    pub fn from_value(value: Value) -> Option<Self> {
        match &value {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            _ => Some(Self(value)),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<i32> for Answer {
    fn from(value: i32) -> Self {
        Self(Value::from(value))
    }
}

impl From<i64> for Answer {
    fn from(value: i64) -> Self {
        Self(Value::from(value))
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Self(Value::from(value))
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{other}"),
        }
    }
}

/// Structured feedback returned by the submission endpoint.
///
/// The wire format names the next quiz `url`; it is the only source the loop
/// uses to advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitFeedback {
    pub correct: bool,
    #[serde(default, alias = "url")]
    pub next_url: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SubmitFeedback {
    /// Next URL with blank values treated as absent.
    pub fn next_url(&self) -> Option<&str> {
        self.next_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Result recorded for a submitted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmitResult {
    Feedback(SubmitFeedback),
    Error { error: String },
}

/// One submitted iteration. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Loop iteration (1-indexed) in which the submission happened.
    pub step: u32,
    pub url: String,
    pub answer: Answer,
    pub result: SubmitResult,
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SessionStop {
    /// A correct submission came back without a next URL.
    Solved { url: String },
    /// The session deadline passed.
    TimedOut,
    /// The global iteration cap was reached.
    StepCapReached { max_steps: u32 },
    /// One URL collected too many rejected submissions.
    FailureCapReached { url: String, failures: u32 },
    /// Submission kept failing at the transport level.
    TransportError { url: String, error: String },
    /// A quiz page could not be fetched.
    FetchFailed { url: String, error: String },
}

impl SessionStop {
    /// Graceful terminations; the rest are reported as errors.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Solved { .. } | Self::TimedOut | Self::StepCapReached { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Solved { .. } => "solved",
            Self::TimedOut => "timed_out",
            Self::StepCapReached { .. } => "step_cap_reached",
            Self::FailureCapReached { .. } => "failure_cap_reached",
            Self::TransportError { .. } => "transport_error",
            Self::FetchFailed { .. } => "fetch_failed",
        }
    }
}

/// Outcome of one quiz-solve run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub start_url: String,
    /// URL being worked on when the loop stopped.
    pub final_url: String,
    pub step_count: u32,
    pub transcript: Vec<StepRecord>,
    pub stop: SessionStop,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_rejects_null_and_blank_strings() {
        assert!(Answer::from_value(Value::Null).is_none());
        assert!(Answer::from_value(json!("   ")).is_none());
        assert!(Answer::from_value(json!(0)).is_some());
        assert!(Answer::from_value(json!({})).is_some());
    }

    #[test]
    fn answer_display_unquotes_strings() {
        assert_eq!(Answer::from("abc").to_string(), "abc");
        assert_eq!(Answer::from(42).to_string(), "42");
    }

    #[test]
    fn feedback_reads_wire_url_field() {
        let feedback: SubmitFeedback = serde_json::from_value(json!({
            "correct": true,
            "url": "https://quiz.example/next",
            "delay": 3
        }))
        .expect("parse");
        assert_eq!(feedback.next_url(), Some("https://quiz.example/next"));
        assert_eq!(feedback.reason, None);
    }

    #[test]
    fn feedback_treats_blank_url_as_absent() {
        let feedback: SubmitFeedback =
            serde_json::from_value(json!({"correct": true, "url": ""})).expect("parse");
        assert_eq!(feedback.next_url(), None);
    }

    #[test]
    fn session_stop_serializes_with_reason_tag() {
        let stop = SessionStop::FailureCapReached {
            url: "u".to_string(),
            failures: 3,
        };
        let value = serde_json::to_value(&stop).expect("serialize");
        assert_eq!(
            value,
            json!({"reason": "failure_cap_reached", "url": "u", "failures": 3})
        );
        assert!(!stop.is_success());
        assert!(SessionStop::TimedOut.is_success());
    }

    #[test]
    fn submit_error_serializes_as_error_object() {
        let result = SubmitResult::Error {
            error: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&result).expect("serialize"),
            json!({"error": "boom"})
        );
    }
}
