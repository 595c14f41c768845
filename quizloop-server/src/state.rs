//! Shared application state for the quiz service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quizloop::agent_loop::SessionRunner;
use quizloop::io::config::QuizConfig;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared secret callers must present.
    secret: Arc<str>,
    /// Loop used for every session; sessions share no mutable state.
    pub runner: Arc<dyn SessionRunner>,
    /// Budget applied to each session from the moment it is accepted.
    pub time_budget: Duration,
    /// Where finished sessions are dumped, if anywhere.
    pub transcript_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(config: &QuizConfig, runner: Arc<dyn SessionRunner>) -> Self {
        Self {
            secret: Arc::from(config.secret.as_str()),
            runner,
            time_budget: config.time_budget(),
            transcript_dir: config.transcript_dir.clone(),
        }
    }

    pub fn secret_matches(&self, candidate: &str) -> bool {
        !self.secret.is_empty() && *self.secret == *candidate
    }
}
