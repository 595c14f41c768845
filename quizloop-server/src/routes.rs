//! HTTP route handlers for the quiz service.

use std::path::PathBuf;
use std::time::Instant;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use quizloop::core::budget::deadline_after;
use quizloop::core::types::Session;
use quizloop::io::transcript_log::write_transcript;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::state::AppState;

/// Build the service router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/quiz", post(solve))
        .route("/solve", post(solve))
}

#[derive(Debug, Deserialize)]
pub struct QuizRequest {
    pub email: String,
    pub secret: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct QuizResponse {
    pub status: &'static str,
    pub result: Value,
}

impl QuizResponse {
    fn error(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "error",
            result: Value::String(message.into()),
        })
    }
}

async fn health() -> &'static str {
    "ok"
}

/// POST /quiz - run one session and return its transcript.
#[instrument(skip_all)]
async fn solve(
    State(state): State<AppState>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> (StatusCode, Json<QuizResponse>) {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(err = %rejection.body_text(), "rejected request body");
            return (StatusCode::BAD_REQUEST, QuizResponse::error(rejection.body_text()));
        }
    };
    if !state.secret_matches(&request.secret) {
        warn!(email = %request.email, "invalid secret");
        return (StatusCode::FORBIDDEN, QuizResponse::error("invalid secret"));
    }
    if request.url.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, QuizResponse::error("url must be non-empty"));
    }

    let deadline = deadline_after(Instant::now(), state.time_budget);
    info!(email = %request.email, url = %request.url, "session accepted");
    let session = state.runner.run_session(request.url.trim(), deadline).await;

    if let Some(dir) = state.transcript_dir.clone() {
        persist_transcript(dir, session.clone()).await;
    }

    let status = if session.stop.is_success() {
        "success"
    } else {
        "error"
    };
    match serde_json::to_value(&session) {
        Ok(result) => (StatusCode::OK, Json(QuizResponse { status, result })),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            QuizResponse::error(format!("serialize session: {err}")),
        ),
    }
}

/// Write the transcript on the blocking pool; failures are logged only.
async fn persist_transcript(dir: PathBuf, session: Session) {
    match tokio::task::spawn_blocking(move || write_transcript(&dir, &session)).await {
        Ok(Ok(path)) => info!(path = %path.display(), "transcript written"),
        Ok(Err(err)) => warn!(err = %format!("{err:#}"), "transcript write failed"),
        Err(err) => warn!(err = %err, "transcript writer panicked"),
    }
}
