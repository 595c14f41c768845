//! Tracing setup shared by the CLI and the HTTP service.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: operational diagnostics via `RUST_LOG`, output
//!   to stderr. Not part of the session result.
//!
//! - **Transcript dumps (`io/transcript_log`)**: per-session JSON artifacts,
//!   written only when a transcript directory is configured.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; falls back to `default_directive` when unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=quizloop=debug quizloop solve --url https://quiz.example/start
/// ```
pub fn init(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
