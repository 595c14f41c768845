//! Side-effecting collaborators of the agent loop: HTTP, child processes,
//! configuration and transcript files.

pub mod config;
pub mod fetcher;
pub mod generative;
pub mod heuristic;
pub mod llm;
pub mod process;
pub mod producer;
pub mod prompt;
pub mod sandbox;
pub mod submitter;
pub mod transcript_log;
