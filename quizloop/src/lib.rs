//! Quiz-chain solving agent loop.
//!
//! A session starts at a quiz URL, produces an answer for the page, submits it
//! and follows the next URL named by the submission response until the chain
//! ends or a budget runs out. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (answers, budgets, per-URL
//!   bookkeeping, text extraction). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (HTTP fetch and submit, the
//!   generation service, the code sandbox, config and transcript files).
//!   Each sits behind a trait so tests can script it.
//!
//! [`agent_loop`] drives the collaborators and owns all per-session state.

pub mod agent_loop;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
