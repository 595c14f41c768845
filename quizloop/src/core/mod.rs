//! Deterministic, pure logic shared by the agent loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod code_extract;
pub mod html_text;
pub mod policy;
pub mod types;
pub mod url_state;
