//! Stable exit codes for the `quizloop` CLI.

use crate::core::types::SessionStop;

/// The chain was solved, or a command such as `check-config` succeeded.
pub const OK: i32 = 0;
/// Invalid configuration, arguments or other setup errors.
pub const INVALID: i32 = 1;
/// The session ran out of time.
pub const TIMED_OUT: i32 = 2;
/// The session gave up: step cap or per-URL failure cap reached.
pub const GAVE_UP: i32 = 3;
/// A page could not be fetched or submissions kept failing in transit.
pub const TRANSPORT: i32 = 4;

pub fn for_stop(stop: &SessionStop) -> i32 {
    match stop {
        SessionStop::Solved { .. } => OK,
        SessionStop::TimedOut => TIMED_OUT,
        SessionStop::StepCapReached { .. } | SessionStop::FailureCapReached { .. } => GAVE_UP,
        SessionStop::TransportError { .. } | SessionStop::FetchFailed { .. } => TRANSPORT,
    }
}
