//! Shared time budget helpers for deadline-driven sessions.

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

/// Absolute deadline for a session that starts at `start`.
pub fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start + budget
}

/// True once `now` has reached the deadline.
pub fn is_expired_at(deadline: Instant, now: Instant) -> bool {
    now >= deadline
}

pub fn is_expired(deadline: Instant) -> bool {
    is_expired_at(deadline, Instant::now())
}

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(anyhow!("session deadline passed"));
    }
    Ok(remaining)
}
