//! Loop policy constants, supplied by configuration.

/// Caps that bound a single session.
///
/// The step cap is global; the failure cap and stagnation threshold apply to
/// one URL at a time and are independent of the step cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPolicy {
    /// Maximum loop iterations per session.
    pub max_steps: u32,
    /// Rejected submissions tolerated for one URL before giving up.
    pub max_failures_per_url: u32,
    /// Identical consecutive candidates that trigger a skipped submission.
    pub stagnation_threshold: u32,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self {
            max_steps: 40,
            max_failures_per_url: 3,
            stagnation_threshold: 3,
        }
    }
}
