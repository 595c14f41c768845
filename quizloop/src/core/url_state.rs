//! Per-URL bookkeeping: rejection counts, stagnation streaks and feedback.
//!
//! A [`UrlState`] lives exactly as long as the loop works one URL. Moving to a
//! new URL replaces it, so no counter or annotation leaks across URLs.

use crate::core::types::Answer;

/// Decision of the stagnation check for a fresh candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateVerdict {
    /// Spend a submission on the candidate.
    Submit,
    /// The candidate repeated `streak` times in a row; do not submit it.
    Stagnant { streak: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlState {
    url: String,
    failure_count: u32,
    last_answer: Option<Answer>,
    same_answer_streak: u32,
    annotations: Vec<String>,
}

impl UrlState {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            failure_count: 0,
            last_answer: None,
            same_answer_streak: 0,
            annotations: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_answer(&self) -> Option<&Answer> {
        self.last_answer.as_ref()
    }

    pub fn same_answer_streak(&self) -> u32 {
        self.same_answer_streak
    }

    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    /// Track `candidate` and decide whether it may be submitted.
    ///
    /// The streak counts consecutive identical candidates including this one.
    /// Reaching `threshold` appends a corrective annotation and restarts the
    /// streak.
    pub fn observe_candidate(&mut self, candidate: &Answer, threshold: u32) -> CandidateVerdict {
        if self.last_answer.as_ref() == Some(candidate) {
            self.same_answer_streak += 1;
        } else {
            self.last_answer = Some(candidate.clone());
            self.same_answer_streak = 1;
        }

        if self.same_answer_streak < threshold {
            return CandidateVerdict::Submit;
        }

        let streak = self.same_answer_streak;
        self.same_answer_streak = 0;
        self.annotations.push(format!(
            "You are repeating the same wrong answer ({candidate}) {streak} times in a row. \
             Change approach: re-read the question and compute a different result."
        ));
        CandidateVerdict::Stagnant { streak }
    }

    /// Count a rejected submission and return the new failure count.
    pub fn record_rejection(&mut self) -> u32 {
        self.failure_count += 1;
        self.failure_count
    }

    /// Feed a rejection back into the context for the next attempt.
    pub fn annotate_rejection(&mut self, answer: &Answer, reason: Option<&str>) {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let note = match reason {
            Some(reason) => format!(
                "Submitted answer {answer} was incorrect. Server feedback: {reason}"
            ),
            None => format!("Submitted answer {answer} was incorrect."),
        };
        self.annotations.push(note);
    }

    /// Clear counters and feedback after a correct submission.
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.last_answer = None;
        self.same_answer_streak = 0;
        self.annotations.clear();
    }

    /// Page text followed by every annotation gathered for this URL.
    pub fn render_context(&self, page_text: &str) -> String {
        let mut buf = page_text.trim_end().to_string();
        if self.annotations.is_empty() {
            return buf;
        }
        buf.push_str("\n\n## Feedback from previous attempts\n");
        for (idx, note) in self.annotations.iter().enumerate() {
            buf.push_str(&format!("{}. {}\n", idx + 1, note));
        }
        buf
    }
}
