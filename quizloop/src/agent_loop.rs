//! The quiz-chain agent loop.
//!
//! One [`AgentLoop::run`] call owns every piece of per-session state. The loop
//! only advances on a `nextUrl` taken from a submission response; it never
//! reads links out of pages and never asks which producer it is driving.

use std::ops::ControlFlow;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::core::budget::is_expired;
use crate::core::policy::LoopPolicy;
use crate::core::types::{Answer, Session, SessionStop, StepRecord, SubmitResult};
use crate::core::url_state::{CandidateVerdict, UrlState};
use crate::io::config::QuizConfig;
use crate::io::fetcher::{HttpPageFetcher, Page, PageFetcher};
use crate::io::producer::{AnswerProducer, ConfiguredProducer, ProduceRequest};
use crate::io::submitter::{HttpSubmitter, SubmitError, SubmitRequest, Submitter};

/// Runs sessions to completion. The service layer holds this as a trait object.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    async fn run_session(&self, start_url: &str, deadline: Instant) -> Session;
}

pub struct AgentLoop<F, P, S> {
    fetcher: F,
    producer: P,
    submitter: S,
    policy: LoopPolicy,
}

/// Loop wired with the HTTP collaborators and the configured producer.
pub type ConfiguredLoop = AgentLoop<HttpPageFetcher, ConfiguredProducer, HttpSubmitter>;

/// Build the production loop from configuration.
pub fn build_agent_loop(config: &QuizConfig) -> Result<ConfiguredLoop> {
    Ok(AgentLoop::new(
        HttpPageFetcher::new(&config.fetch)?,
        ConfiguredProducer::from_config(config)?,
        HttpSubmitter::new(config)?,
        config.loop_policy(),
    ))
}

/// Mutable state of one session.
struct Cursor {
    url: String,
    /// Fetched page for `url`; `None` forces a fetch on the next iteration.
    page: Option<Page>,
    state: UrlState,
    step_count: u32,
    transcript: Vec<StepRecord>,
}

impl Cursor {
    fn new(start_url: &str) -> Self {
        Self {
            url: start_url.to_string(),
            page: None,
            state: UrlState::new(start_url),
            step_count: 0,
            transcript: Vec::new(),
        }
    }

    fn record(&mut self, step: u32, answer: Answer, result: SubmitResult) {
        self.transcript.push(StepRecord {
            step,
            url: self.url.clone(),
            answer,
            result,
        });
    }

    fn advance_to(&mut self, next_url: &str) {
        self.url = next_url.to_string();
        self.page = None;
        self.state = UrlState::new(next_url);
    }
}

impl<F, P, S> AgentLoop<F, P, S>
where
    F: PageFetcher,
    P: AnswerProducer,
    S: Submitter,
{
    pub fn new(fetcher: F, producer: P, submitter: S, policy: LoopPolicy) -> Self {
        Self {
            fetcher,
            producer,
            submitter,
            policy,
        }
    }

    pub fn policy(&self) -> &LoopPolicy {
        &self.policy
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    /// Solve the chain starting at `start_url` until a stop condition holds.
    ///
    /// Never fails: every outcome is a [`Session`] whose `stop` says why it
    /// ended.
    #[instrument(skip(self, deadline), fields(max_steps = self.policy.max_steps))]
    pub async fn run(&self, start_url: &str, deadline: Instant) -> Session {
        let started = Instant::now();
        let mut cursor = Cursor::new(start_url);

        let stop = loop {
            if is_expired(deadline) {
                info!(steps = cursor.step_count, "deadline reached");
                break SessionStop::TimedOut;
            }
            if cursor.step_count >= self.policy.max_steps {
                info!(steps = cursor.step_count, "step cap reached");
                break SessionStop::StepCapReached {
                    max_steps: self.policy.max_steps,
                };
            }

            let step = cursor.step_count + 1;
            let flow = self.step(&mut cursor, step, deadline).await;
            cursor.step_count = step;
            if let ControlFlow::Break(stop) = flow {
                break stop;
            }
        };

        info!(
            stop = stop.label(),
            steps = cursor.step_count,
            submissions = cursor.transcript.len(),
            final_url = %cursor.url,
            "session finished"
        );
        Session {
            start_url: start_url.to_string(),
            final_url: cursor.url,
            step_count: cursor.step_count,
            transcript: cursor.transcript,
            stop,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// One iteration. `Break` carries the terminal stop reason.
    #[instrument(skip(self, cursor, deadline), fields(url = %cursor.url))]
    async fn step(&self, cursor: &mut Cursor, step: u32, deadline: Instant) -> ControlFlow<SessionStop> {
        let page = match cursor.page.take() {
            Some(page) => page,
            None => match self.fetcher.fetch(&cursor.url).await {
                Ok(page) => {
                    debug!(text_chars = page.text.len(), "fetched page");
                    page
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    warn!(err = %error, "page fetch failed");
                    return ControlFlow::Break(SessionStop::FetchFailed {
                        url: cursor.url.clone(),
                        error,
                    });
                }
            },
        };

        let context = cursor.state.render_context(&page.text);
        let produced = self
            .producer
            .produce(&ProduceRequest {
                url: &cursor.url,
                page: &page,
                context: &context,
            })
            .await;
        cursor.page = Some(page);

        let candidate = match produced {
            Ok(Some(answer)) => answer,
            Ok(None) => {
                warn!("producer returned no answer");
                return ControlFlow::Continue(());
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "producer failed");
                return ControlFlow::Continue(());
            }
        };

        if let CandidateVerdict::Stagnant { streak } = cursor
            .state
            .observe_candidate(&candidate, self.policy.stagnation_threshold)
        {
            warn!(answer = %candidate, streak, "repeated candidate; skipping submission");
            return ControlFlow::Continue(());
        }

        info!(answer = %candidate, "submitting");
        let submitted = self
            .submitter
            .submit(&SubmitRequest {
                url: &cursor.url,
                answer: &candidate,
                deadline,
            })
            .await;

        match submitted {
            Err(err) => {
                let error = err.to_string();
                warn!(err = %error, "submission aborted");
                cursor.record(step, candidate, SubmitResult::Error { error: error.clone() });
                ControlFlow::Break(match err {
                    SubmitError::TimeExceeded { .. } => SessionStop::TimedOut,
                    SubmitError::Transport { .. } => SessionStop::TransportError {
                        url: cursor.url.clone(),
                        error,
                    },
                })
            }
            Ok(feedback) if !feedback.correct => {
                let reason = feedback.reason.clone();
                cursor.record(step, candidate.clone(), SubmitResult::Feedback(feedback));
                let failures = cursor.state.record_rejection();
                info!(failures, reason = ?reason, "answer rejected");
                if failures >= self.policy.max_failures_per_url {
                    return ControlFlow::Break(SessionStop::FailureCapReached {
                        url: cursor.url.clone(),
                        failures,
                    });
                }
                cursor.state.annotate_rejection(&candidate, reason.as_deref());
                ControlFlow::Continue(())
            }
            Ok(feedback) => {
                let next_url = feedback.next_url().map(str::to_string);
                cursor.record(step, candidate, SubmitResult::Feedback(feedback));
                cursor.state.record_success();
                match next_url {
                    None => {
                        info!("answer accepted; chain finished");
                        ControlFlow::Break(SessionStop::Solved {
                            url: cursor.url.clone(),
                        })
                    }
                    Some(next) if next == cursor.url => {
                        info!("answer accepted; server repeated the current url");
                        ControlFlow::Continue(())
                    }
                    Some(next) => {
                        info!(next_url = %next, "answer accepted; advancing");
                        cursor.advance_to(&next);
                        ControlFlow::Continue(())
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<F, P, S> SessionRunner for AgentLoop<F, P, S>
where
    F: PageFetcher,
    P: AnswerProducer,
    S: Submitter,
{
    async fn run_session(&self, start_url: &str, deadline: Instant) -> Session {
        self.run(start_url, deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SubmitFeedback;
    use crate::test_support::{ScriptedProducer, ScriptedSubmitter, StaticFetcher, feedback};
    use std::time::Duration;

    fn policy() -> LoopPolicy {
        LoopPolicy {
            max_steps: 10,
            max_failures_per_url: 3,
            stagnation_threshold: 3,
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[tokio::test]
    async fn advances_only_on_response_url() {
        let fetcher = StaticFetcher::new()
            .with_text("https://quiz.example/1", "Go to https://quiz.example/decoy")
            .with_text("https://quiz.example/2", "second");
        let agent = AgentLoop::new(
            fetcher,
            ScriptedProducer::always(Answer::from(1)),
            ScriptedSubmitter::sequence(vec![
                Ok(feedback(true, Some("https://quiz.example/2"), None)),
                Ok(feedback(true, None, None)),
            ]),
            policy(),
        );

        let session = agent.run("https://quiz.example/1", deadline()).await;

        assert_eq!(
            session.stop,
            SessionStop::Solved {
                url: "https://quiz.example/2".to_string()
            }
        );
        assert_eq!(
            agent.fetcher.fetched(),
            vec!["https://quiz.example/1", "https://quiz.example/2"]
        );
        assert_eq!(session.step_count, 2);
        assert_eq!(session.final_url, "https://quiz.example/2");
    }

    #[tokio::test]
    async fn rejection_feedback_reaches_next_context_without_refetch() {
        let agent = AgentLoop::new(
            StaticFetcher::new().with_text("https://quiz.example/1", "What is 6 * 7?"),
            ScriptedProducer::sequence(vec![Ok(Some(Answer::from(41))), Ok(Some(Answer::from(42)))]),
            ScriptedSubmitter::sequence(vec![
                Ok(feedback(false, None, Some("off by one"))),
                Ok(feedback(true, None, None)),
            ]),
            policy(),
        );

        let session = agent.run("https://quiz.example/1", deadline()).await;

        assert!(matches!(session.stop, SessionStop::Solved { .. }));
        assert_eq!(agent.fetcher.fetched().len(), 1);
        let contexts = agent.producer.contexts();
        assert!(!contexts[0].contains("Feedback from previous attempts"));
        assert!(contexts[1].contains("Submitted answer 41 was incorrect. Server feedback: off by one"));
    }

    #[tokio::test]
    async fn producer_faults_only_consume_steps() {
        let agent = AgentLoop::new(
            StaticFetcher::new().with_text("https://quiz.example/1", "q"),
            ScriptedProducer::sequence(vec![Err("model down".to_string()), Ok(None)]),
            ScriptedSubmitter::always(Ok(feedback(true, None, None))),
            LoopPolicy {
                max_steps: 4,
                ..policy()
            },
        );

        let session = agent.run("https://quiz.example/1", deadline()).await;

        assert_eq!(session.stop, SessionStop::StepCapReached { max_steps: 4 });
        assert_eq!(session.step_count, 4);
        assert!(session.transcript.is_empty());
        assert!(agent.submitter.calls().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_stops_the_session() {
        let agent = AgentLoop::new(
            StaticFetcher::new(),
            ScriptedProducer::always(Answer::from(1)),
            ScriptedSubmitter::always(Ok(feedback(true, None, None))),
            policy(),
        );

        let session = agent.run("https://quiz.example/missing", deadline()).await;

        assert!(matches!(session.stop, SessionStop::FetchFailed { ref url, .. } if url == "https://quiz.example/missing"));
        assert!(session.transcript.is_empty());
    }

    #[tokio::test]
    async fn deadline_abort_in_submitter_is_timed_out() {
        let agent = AgentLoop::new(
            StaticFetcher::new().with_text("https://quiz.example/1", "q"),
            ScriptedProducer::always(Answer::from(5)),
            ScriptedSubmitter::always(Err(SubmitError::TimeExceeded { attempts: 1 })),
            policy(),
        );

        let session = agent.run("https://quiz.example/1", deadline()).await;

        assert_eq!(session.stop, SessionStop::TimedOut);
        assert_eq!(session.transcript.len(), 1);
        assert!(matches!(session.transcript[0].result, SubmitResult::Error { .. }));
    }

    #[tokio::test]
    async fn repeated_url_keeps_page_and_clears_state() {
        let agent = AgentLoop::new(
            StaticFetcher::new().with_text("https://quiz.example/1", "q"),
            ScriptedProducer::sequence(vec![
                Ok(Some(Answer::from(1))),
                Ok(Some(Answer::from(2))),
                Ok(Some(Answer::from(3))),
            ]),
            ScriptedSubmitter::sequence(vec![
                Ok(feedback(false, None, Some("no"))),
                Ok(feedback(true, Some("https://quiz.example/1"), None)),
                Ok(feedback(true, None, None)),
            ]),
            policy(),
        );

        let session = agent.run("https://quiz.example/1", deadline()).await;

        assert!(matches!(session.stop, SessionStop::Solved { .. }));
        assert_eq!(agent.fetcher.fetched().len(), 1);
        assert!(!agent.producer.contexts()[2].contains("Feedback from previous attempts"));
    }

    #[tokio::test]
    async fn session_runner_delegates_to_run() {
        let agent = AgentLoop::new(
            StaticFetcher::new().with_text("https://quiz.example/1", "q"),
            ScriptedProducer::always(Answer::from(42)),
            ScriptedSubmitter::always(Ok(SubmitFeedback {
                correct: true,
                next_url: Some("  ".to_string()),
                reason: None,
            })),
            policy(),
        );
        let runner: &dyn SessionRunner = &agent;

        let session = runner.run_session("https://quiz.example/1", deadline()).await;

        assert_eq!(session.step_count, 1);
        assert!(session.stop.is_success());
    }
}
