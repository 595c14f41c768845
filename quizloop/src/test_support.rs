//! Test-only scripted collaborators for the agent loop.
//!
//! Scripts replay their entries in order and keep repeating the last one once
//! exhausted. Every collaborator records what it was asked for.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::core::types::{Answer, SubmitFeedback};
use crate::io::fetcher::{Page, PageFetcher};
use crate::io::producer::{AnswerProducer, ProduceRequest};
use crate::io::submitter::{SubmitError, SubmitRequest, Submitter};

/// Build a submission response.
pub fn feedback(correct: bool, next_url: Option<&str>, reason: Option<&str>) -> SubmitFeedback {
    SubmitFeedback {
        correct,
        next_url: next_url.map(str::to_string),
        reason: reason.map(str::to_string),
    }
}

struct Script<T> {
    entries: Vec<T>,
    cursor: Mutex<usize>,
}

impl<T: Clone> Script<T> {
    fn new(entries: Vec<T>) -> Self {
        assert!(!entries.is_empty(), "script must have at least one entry");
        Self {
            entries,
            cursor: Mutex::new(0),
        }
    }

    fn next(&self) -> T {
        let mut cursor = self.cursor.lock().expect("script lock");
        let idx = (*cursor).min(self.entries.len() - 1);
        *cursor += 1;
        self.entries[idx].clone()
    }
}

/// Producer replaying scripted answers; `Err` entries become producer faults.
pub struct ScriptedProducer {
    script: Script<Result<Option<Answer>, String>>,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedProducer {
    pub fn sequence(entries: Vec<Result<Option<Answer>, String>>) -> Self {
        Self {
            script: Script::new(entries),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(answer: Answer) -> Self {
        Self::sequence(vec![Ok(Some(answer))])
    }

    pub fn answers(answers: Vec<Answer>) -> Self {
        Self::sequence(answers.into_iter().map(|a| Ok(Some(a))).collect())
    }

    /// Context strings received, one per call.
    pub fn contexts(&self) -> Vec<String> {
        self.contexts.lock().expect("contexts lock").clone()
    }
}

#[async_trait]
impl AnswerProducer for ScriptedProducer {
    async fn produce(&self, request: &ProduceRequest<'_>) -> Result<Option<Answer>> {
        self.contexts
            .lock()
            .expect("contexts lock")
            .push(request.context.to_string());
        self.script.next().map_err(|err| anyhow!(err))
    }
}

/// Submitter replaying scripted outcomes.
pub struct ScriptedSubmitter {
    script: Script<Result<SubmitFeedback, SubmitError>>,
    calls: Mutex<Vec<(String, Answer)>>,
}

impl ScriptedSubmitter {
    pub fn sequence(entries: Vec<Result<SubmitFeedback, SubmitError>>) -> Self {
        Self {
            script: Script::new(entries),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: Result<SubmitFeedback, SubmitError>) -> Self {
        Self::sequence(vec![outcome])
    }

    /// `(url, answer)` pairs submitted, in order.
    pub fn calls(&self) -> Vec<(String, Answer)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl Submitter for ScriptedSubmitter {
    async fn submit(&self, request: &SubmitRequest<'_>) -> Result<SubmitFeedback, SubmitError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((request.url.to_string(), request.answer.clone()));
        self.script.next()
    }
}

/// Fetcher serving canned pages; unknown URLs fail.
#[derive(Default)]
pub struct StaticFetcher {
    pages: BTreeMap<String, Page>,
    fetched: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: Page) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Serve `text` as both body and visible text.
    pub fn with_text(self, url: &str, text: &str) -> Self {
        self.with_page(
            url,
            Page {
                url: url.to_string(),
                body: text.to_string(),
                text: text.to_string(),
            },
        )
    }

    /// URLs requested, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("fetched lock").clone()
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Page> {
        self.fetched
            .lock()
            .expect("fetched lock")
            .push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no page for {url}"))
    }
}
