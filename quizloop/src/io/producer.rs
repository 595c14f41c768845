//! Answer producer abstraction.
//!
//! The loop consumes any [`AnswerProducer`] the same way: an error and a
//! `None` are both "no candidate this iteration". [`ConfiguredProducer`] picks
//! the variant a deployment runs.

use anyhow::Result;
use async_trait::async_trait;

use crate::core::types::Answer;
use crate::io::config::{ProducerKind, QuizConfig};
use crate::io::fetcher::{HttpPageFetcher, Page};
use crate::io::generative::GenerativeProducer;
use crate::io::heuristic::HeuristicProducer;
use crate::io::llm::OpenAiChatModel;
use crate::io::sandbox::PythonSandbox;

/// Inputs for one answer attempt.
#[derive(Debug, Clone, Copy)]
pub struct ProduceRequest<'a> {
    /// URL currently being solved.
    pub url: &'a str,
    /// Page as fetched when the loop arrived at `url`.
    pub page: &'a Page,
    /// Page text plus accumulated feedback annotations.
    pub context: &'a str,
}

#[async_trait]
pub trait AnswerProducer: Send + Sync {
    async fn produce(&self, request: &ProduceRequest<'_>) -> Result<Option<Answer>>;
}

/// Producer variant selected by configuration.
pub enum ConfiguredProducer {
    Generative(GenerativeProducer<OpenAiChatModel, PythonSandbox>),
    Heuristic(HeuristicProducer<HttpPageFetcher>),
}

impl ConfiguredProducer {
    pub fn from_config(config: &QuizConfig) -> Result<Self> {
        match config.producer {
            ProducerKind::Generative => Ok(Self::Generative(GenerativeProducer::new(
                OpenAiChatModel::new(&config.llm)?,
                PythonSandbox::new(&config.sandbox),
                config.sandbox.allowed_imports.clone(),
            ))),
            ProducerKind::Heuristic => Ok(Self::Heuristic(HeuristicProducer::new(
                HttpPageFetcher::new(&config.fetch)?,
                config.heuristic.fallback_answer.clone(),
            ))),
        }
    }
}

#[async_trait]
impl AnswerProducer for ConfiguredProducer {
    async fn produce(&self, request: &ProduceRequest<'_>) -> Result<Option<Answer>> {
        match self {
            Self::Generative(producer) => producer.produce(request).await,
            Self::Heuristic(producer) => producer.produce(request).await,
        }
    }
}
