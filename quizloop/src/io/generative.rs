//! Generative answer producer: prompt a model for code, run it in a sandbox.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::core::code_extract::extract_code;
use crate::core::types::Answer;
use crate::io::llm::ChatModel;
use crate::io::producer::{AnswerProducer, ProduceRequest};
use crate::io::prompt::PromptBuilder;
use crate::io::sandbox::Sandbox;

pub struct GenerativeProducer<M, S> {
    model: M,
    sandbox: S,
    prompts: PromptBuilder,
}

impl<M: ChatModel, S: Sandbox> GenerativeProducer<M, S> {
    pub fn new(model: M, sandbox: S, allowed_imports: Vec<String>) -> Self {
        Self {
            model,
            sandbox,
            prompts: PromptBuilder::new(allowed_imports),
        }
    }
}

#[async_trait]
impl<M: ChatModel, S: Sandbox> AnswerProducer for GenerativeProducer<M, S> {
    #[instrument(skip_all, fields(url = %request.url))]
    async fn produce(&self, request: &ProduceRequest<'_>) -> Result<Option<Answer>> {
        let prompt = self
            .prompts
            .build(request.url, request.context)
            .context("render solver prompt")?;
        let completion = self
            .model
            .complete(&prompt)
            .await
            .context("generate solver code")?;
        let code = extract_code(&completion);
        if code.is_empty() {
            warn!("completion contained no code");
            return Ok(None);
        }
        debug!(code = %code, "running generated code");

        // A raising script is a missing answer, not a failed call.
        match self.sandbox.run(&code).await {
            Ok(value) => Ok(value.and_then(Answer::from_value)),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "generated code failed");
                Ok(None)
            }
        }
    }
}
