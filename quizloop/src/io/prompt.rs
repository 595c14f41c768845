//! Prompt rendering for the generative answer producer.

use anyhow::Result;
use minijinja::{Environment, context};

const SOLVER_TEMPLATE: &str = include_str!("prompts/solver.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("solver", SOLVER_TEMPLATE)
            .expect("solver template should be valid");
        Self { env }
    }
}

/// Builds the constrained solver prompt.
pub struct PromptBuilder {
    engine: PromptEngine,
    allowed_imports: Vec<String>,
}

impl PromptBuilder {
    pub fn new(allowed_imports: Vec<String>) -> Self {
        Self {
            engine: PromptEngine::new(),
            allowed_imports,
        }
    }

    /// Render the prompt for `url` with the loop-provided context.
    pub fn build(&self, url: &str, context: &str) -> Result<String> {
        let template = self.engine.env.get_template("solver")?;
        let rendered = template.render(context! {
            url => url,
            context => context.trim(),
            allowed_imports => &self.allowed_imports,
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PromptBuilder {
        PromptBuilder::new(vec!["math".to_string(), "json".to_string()])
    }

    #[test]
    fn prompt_orders_contract_before_page() {
        let prompt = builder()
            .build("https://quiz.example/q1", "What is 6 * 7?")
            .expect("render");

        let contract_pos = prompt.find("<contract>").expect("contract");
        let page_pos = prompt.find("<page url=\"https://quiz.example/q1\">").expect("page");
        assert!(contract_pos < page_pos);
        assert!(prompt.contains("What is 6 * 7?"));
        assert!(prompt.contains("named `result`"));
        assert!(prompt.contains("You may only import: math, json."));
    }

    #[test]
    fn feedback_in_context_reaches_prompt() {
        let context = "Question\n\n## Feedback from previous attempts\n1. Submitted answer 7 was incorrect.";
        let prompt = builder().build("u", context).expect("render");
        assert!(prompt.contains("Submitted answer 7 was incorrect."));
    }
}
