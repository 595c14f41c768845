//! Service configuration: optional TOML file plus environment overrides.
//!
//! Both binaries load a `.env` file into the process environment at startup,
//! so its values arrive here through the same lookup as real variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::LoopPolicy;

const REDACTED: &str = "***";

/// Which answer producer a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerKind {
    Generative,
    Heuristic,
}

impl ProducerKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "generative" => Ok(Self::Generative),
            "heuristic" => Ok(Self::Heuristic),
            other => Err(anyhow!(
                "unknown producer '{other}' (expected generative|heuristic)"
            )),
        }
    }
}

/// Top-level configuration.
///
/// Missing fields default to the values the quiz platform expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuizConfig {
    /// Identity sent with every submission.
    pub email: String,

    /// Shared secret: checked against incoming requests and sent on submission.
    pub secret: String,

    /// Wall-clock budget per session in seconds.
    pub time_budget_secs: u64,

    /// Maximum loop iterations per session.
    pub max_steps: u32,

    /// Rejected submissions tolerated for one URL.
    pub max_failures_per_url: u32,

    /// Identical consecutive candidates that force a context change.
    pub stagnation_threshold: u32,

    pub producer: ProducerKind,

    /// Directory for finished session dumps; disabled when unset.
    pub transcript_dir: Option<PathBuf>,

    pub submit: SubmitConfig,
    pub fetch: FetchConfig,
    pub llm: LlmConfig,
    pub sandbox: SandboxConfig,
    pub heuristic: HeuristicConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubmitConfig {
    /// Fixed submission endpoint.
    pub url: String,
    /// Attempts per submission (transport failures only).
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            url: "https://tds-llm-analysis.s-anand.net/submit".to_string(),
            retries: 3,
            retry_delay_ms: 2_000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Page text beyond this many characters is dropped.
    pub max_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_chars: 15_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://aipipe.org/openai/v1/chat/completions".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key: String::new(),
            temperature: 0.2,
            max_tokens: 500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Python interpreter used to run generated code.
    pub python: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Modules generated code may import.
    pub allowed_imports: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            timeout_secs: 20,
            output_limit_bytes: 100_000,
            allowed_imports: [
                "math",
                "statistics",
                "json",
                "re",
                "datetime",
                "collections",
                "itertools",
                "functools",
                "fractions",
                "decimal",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Answer used when no heuristic matches; `None` reports no candidate.
    pub fallback_answer: Option<String>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            secret: String::new(),
            time_budget_secs: 170,
            max_steps: 40,
            max_failures_per_url: 3,
            stagnation_threshold: 3,
            producer: ProducerKind::Generative,
            transcript_dir: None,
            submit: SubmitConfig::default(),
            fetch: FetchConfig::default(),
            llm: LlmConfig::default(),
            sandbox: SandboxConfig::default(),
            heuristic: HeuristicConfig::default(),
        }
    }
}

impl QuizConfig {
    /// Check limits and endpoints. Credentials are checked separately by
    /// [`QuizConfig::validate_credentials`].
    pub fn validate(&self) -> Result<()> {
        if self.time_budget_secs == 0 {
            return Err(anyhow!("time_budget_secs must be > 0"));
        }
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.max_failures_per_url == 0 {
            return Err(anyhow!("max_failures_per_url must be > 0"));
        }
        if self.stagnation_threshold < 2 {
            return Err(anyhow!("stagnation_threshold must be >= 2"));
        }
        if self.submit.url.trim().is_empty() {
            return Err(anyhow!("submit.url must be non-empty"));
        }
        if self.submit.retries == 0 {
            return Err(anyhow!("submit.retries must be > 0"));
        }
        if self.submit.timeout_secs == 0 || self.fetch.timeout_secs == 0 {
            return Err(anyhow!("submit/fetch timeout_secs must be > 0"));
        }
        if self.fetch.max_chars == 0 {
            return Err(anyhow!("fetch.max_chars must be > 0"));
        }
        if self.producer == ProducerKind::Generative {
            if self.llm.endpoint.trim().is_empty() || self.llm.model.trim().is_empty() {
                return Err(anyhow!("llm.endpoint and llm.model must be non-empty"));
            }
            if self.llm.timeout_secs == 0 {
                return Err(anyhow!("llm.timeout_secs must be > 0"));
            }
            if self.sandbox.python.trim().is_empty() {
                return Err(anyhow!("sandbox.python must be non-empty"));
            }
            if self.sandbox.timeout_secs == 0 || self.sandbox.output_limit_bytes == 0 {
                return Err(anyhow!(
                    "sandbox.timeout_secs and sandbox.output_limit_bytes must be > 0"
                ));
            }
        }
        Ok(())
    }

    /// Email and secret are required to serve requests or submit answers.
    pub fn validate_credentials(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(anyhow!("email is not set (QUIZ_EMAIL)"));
        }
        if self.secret.is_empty() {
            return Err(anyhow!("secret is not set (QUIZ_SECRET)"));
        }
        Ok(())
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    pub fn loop_policy(&self) -> LoopPolicy {
        LoopPolicy {
            max_steps: self.max_steps,
            max_failures_per_url: self.max_failures_per_url,
            stagnation_threshold: self.stagnation_threshold,
        }
    }

    /// Apply environment overrides. `lookup` returns the value of a variable.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(v) = get("QUIZ_EMAIL") {
            self.email = v;
        }
        if let Some(v) = get("QUIZ_SECRET") {
            self.secret = v;
        }
        if let Some(v) = get("QUIZ_SUBMIT_URL") {
            self.submit.url = v;
        }
        if let Some(v) = get("QUIZ_TIME_BUDGET_SECS") {
            self.time_budget_secs = parse_env("QUIZ_TIME_BUDGET_SECS", &v)?;
        }
        if let Some(v) = get("QUIZ_MAX_STEPS") {
            self.max_steps = parse_env("QUIZ_MAX_STEPS", &v)?;
        }
        if let Some(v) = get("QUIZ_MAX_FAILURES_PER_URL") {
            self.max_failures_per_url = parse_env("QUIZ_MAX_FAILURES_PER_URL", &v)?;
        }
        if let Some(v) = get("QUIZ_STAGNATION_THRESHOLD") {
            self.stagnation_threshold = parse_env("QUIZ_STAGNATION_THRESHOLD", &v)?;
        }
        if let Some(v) = get("QUIZ_SUBMIT_RETRIES") {
            self.submit.retries = parse_env("QUIZ_SUBMIT_RETRIES", &v)?;
        }
        if let Some(v) = get("QUIZ_SUBMIT_RETRY_DELAY_MS") {
            self.submit.retry_delay_ms = parse_env("QUIZ_SUBMIT_RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = get("QUIZ_PRODUCER") {
            self.producer = ProducerKind::parse(&v).context("parse QUIZ_PRODUCER")?;
        }
        if let Some(v) = get("AIPIPE_TOKEN") {
            self.llm.api_key = v;
        }
        if let Some(v) = get("QUIZ_LLM_URL") {
            self.llm.endpoint = v;
        }
        if let Some(v) = get("QUIZ_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("QUIZ_PYTHON") {
            self.sandbox.python = v;
        }
        if let Some(v) = get("QUIZ_TRANSCRIPT_DIR") {
            self.transcript_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Copy with secrets masked, for printing.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.secret.is_empty() {
            copy.secret = REDACTED.to_string();
        }
        if !copy.llm.api_key.is_empty() {
            copy.llm.api_key = REDACTED.to_string();
        }
        copy
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| anyhow!("invalid {key}='{raw}': {err}"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `QuizConfig::default()`.
pub fn load_config(path: &Path) -> Result<QuizConfig> {
    if !path.exists() {
        let cfg = QuizConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: QuizConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load the optional TOML file, then apply the process environment.
pub fn load_config_with_env(path: Option<&Path>) -> Result<QuizConfig> {
    let mut cfg = match path {
        Some(path) => load_config(path)?,
        None => QuizConfig::default(),
    };
    cfg.apply_env(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}
