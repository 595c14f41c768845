//! Quiz-chain solver CLI.
//!
//! `solve` runs one session from a start URL and prints the session JSON;
//! the exit code reflects the stop reason (see [`quizloop::exit_codes`]).

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quizloop::agent_loop::build_agent_loop;
use quizloop::core::budget::deadline_after;
use quizloop::exit_codes;
use quizloop::io::config::{QuizConfig, load_config_with_env};
use quizloop::io::transcript_log::write_transcript;
use quizloop::logging;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "quizloop",
    version,
    about = "Solve a chain of quiz pages within a time budget"
)]
struct Cli {
    /// Optional TOML config; environment variables override its values.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one session starting at `--url` and print the result.
    Solve {
        #[arg(long)]
        url: String,
        /// Override the session time budget in seconds.
        #[arg(long)]
        budget_secs: Option<u64>,
    },
    /// Validate configuration and print it with secrets masked.
    CheckConfig,
}

fn main() {
    dotenvy::dotenv().ok();
    logging::init("warn");
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config_with_env(cli.config.as_deref())?;
    match cli.command {
        Command::Solve { url, budget_secs } => cmd_solve(config, &url, budget_secs),
        Command::CheckConfig => cmd_check_config(&config),
    }
}

fn cmd_solve(mut config: QuizConfig, url: &str, budget_secs: Option<u64>) -> Result<i32> {
    if let Some(secs) = budget_secs {
        config.time_budget_secs = secs;
        config.validate()?;
    }
    config.validate_credentials()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let session = runtime.block_on(async {
        let agent = build_agent_loop(&config)?;
        let deadline = deadline_after(Instant::now(), config.time_budget());
        info!(url, budget_secs = config.time_budget_secs, "starting session");
        anyhow::Ok(agent.run(url, deadline).await)
    })?;

    if let Some(dir) = &config.transcript_dir {
        match write_transcript(dir, &session) {
            Ok(path) => info!(path = %path.display(), "transcript written"),
            Err(err) => warn!(err = %format!("{err:#}"), "transcript write failed"),
        }
    }

    let rendered = serde_json::to_string_pretty(&session).context("serialize session")?;
    println!("{rendered}");
    Ok(exit_codes::for_stop(&session.stop))
}

fn cmd_check_config(config: &QuizConfig) -> Result<i32> {
    if let Err(err) = config.validate_credentials() {
        warn!(err = %err, "credentials incomplete");
    }
    let rendered = toml::to_string_pretty(&config.redacted()).context("render config")?;
    print!("{rendered}");
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_solve() {
        let cli = Cli::parse_from(["quizloop", "solve", "--url", "https://quiz.example/1"]);
        assert!(matches!(
            cli.command,
            Command::Solve { ref url, budget_secs: None } if url == "https://quiz.example/1"
        ));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_solve_with_config_and_budget() {
        let cli = Cli::parse_from([
            "quizloop",
            "--config",
            "quiz.toml",
            "solve",
            "--url",
            "u",
            "--budget-secs",
            "30",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("quiz.toml")));
        assert!(matches!(
            cli.command,
            Command::Solve {
                budget_secs: Some(30),
                ..
            }
        ));
    }

    #[test]
    fn parse_check_config() {
        let cli = Cli::parse_from(["quizloop", "check-config"]);
        assert!(matches!(cli.command, Command::CheckConfig));
    }

    #[test]
    fn redacted_config_renders_as_toml() {
        let config = QuizConfig {
            secret: "hunter2".to_string(),
            ..QuizConfig::default()
        };
        let rendered = toml::to_string_pretty(&config.redacted()).expect("render");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[submit]"));
    }
}
