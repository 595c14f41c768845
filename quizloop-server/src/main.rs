//! Quiz service - accepts quiz tasks over HTTP and runs one session per request.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use quizloop::agent_loop::build_agent_loop;
use quizloop::io::config::load_config_with_env;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "quizloop-server")]
#[command(about = "HTTP service that solves quiz chains")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Optional TOML config; environment variables override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quizloop=info".parse()?)
                .add_directive("quizloop_server=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = load_config_with_env(args.config.as_deref())?;
    config.validate_credentials()?;
    info!(
        producer = ?config.producer,
        budget_secs = config.time_budget_secs,
        max_steps = config.max_steps,
        "starting quizloop-server"
    );

    let runner = build_agent_loop(&config)?;
    let state = AppState::new(&config, Arc::new(runner));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::api_router().layer(cors).with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
