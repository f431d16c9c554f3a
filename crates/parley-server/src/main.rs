//! Parley relay server.

use anyhow::{Context, Result};
use clap::Parser;
use parley_config::{ServerConfig, ServerOverrides};
use parley_core::{Relay, RelayOptions};
use parley_server::{AppState, IdentityVerifier, cors_layer, router};
use parley_session::ConversationStore;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "parley-server", version, about = "Streaming chat relay for LLM providers")]
struct Cli {
    /// Address to listen on (e.g. 127.0.0.1:8000)
    #[arg(long)]
    bind: Option<String>,

    /// Directory holding stored chats
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Accept a bearer token, as TOKEN or TOKEN=USER (repeatable)
    #[arg(long = "token", value_name = "TOKEN[=USER]")]
    tokens: Vec<String>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = ServerConfig::load(ServerOverrides {
        bind: cli.bind,
        data_dir: cli.data_dir,
        auth_tokens: cli.tokens.iter().map(|t| parse_token_arg(t)).collect(),
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let http = parley_api::http_client().map_err(|e| anyhow::anyhow!("{e}"))?;
    let registry = Arc::new(config.registry(http));
    let relay = Relay::new(
        registry,
        RelayOptions {
            max_tokens: config.max_tokens,
            idle_timeout: config.upstream_idle_timeout,
        },
    );
    let store = ConversationStore::new(config.data_dir.clone())
        .await
        .with_context(|| format!("Failed to open chat store at {}", config.data_dir.display()))?;
    let identity = IdentityVerifier::new(config.auth_tokens.clone());

    let app = router(AppState::new(relay, store, identity)).layer(cors_layer(&config.allowed_origins));

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(
        models = config.models.len(),
        data_dir = %config.data_dir.display(),
        "Parley relay listening on http://{}",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

/// `TOKEN=USER`, or a bare `TOKEN` whose user id is the token itself.
fn parse_token_arg(arg: &str) -> (String, String) {
    match arg.split_once('=') {
        Some((token, user)) => (token.trim().to_string(), user.trim().to_string()),
        None => (arg.trim().to_string(), arg.trim().to_string()),
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_arg_with_user() {
        assert_eq!(
            parse_token_arg("s3cret=alice"),
            ("s3cret".to_string(), "alice".to_string())
        );
        assert_eq!(parse_token_arg("dev"), ("dev".to_string(), "dev".to_string()));
    }
}
