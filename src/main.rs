mod config;
mod github;
mod markdown;
mod platform;
mod relay;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::github::GithubClient;
use crate::platform::telegram::TelegramNotifier;
use crate::relay::RelayContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,devops_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // An explicit path must exist; the default one may be absent when the
    // environment carries every value.
    let explicit_path = std::env::args().nth(1).map(PathBuf::from);
    let must_exist = explicit_path.is_some();
    let config_path = explicit_path.unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path, must_exist)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Allowed user: {}", config.allowed_user_id());
    info!("  Dispatch target: {}", config.github.repo);
    info!("  Bind: {}", config.server.bind);

    let notifier = TelegramNotifier::new(&config.telegram)?;
    let dispatcher = GithubClient::new(config.github.clone());
    let ctx = Arc::new(RelayContext::new(
        config.allowed_user_id(),
        Arc::new(notifier),
        Arc::new(dispatcher),
    ));

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    server::serve(listener, ctx).await?;

    Ok(())
}
