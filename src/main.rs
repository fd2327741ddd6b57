mod config;
mod reactor;
mod slack_log;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use config::Config;
use reactor::platform::ChatPlatform;
use reactor::{Reactor, SlackClient};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "producer-bot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let client = match SlackClient::new(&config.api_base, &config.slack_bot_token) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Failed to create Slack client: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("producer-bot.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file: {e}");
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(ref log_channel) = config.log_channel {
        let slack_layer = slack_log::SlackLogLayer::new(client.clone(), log_channel.clone());
        registry.with(slack_layer).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting {} v{}...", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Loaded config from {config_path}");
    info!(
        "Debug channel: {:?}, announce channel: {:?}",
        config.debug_channel, config.announce_channel
    );

    match client.own_identity().await {
        Ok(id) => info!("Bot user ID: {}", id),
        Err(e) => {
            // A token that can't auth.test will never get an RTM session either.
            error!("Failed to authenticate with Slack: {e}");
            std::process::exit(1);
        }
    }
    info!(
        "Loaded {} reaction rule(s), {} parrot trigger(s)",
        config.reactor.triggers.len(),
        config.reactor.parrot.triggers.len()
    );
    if config.reactor.parrot.triggers.is_empty() {
        warn!("No parrot triggers configured, parrot can only be nominated");
    }

    let reactor = Reactor::new(config.reactor, client.clone());
    reactor::rtm::run(client, reactor, config.reconnect_delay).await;
}
