mod bootstrap;
mod dialogflow;

use anyhow::Result;
use nowbot_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use nowbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    tracing::info!(
        event_name = "system.server.started",
        mode = ?app.config.bot.mode,
        "nowbot started"
    );

    tokio::select! {
        // The pumps only return if every subscription has closed or
        // exhausted its retries.
        _ = app.orchestrator.run() => {
            tracing::warn!(event_name = "system.server.pumps_stopped", "all event pumps stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(event_name = "system.server.stopping", "shutdown signal received");
        }
    }

    Ok(())
}
