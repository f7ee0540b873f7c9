mod api;
mod bootstrap;
mod health;
mod services;

use std::time::Duration;

use actgate_core::config::{AppConfig, LoadOptions};
use anyhow::Result;
use tower_http::trace::TraceLayer;

fn init_logging(config: &AppConfig) {
    use actgate_core::config::LogFormat::*;
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
    // Logging comes up before bootstrap so connection and migration events are visible.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let mut app = bootstrap::bootstrap_with_config(config).await?;

    let sweeper = app.sweeper.take().map(|sweeper| {
        let period = Duration::from_secs(app.config.agent.sweep_interval_secs);
        tracing::info!(
            event_name = "system.server.sweeper_started",
            period_secs = period.as_secs(),
            "expiry sweeper started"
        );
        tokio::spawn(sweeper.run(period))
    });

    let router = api::router(app.api_state())
        .merge(health::router(app.db_pool.clone(), app.notifier.clone()))
        .layer(TraceLayer::new_for_http());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        auto_approve_mode = ?app.runtime.auto_approve_mode(),
        "actgate-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "actgate-server stopping");
    if let Some(handle) = sweeper {
        handle.abort();
    }
    let drain = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(drain, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.drain_timeout",
            drain_secs = drain.as_secs(),
            "database pool did not close before the drain deadline"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
