use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use orderflow_api::{
    config, db,
    events::{self, EventSender},
    gateway::HostedCheckoutGateway,
    rate_limiter,
    services::housekeeping,
    services::notifications::NotificationService,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config()?;

    init_tracing(&config);

    let pool = db::establish_connection_from_app_config(&config).await?;
    if config.auto_migrate {
        db::run_migrations(&pool).await?;
    }
    let pool = Arc::new(pool);

    let gateway = Arc::new(HostedCheckoutGateway::new(config.gateway.clone()));

    let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
    let event_sender = EventSender::new(event_tx);

    let notifier = Arc::new(NotificationService::new(
        config.notifications.clone(),
        Some(pool.clone()),
    ));
    tokio::spawn(events::process_events(
        event_rx,
        Some(notifier),
        Some(pool.clone()),
    ));

    let state = AppState::new(pool, config.clone(), gateway, Some(event_sender));

    // Timer-driven reconciliation; the same sweep is reachable through the
    // admin endpoint for external schedulers.
    tokio::spawn(housekeeping::run_scheduler(
        state.services.housekeeping.clone(),
        config.housekeeping.sweep_interval_secs,
    ));

    // Expired rate-limit windows are purged in the background; the same
    // limiter instance backs the HTTP layer.
    let limiter = orderflow_api::build_rate_limiter(&config);
    tokio::spawn(rate_limiter::start_cleanup_task(
        limiter.clone(),
        Duration::from_secs(config.rate_limit_window_seconds.max(60)),
    ));

    let router = orderflow_api::app_with_limiter(state, limiter);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, environment = %config.environment, "orderflow-api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(config: &config::AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
