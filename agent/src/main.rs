//! # Statix - Host Agent
//!
//! The per-host companion process of the Statix platform. Given its node
//! identity (`NODE_ID`, `NODE_TOKEN`, `API_BASE_URL`), it:
//!
//! 1. exchanges the node bearer for broker coordinates over HTTP,
//! 2. connects to the broker and publishes metrics on a timer,
//! 3. publishes the retained system inventory when it changes (or goes
//!    stale), and
//! 4. re-exchanges credentials on a cadence, reconnecting on rotation.
//!
//! ## Outer Loop
//!
//! ```text
//! while !stop {
//!     credentials = rotate_to.take() or exchange()
//!     outcome = session(credentials)        // ends on error/rotation/stop
//!     rotate_to = outcome.rotate_to
//!     sleep(reconnect_delay)
//! }
//! ```
//!
//! Every failure inside the loop is a log line and a retry; the only fatal
//! condition is missing configuration. SIGINT/SIGTERM flip the stop flag
//! and the process ends after the current session closes.

use tokio::sync::watch;
use tracing::{error, info, warn};

mod collector;
mod config;
mod exchange;
mod session;

use collector::{inventory::AgentBuildInfo, InventoryCollector, MetricsCollector};
use config::AgentConfig;
use exchange::{BrokerCredentials, ExchangeClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Logging isn't up yet; this must still reach the operator
            eprintln!("statix-agent: configuration error: {e}");
            std::process::exit(1);
        }
    };

    shared::tracing_config::init_tracing("statix-agent", config.production);

    info!(
        node_id = %config.node_id,
        api = %config.api_base_url,
        publish_interval_ms = config.publish_interval_ms,
        "Starting statix-agent"
    );

    let exchange = ExchangeClient::new(&config)?;
    let mut metrics = MetricsCollector::new();
    let inventory = InventoryCollector::new(AgentBuildInfo::load());

    let (stop_tx, mut stop_rx) = watch::channel(false);
    tokio::spawn(watch_signals(stop_tx));

    let reconnect_delay = std::time::Duration::from_millis(config.reconnect_delay_ms);
    let mut rotate_to: Option<BrokerCredentials> = None;

    while !*stop_rx.borrow() {
        // A rotation handed over by the previous session saves one round-trip
        let credentials = match rotate_to.take() {
            Some(next) => next,
            None => match exchange.exchange().await {
                Ok(credentials) => credentials,
                Err(e) => {
                    warn!(error = %e, "credential exchange failed, retrying");
                    tokio::time::sleep(reconnect_delay).await;
                    continue;
                }
            },
        };

        let outcome = session::run(
            &config,
            &credentials,
            &exchange,
            &mut metrics,
            &inventory,
            &mut stop_rx,
        )
        .await;
        rotate_to = outcome.rotate_to;

        if !*stop_rx.borrow() {
            tokio::time::sleep(reconnect_delay).await;
        }
    }

    info!("agent stopped");

    Ok(())
}

/// Flips the stop flag on SIGINT or SIGTERM.
async fn watch_signals(stop: watch::Sender<bool>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "sigterm handler installation failed");
                let _ = ctrl_c.await;
                let _ = stop.send(true);
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("shutdown signal received");
    let _ = stop.send(true);
}
