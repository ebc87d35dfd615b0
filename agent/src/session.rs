//! # Broker Session
//!
//! One connected stretch of the agent's life. The outer loop in `main`
//! owns reconnection; a session owns exactly one broker connection and
//! ends by returning, never by retrying internally.
//!
//! ## Timers
//!
//! | Timer | Cadence | Action |
//! |-------|---------|--------|
//! | publish | 5 s (first tick immediate) | metrics sample, QoS 1 |
//! | inventory | 10 min (first tick immediate) | re-collect; publish retained iff hash changed or 24 h elapsed |
//! | exchange | 15 min (first tick skipped) | re-exchange; rotate on any credential difference |
//!
//! ## Rotation
//!
//! When a periodic exchange returns credentials that differ byte-wise from
//! the ones this session connected with, the session disconnects and hands
//! the new tuple to the outer loop via [`SessionOutcome::rotate_to`],
//! saving the next session its startup exchange.
//!
//! ## Publish Discipline
//!
//! At most one metrics publish awaits acknowledgment; a tick that fires
//! while one is pending is a no-op. Inventory publishes are rare enough to
//! skip the guard. Per-publish failures are logged and the next tick
//! retries; only connection errors end the session.

use std::time::{Duration, Instant};

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use shared::telemetry::topics;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::collector::{InventoryCollector, MetricsCollector};
use crate::config::AgentConfig;
use crate::exchange::{BrokerCredentials, ExchangeClient};

/// Broker port conventionally carrying the WebSocket listener.
const WEBSOCKET_PORT: u16 = 9001;

/// How a session ended.
#[derive(Debug, Default)]
pub struct SessionOutcome {
    /// Credentials the next session should start with (rotation detected)
    pub rotate_to: Option<BrokerCredentials>,
}

/// Runs one broker session to completion.
pub async fn run(
    config: &AgentConfig,
    credentials: &BrokerCredentials,
    exchange: &ExchangeClient,
    metrics: &mut MetricsCollector,
    inventory: &InventoryCollector,
    stop: &mut watch::Receiver<bool>,
) -> SessionOutcome {
    let (client, mut eventloop) = connect(config, credentials);

    // Connect deadline: wait for the broker's ack before starting timers
    let connected = tokio::time::timeout(
        Duration::from_millis(config.connect_timeout_ms),
        wait_for_connack(&mut eventloop),
    )
    .await
    .unwrap_or(false);

    if !connected {
        warn!(host = %credentials.host, port = credentials.port, "broker connect failed");
        return SessionOutcome::default();
    }

    info!(host = %credentials.host, port = credentials.port, "broker session established");

    let metrics_topic = topics::metrics_topic(&config.node_id);
    let system_topic = topics::system_topic(&config.node_id);

    let mut publish_tick =
        tokio::time::interval(Duration::from_millis(config.publish_interval_ms));
    let mut inventory_tick =
        tokio::time::interval(Duration::from_millis(config.system_info_check_interval_ms));
    let mut exchange_tick =
        tokio::time::interval(Duration::from_millis(config.exchange_interval_ms));
    // Intervals fire immediately; the session just exchanged, skip that one
    exchange_tick.tick().await;

    let republish_after = Duration::from_millis(config.system_info_republish_interval_ms);

    let mut metrics_inflight = false;
    let mut last_inventory_hash: Option<String> = None;
    let mut last_inventory_publish: Option<Instant> = None;

    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::PubAck(_))) => {
                    metrics_inflight = false;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "broker session error");
                    return SessionOutcome::default();
                }
            },

            _ = publish_tick.tick() => {
                if metrics_inflight {
                    // Previous sample unacknowledged; this tick is a no-op
                    debug!("metrics publish still in flight, skipping tick");
                    continue;
                }

                let payload = metrics.sample();
                match serde_json::to_vec(&payload) {
                    Ok(bytes) => {
                        match client.publish(&metrics_topic, QoS::AtLeastOnce, false, bytes).await {
                            Ok(()) => metrics_inflight = true,
                            Err(e) => warn!(error = %e, "metrics publish failed"),
                        }
                    }
                    Err(e) => warn!(error = %e, "metrics encoding failed"),
                }
            },

            _ = inventory_tick.tick() => {
                let payload = inventory.collect();

                let stale = last_inventory_publish
                    .map_or(true, |at| at.elapsed() >= republish_after);
                let changed = last_inventory_hash.as_deref() != Some(payload.hash.as_str());

                if !changed && !stale {
                    debug!("inventory unchanged and fresh, skipping publish");
                    continue;
                }

                match serde_json::to_vec(&payload) {
                    Ok(bytes) => {
                        match client.publish(&system_topic, QoS::AtLeastOnce, true, bytes).await {
                            Ok(()) => {
                                info!(hash = %payload.hash, changed, "inventory published");
                                last_inventory_hash = Some(payload.hash);
                                last_inventory_publish = Some(Instant::now());
                            }
                            Err(e) => warn!(error = %e, "inventory publish failed"),
                        }
                    }
                    Err(e) => warn!(error = %e, "inventory encoding failed"),
                }
            },

            _ = exchange_tick.tick() => {
                match exchange.exchange().await {
                    Ok(next) if next != *credentials => {
                        info!("broker credentials rotated, reconnecting");
                        let _ = client.disconnect().await;
                        return SessionOutcome { rotate_to: Some(next) };
                    }
                    Ok(_) => debug!("credentials unchanged"),
                    Err(e) => warn!(error = %e, "credential refresh failed"),
                }
            },

            _ = stop.changed() => {
                info!("stop requested, closing broker session");
                let _ = client.disconnect().await;
                return SessionOutcome::default();
            }
        }
    }
}

/// Builds the client for the credential tuple. Port 9001 selects the
/// broker's WebSocket listener, anything else is raw TCP.
fn connect(config: &AgentConfig, credentials: &BrokerCredentials) -> (AsyncClient, rumqttc::EventLoop) {
    let client_id = format!("statix-agent-{}", config.node_id);

    let mut options = if credentials.port == WEBSOCKET_PORT {
        let url = format!("ws://{}:{}/mqtt", credentials.host, credentials.port);
        let mut options = MqttOptions::new(client_id, url, credentials.port);
        options.set_transport(Transport::Ws);
        options
    } else {
        MqttOptions::new(client_id, &credentials.host, credentials.port)
    };

    options.set_credentials(&credentials.username, &credentials.password);
    options.set_keep_alive(Duration::from_secs(30));

    AsyncClient::new(options, 16)
}

/// Polls until the broker acknowledges the connection; `false` on error.
async fn wait_for_connack(eventloop: &mut rumqttc::EventLoop) -> bool {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return true,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "broker connect error");
                return false;
            }
        }
    }
}
