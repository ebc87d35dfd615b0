//! # Broker Ingest Loop
//!
//! Subscribes to the fleet topic filter and turns valid publishes into
//! storage commits.
//!
//! ## Pipeline
//!
//! ```text
//! broker ──► route by topic ──► parse JSON ──► validate schema ──► store
//!                │                  │               │                │
//!                ▼                  ▼               ▼                ▼
//!            ignore silently    warn + drop     warn + drop    roster signal
//! ```
//!
//! ## Failure Model
//!
//! Per-message failures (malformed payloads, unknown nodes, storage errors)
//! are logged and the message is dropped; the loop itself never dies on
//! them. Connection errors back off for the configured reconnect delay and
//! the client re-subscribes on the next connection ack. Messages are
//! processed serially from the single event loop, which preserves the
//! broker's per-node ordering.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use shared::config::MqttConfig;
use shared::telemetry::{self, topics, MetricsPayload, SystemInfoPayload, TopicKind};
use shared::errors::ApiError;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::repository::NodeRepository;
use crate::service::RosterHandle;

/// Runs the ingest subscription until the process exits.
pub async fn run(config: MqttConfig, nodes: NodeRepository, roster: RosterHandle) {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_credentials(&config.username, &config.password);
    options.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(options, 64);

    info!(
        host = %config.host,
        port = config.port,
        filter = telemetry::TOPIC_FILTER,
        "starting broker ingest"
    );

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // Subscriptions don't survive reconnects; re-issue on every ack
                if let Err(e) = client.subscribe(telemetry::TOPIC_FILTER, QoS::AtLeastOnce).await {
                    warn!(error = %e, "broker subscribe failed");
                } else {
                    info!("broker connected, subscription active");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_message(&nodes, &roster, &publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "broker connection error, retrying");
                tokio::time::sleep(Duration::from_secs(config.reconnect_delay_seconds)).await;
            }
        }
    }
}

/// Routes and persists one inbound message. Never returns an error; every
/// failure path is a log line and a drop.
async fn handle_message(
    nodes: &NodeRepository,
    roster: &RosterHandle,
    topic: &str,
    payload: &[u8],
) {
    // Foreign topics fall outside the grammar; drop without noise
    let Some((node_segment, kind)) = topics::parse(topic) else {
        return;
    };

    let Ok(node_id) = Uuid::parse_str(node_segment) else {
        warn!(topic, "message for malformed node id dropped");
        return;
    };

    match kind {
        TopicKind::Metrics => {
            let Some(metrics) = decode::<MetricsPayload>(topic, payload) else {
                return;
            };

            match nodes.append_metric(node_id, &metrics).await {
                Ok(()) => {
                    debug!(node_id = %node_id, "metric ingested");
                    roster.changed();
                }
                Err(ApiError::NotFound { .. }) => {
                    warn!(node_id = %node_id, "metrics for unknown node dropped");
                }
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "metric write failed, sample dropped");
                }
            }
        }
        TopicKind::System => {
            let Some(info) = decode::<SystemInfoPayload>(topic, payload) else {
                return;
            };

            match nodes.upsert_system_info(node_id, &info).await {
                Ok(changed) => {
                    debug!(node_id = %node_id, changed, "inventory ingested");
                    if changed {
                        roster.changed();
                    }
                }
                Err(ApiError::NotFound { .. }) => {
                    warn!(node_id = %node_id, "inventory for unknown node dropped");
                }
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "inventory write failed, dropped");
                }
            }
        }
    }
}

/// Parses and validates a payload; `None` means it was logged and dropped.
fn decode<T>(topic: &str, payload: &[u8]) -> Option<T>
where
    T: serde::de::DeserializeOwned + Validate,
{
    let decoded: T = match serde_json::from_slice(payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(topic, error = %e, "malformed payload dropped");
            return None;
        }
    };

    if let Err(e) = decoded.validate() {
        warn!(topic, error = %e, "invalid payload dropped");
        return None;
    }

    Some(decoded)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(decode::<MetricsPayload>("t", b"{not json").is_none());
        assert!(decode::<MetricsPayload>("t", &[0xff, 0xfe]).is_none());
    }

    #[test]
    fn test_decode_rejects_schema_violations() {
        let out_of_range = serde_json::json!({
            "v": 1, "ts": 1, "cpu": 2.5,
            "mem_used": 0, "mem_total": 1,
            "disk_used": 0, "disk_total": 1,
            "net_rx": 0, "net_tx": 0
        });
        assert!(decode::<MetricsPayload>("t", out_of_range.to_string().as_bytes()).is_none());
    }

    #[test]
    fn test_decode_accepts_valid_metrics() {
        let valid = serde_json::json!({
            "v": 1, "ts": 1_700_000_000_000i64, "cpu": 0.5,
            "mem_used": 1, "mem_total": 2,
            "disk_used": 0, "disk_total": 1,
            "net_rx": 0, "net_tx": 0
        });
        let decoded = decode::<MetricsPayload>("t", valid.to_string().as_bytes());
        assert_eq!(decoded.unwrap().cpu, 0.5);
    }
}
