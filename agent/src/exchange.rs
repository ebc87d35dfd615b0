//! # Credential Exchange Client
//!
//! Trades the node's long-lived bearer for broker coordinates via
//! `POST /nodes/auth/exchange`. Called once per session start and then on
//! the exchange cadence so a server-side rotation propagates within one
//! interval.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;

/// Broker coordinates as returned by the server.
///
/// `PartialEq` is the rotation detector: a session compares each exchange
/// result against the credentials it connected with and reconnects on any
/// difference.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrokerCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// `null` while the fleet uses shared static credentials
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
    node_id: &'a str,
    node_token: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    mqtt: BrokerCredentials,
}

/// HTTP client for the exchange endpoint.
pub struct ExchangeClient {
    http: reqwest::Client,
    url: String,
    node_id: String,
    node_token: String,
}

impl ExchangeClient {
    pub fn new(config: &AgentConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .context("building http client")?;

        Ok(Self {
            http,
            url: format!("{}/nodes/auth/exchange", config.api_base_url.trim_end_matches('/')),
            node_id: config.node_id.clone(),
            node_token: config.node_token.clone(),
        })
    }

    /// Performs one exchange round-trip.
    ///
    /// Network errors and non-2xx statuses surface as errors; the caller
    /// decides whether that ends a session (startup) or is just logged
    /// (periodic refresh).
    pub async fn exchange(&self) -> anyhow::Result<BrokerCredentials> {
        let response = self
            .http
            .post(&self.url)
            .json(&ExchangeRequest { node_id: &self.node_id, node_token: &self.node_token })
            .send()
            .await
            .context("exchange request failed")?
            .error_for_status()
            .context("exchange rejected")?;

        let body: ExchangeResponse = response.json().await.context("exchange response decode")?;

        Ok(body.mqtt)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_rotation_detection() {
        let current = BrokerCredentials {
            host: "broker".into(),
            port: 1883,
            username: "statix".into(),
            password: "a".into(),
            expires_at: None,
        };

        let same = current.clone();
        assert_eq!(current, same);

        let rotated = BrokerCredentials { password: "b".into(), ..current.clone() };
        assert_ne!(current, rotated);

        let moved = BrokerCredentials { port: 9001, ..current.clone() };
        assert_ne!(current, moved);
    }

    #[test]
    fn test_exchange_response_decodes_camel_case() {
        let json = r#"{
            "mqtt": {
                "host": "broker.internal",
                "port": 1883,
                "username": "statix",
                "password": "secret",
                "expiresAt": null
            }
        }"#;

        let decoded: ExchangeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.mqtt.host, "broker.internal");
        assert_eq!(decoded.mqtt.expires_at, None);
    }

    #[test]
    fn test_exchange_request_wire_shape() {
        let body = ExchangeRequest { node_id: "n1", node_token: "t1" };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["nodeId"], "n1");
        assert_eq!(json["nodeToken"], "t1");
    }
}
