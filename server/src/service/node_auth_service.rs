//! # Node Auth Service
//!
//! Issues long-lived node credentials and exchanges them for broker
//! coordinates.
//!
//! ## Credential Flow
//!
//! ```text
//! admin                    server                      agent
//!   │  POST /nodes/create    │                           │
//!   │───────────────────────►│ mint bearer, store digest │
//!   │  { token: T }          │                           │
//!   │◄───────────────────────│                           │
//!   │       (T handed to the host out of band)           │
//!   │                        │  POST /nodes/auth/exchange│
//!   │                        │◄──────────────────────────│
//!   │                        │ sha256(T) == stored?      │
//!   │                        │  { mqtt: {host,port,...} }│
//!   │                        │──────────────────────────►│
//! ```
//!
//! The returned broker account is shared across the fleet in this version
//! and carries no expiry; agents still re-exchange on a fixed cadence so a
//! future rotation scheme slots in without an agent change.

use chrono::{DateTime, Utc};
use shared::auth::{hash_token, mint_secret};
use shared::config::MqttConfig;
use shared::errors::ApiError;
use tracing::info;
use uuid::Uuid;

use crate::domain::Node;
use crate::repository::NodeRepository;

/// Broker coordinates handed to an agent after a successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Always `None` while credentials are shared/static
    pub expires_at: Option<DateTime<Utc>>,
}

/// Service for node registration and the agent credential exchange.
#[derive(Clone)]
pub struct NodeAuthService {
    nodes: NodeRepository,
    mqtt: MqttConfig,
}

impl NodeAuthService {
    pub fn new(nodes: NodeRepository, mqtt: MqttConfig) -> Self {
        Self { nodes, mqtt }
    }

    /// Registers a node and mints its long-lived bearer.
    ///
    /// Returns the node row and the bearer plaintext; only the digest is
    /// stored, so this is the single chance to read the token.
    pub async fn create_node(&self, name: Option<&str>) -> Result<(Node, String), ApiError> {
        let (plaintext, hash) = mint_secret();
        let node = self.nodes.create(name, &hash).await?;

        info!(node_id = %node.id, "node registered");

        Ok((node, plaintext))
    }

    /// Exchanges a node's bearer for broker coordinates.
    ///
    /// Fails with 401 whether the node is unknown, has no credential, or
    /// the presented token does not match; an unauthenticated caller learns
    /// nothing about which it was.
    pub async fn exchange(
        &self,
        node_id: Uuid,
        node_token: &str,
    ) -> Result<BrokerCredentials, ApiError> {
        let node = self
            .nodes
            .find_by_id(node_id)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        let stored = node.auth_token_hash.as_deref().ok_or(ApiError::InvalidToken)?;

        if hash_token(node_token) != stored {
            return Err(ApiError::InvalidToken);
        }

        Ok(BrokerCredentials {
            host: self.mqtt.host.clone(),
            port: self.mqtt.port,
            username: self.mqtt.username.clone(),
            password: self.mqtt.password.clone(),
            expires_at: None,
        })
    }
}
