//! # Live Roster Fan-Out
//!
//! Pushes the node-roster snapshot to every connected dashboard socket.
//!
//! ## Ownership Model
//!
//! One owner task holds both the socket map and the debounce state and
//! receives everything as messages; nothing else ever touches either. This
//! removes the race between a broadcast and a socket closing mid-send:
//!
//! ```text
//!  ws handler ──Subscribe/Unsubscribe──►┌─────────────┐
//!  ingest ─────────Changed─────────────►│ owner task  │──text──► sockets
//!  timer ──────────Flush───────────────►└─────────────┘
//! ```
//!
//! ## Coalescing
//!
//! A burst of `Changed` signals schedules exactly one `Flush` 150 ms after
//! the first signal; the snapshot is rebuilt once and sent to every open
//! socket. If the snapshot read fails the flush is skipped with a warning
//! and sockets stay connected.
//!
//! ## Protocol
//!
//! Text frames only, server to client, a single frame type:
//!
//! ```json
//! {"type": "nodes_snapshot", "nodes": [ ... ]}
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actix_ws::Session;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::errors::ApiError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::NodeWithStats;
use crate::repository::NodeRepository;

/// Delay between the first change signal and the coalesced broadcast.
const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(150);

// =============================================================================
// SNAPSHOT WIRE SHAPE
// =============================================================================

/// One roster entry as serialized to dashboards (WebSocket frames and
/// `GET /nodes` share this shape).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: String,
    pub name: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub publish_count: i64,
    pub last_publish_at: Option<DateTime<Utc>>,
    pub latest_metric: Option<MetricSnapshot>,
    pub system_info: Option<SystemInfoSnapshot>,
}

/// Latest metric sample inside a roster entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub ts: i64,
    pub created_at: DateTime<Utc>,
    pub cpu: f64,
    pub mem_used: i64,
    pub mem_total: i64,
    pub disk_used: i64,
    pub disk_total: i64,
    pub net_rx: i64,
    pub net_tx: i64,
}

/// Stored inventory inside a roster entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfoSnapshot {
    pub hash: String,
    pub reported_ts: i64,
    pub updated_at: DateTime<Utc>,
    /// The inventory object as published by the agent
    pub info: serde_json::Value,
}

impl From<NodeWithStats> for NodeSnapshot {
    fn from(stats: NodeWithStats) -> Self {
        Self {
            id: stats.node.id.to_string(),
            name: stats.node.name,
            last_seen_at: stats.node.last_seen_at,
            created_at: stats.node.created_at,
            updated_at: stats.node.updated_at,
            publish_count: stats.publish_count,
            last_publish_at: stats.last_publish_at,
            latest_metric: stats.latest_metric.map(|m| MetricSnapshot {
                ts: m.ts,
                created_at: m.created_at,
                cpu: m.cpu,
                mem_used: m.mem_used,
                mem_total: m.mem_total,
                disk_used: m.disk_used,
                disk_total: m.disk_total,
                net_rx: m.net_rx,
                net_tx: m.net_tx,
            }),
            system_info: stats.system_info.map(|si| SystemInfoSnapshot {
                hash: si.hash,
                reported_ts: si.reported_ts,
                updated_at: si.updated_at,
                // stored payload is the full publish; dashboards want `info`
                info: si.payload.get("info").cloned().unwrap_or(serde_json::Value::Null),
            }),
        }
    }
}

/// The single frame type carried on `/ws/nodes`.
#[derive(Serialize)]
struct SnapshotFrame<'a> {
    r#type: &'static str,
    nodes: &'a [NodeSnapshot],
}

/// Renders the full snapshot frame from current storage state.
pub async fn build_snapshot_frame(nodes: &NodeRepository) -> Result<String, ApiError> {
    let snapshots: Vec<NodeSnapshot> =
        nodes.list_with_stats().await?.into_iter().map(NodeSnapshot::from).collect();

    serde_json::to_string(&SnapshotFrame { r#type: "nodes_snapshot", nodes: &snapshots })
        .map_err(|e| ApiError::InternalError { message: format!("snapshot encoding: {}", e) })
}

// =============================================================================
// OWNER TASK
// =============================================================================

enum RosterMsg {
    Subscribe { id: u64, session: Session },
    Unsubscribe { id: u64 },
    Changed,
    Flush,
}

/// Cheap cloneable handle for signaling the roster owner task.
#[derive(Clone)]
pub struct RosterHandle {
    tx: mpsc::UnboundedSender<RosterMsg>,
    next_id: Arc<AtomicU64>,
}

impl RosterHandle {
    /// Registers an accepted socket; returns the id used to unsubscribe.
    pub fn subscribe(&self, session: Session) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(RosterMsg::Subscribe { id, session });
        id
    }

    /// Removes a socket after its close event.
    pub fn unsubscribe(&self, id: u64) {
        let _ = self.tx.send(RosterMsg::Unsubscribe { id });
    }

    /// Signals that committed storage state changed; broadcasts are
    /// debounced behind this call.
    pub fn changed(&self) {
        let _ = self.tx.send(RosterMsg::Changed);
    }
}

/// Spawns the roster owner task and returns its handle.
pub fn spawn(nodes: NodeRepository) -> RosterHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = RosterHandle { tx: tx.clone(), next_id: Arc::new(AtomicU64::new(1)) };

    actix_rt::spawn(run(rx, tx, nodes));

    handle
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<RosterMsg>,
    tx: mpsc::UnboundedSender<RosterMsg>,
    nodes: NodeRepository,
) {
    let mut clients: HashMap<u64, Session> = HashMap::new();
    let mut flush_pending = false;

    while let Some(msg) = rx.recv().await {
        match msg {
            RosterMsg::Subscribe { id, session } => {
                clients.insert(id, session);
                debug!(socket = id, connected = clients.len(), "dashboard socket registered");
            }
            RosterMsg::Unsubscribe { id } => {
                clients.remove(&id);
                debug!(socket = id, connected = clients.len(), "dashboard socket removed");
            }
            RosterMsg::Changed => {
                if !flush_pending {
                    flush_pending = true;
                    let tx = tx.clone();
                    actix_rt::spawn(async move {
                        tokio::time::sleep(DEBOUNCE_INTERVAL).await;
                        let _ = tx.send(RosterMsg::Flush);
                    });
                }
            }
            RosterMsg::Flush => {
                flush_pending = false;
                broadcast(&nodes, &mut clients).await;
            }
        }
    }
}

/// Rebuilds the snapshot once and sends it to every open socket, pruning
/// sockets whose send fails.
async fn broadcast(nodes: &NodeRepository, clients: &mut HashMap<u64, Session>) {
    if clients.is_empty() {
        return;
    }

    let frame = match build_snapshot_frame(nodes).await {
        Ok(frame) => frame,
        Err(e) => {
            // Sockets stay connected; the next change signal retries
            warn!(error = %e, "roster snapshot build failed; skipping broadcast");
            return;
        }
    };

    let mut dead = Vec::new();
    for (id, session) in clients.iter_mut() {
        if session.text(frame.clone()).await.is_err() {
            dead.push(*id);
        }
    }

    for id in dead {
        clients.remove(&id);
    }

    debug!(connected = clients.len(), "roster snapshot broadcast");
}
