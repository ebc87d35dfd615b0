//! # Node Repository
//!
//! Data access for the node registry and its telemetry:
//! - Node CRUD (create with a fresh UUIDv7, rename, delete-with-cascade)
//! - Metric appends (atomic with the node's `last_seen_at` touch)
//! - System-inventory upserts (hash-gated)
//! - The aggregated roster view served to dashboards
//!
//! ## Atomicity
//!
//! `append_metric` and `upsert_system_info` each wrap their row write and
//! the `nodes.last_seen_at` advance in one transaction, so a node is never
//! observed with telemetry newer than its last-seen marker.
//!
//! ## Error Handling
//!
//! | Condition | Result |
//! |-----------|--------|
//! | Metric insert hits a missing node (FK) | `ApiError::NotFound` (ingest drops the sample) |
//! | Inventory upsert for a missing node | `ApiError::NotFound` |
//! | Other database failures | `ApiError::DatabaseError` (500) |

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use shared::telemetry::{MetricsPayload, SystemInfoPayload};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::domain::{Metric, Node, NodeSystemInfo, NodeWithStats};

/// Upper bound on rows returned by `list_recent_metrics`.
const MAX_RECENT_METRICS: i64 = 300;

/// Repository for node and telemetry operations.
///
/// `Clone` is cheap: `PgPool` is `Arc`-based internally.
#[derive(Debug, Clone)]
pub struct NodeRepository {
    pool: PgPool,
}

impl NodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // NODE OPERATIONS
    // =========================================================================

    /// Registers a new node with a fresh time-ordered id.
    ///
    /// `auth_token_hash` is the digest of the long-lived agent bearer; the
    /// plaintext is the caller's to show exactly once.
    pub async fn create(
        &self,
        name: Option<&str>,
        auth_token_hash: &str,
    ) -> Result<Node, ApiError> {
        let node = sqlx::query_as::<_, Node>(
            r#"
            INSERT INTO nodes (id, name, auth_token_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(auth_token_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(node)
    }

    /// Finds a node by id, including its `auth_token_hash` (for exchange).
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Node>, ApiError> {
        let node = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(node)
    }

    /// Deletes a node; metrics and inventory cascade at the schema level.
    ///
    /// Returns `true` iff a row was deleted.
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Renames a node (`None` clears the name). Returns the updated row,
    /// or `None` if the node does not exist.
    pub async fn update_name(
        &self,
        id: Uuid,
        name: Option<&str>,
    ) -> Result<Option<Node>, ApiError> {
        let node = sqlx::query_as::<_, Node>(
            r#"
            UPDATE nodes
            SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(node)
    }

    // =========================================================================
    // METRICS
    // =========================================================================

    /// Appends one metric row and advances the node's `last_seen_at` to the
    /// sample time, atomically.
    ///
    /// # Errors
    ///
    /// `ApiError::NotFound` when the node does not exist (foreign-key
    /// violation). The ingest loop treats that as drop-with-warning.
    pub async fn append_metric(
        &self,
        node_id: Uuid,
        payload: &MetricsPayload,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO metrics (
                node_id, ts, cpu, mem_used, mem_total,
                disk_used, disk_total, net_rx, net_tx
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(node_id)
        .bind(payload.ts)
        .bind(payload.cpu)
        .bind(payload.mem_used)
        .bind(payload.mem_total)
        .bind(payload.disk_used)
        .bind(payload.disk_total)
        .bind(payload.net_rx)
        .bind(payload.net_tx)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                ApiError::NotFound { resource: format!("node:{}", node_id) }
            }
            _ => ApiError::DatabaseError(e),
        })?;

        Self::touch_last_seen(&mut tx, node_id, payload.ts).await?;

        tx.commit().await?;

        Ok(())
    }

    /// Returns the most recent metrics for a node, oldest-first.
    ///
    /// `limit` is clamped to `[1, 300]` regardless of what the caller asks
    /// for. The newest N rows are selected and then reversed so charts can
    /// consume them in chronological order.
    pub async fn list_recent_metrics(
        &self,
        node_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Metric>, ApiError> {
        let limit = limit.clamp(1, MAX_RECENT_METRICS);

        let mut rows = sqlx::query_as::<_, Metric>(
            r#"
            SELECT * FROM metrics
            WHERE node_id = $1
            ORDER BY ts DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(node_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        Ok(rows)
    }

    // =========================================================================
    // SYSTEM INVENTORY
    // =========================================================================

    /// Upserts a node's inventory record, atomically with the node's
    /// `last_seen_at` advance.
    ///
    /// When the stored hash equals the payload's hash only the last-seen
    /// marker moves and `Ok(false)` is returned; the inventory row itself
    /// (including `updated_at`) stays untouched.
    ///
    /// # Errors
    ///
    /// `ApiError::NotFound` when the node does not exist.
    pub async fn upsert_system_info(
        &self,
        node_id: Uuid,
        payload: &SystemInfoPayload,
    ) -> Result<bool, ApiError> {
        let mut tx = self.pool.begin().await?;

        let touched = Self::touch_last_seen(&mut tx, node_id, payload.ts).await?;
        if !touched {
            return Err(ApiError::NotFound { resource: format!("node:{}", node_id) });
        }

        let stored_hash: Option<String> =
            sqlx::query_scalar("SELECT hash FROM node_system_info WHERE node_id = $1")
                .bind(node_id)
                .fetch_optional(&mut *tx)
                .await?;

        if stored_hash.as_deref() == Some(payload.hash.as_str()) {
            tx.commit().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO node_system_info (node_id, hash, payload, reported_ts, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (node_id) DO UPDATE
            SET hash = EXCLUDED.hash,
                payload = EXCLUDED.payload,
                reported_ts = EXCLUDED.reported_ts,
                updated_at = NOW()
            "#,
        )
        .bind(node_id)
        .bind(&payload.hash)
        .bind(serde_json::to_value(payload).map_err(|e| ApiError::InternalError {
            message: format!("inventory serialization failed: {}", e),
        })?)
        .bind(payload.ts)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }

    // =========================================================================
    // ROSTER VIEW
    // =========================================================================

    /// Lists every node with its aggregated stats, newest node first.
    ///
    /// One query builds the whole roster: per-node metric counts, the latest
    /// sample and the stored inventory. This is the snapshot source for both
    /// `GET /nodes` and the dashboard WebSocket fan-out.
    pub async fn list_with_stats(&self) -> Result<Vec<NodeWithStats>, ApiError> {
        let rows = sqlx::query_as::<_, NodeStatsRow>(
            r#"
            SELECT
                n.id, n.name, n.auth_token_hash, n.last_seen_at, n.created_at, n.updated_at,
                COALESCE(mc.publish_count, 0) AS publish_count,
                mc.last_publish_at,
                lm.id AS metric_id,
                lm.created_at AS metric_created_at,
                lm.ts AS metric_ts,
                lm.cpu, lm.mem_used, lm.mem_total,
                lm.disk_used, lm.disk_total, lm.net_rx, lm.net_tx,
                si.hash AS info_hash,
                si.payload AS info_payload,
                si.reported_ts AS info_reported_ts,
                si.updated_at AS info_updated_at
            FROM nodes n
            LEFT JOIN (
                SELECT node_id, COUNT(*) AS publish_count, MAX(created_at) AS last_publish_at
                FROM metrics
                GROUP BY node_id
            ) mc ON mc.node_id = n.id
            LEFT JOIN LATERAL (
                SELECT id, created_at, ts, cpu, mem_used, mem_total,
                       disk_used, disk_total, net_rx, net_tx
                FROM metrics
                WHERE node_id = n.id
                ORDER BY id DESC
                LIMIT 1
            ) lm ON TRUE
            LEFT JOIN node_system_info si ON si.node_id = n.id
            ORDER BY n.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(NodeStatsRow::assemble).collect())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Advances `last_seen_at` monotonically to the sample time (epoch ms).
    ///
    /// Returns `false` when the node does not exist.
    async fn touch_last_seen(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        node_id: Uuid,
        ts_ms: i64,
    ) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET last_seen_at = GREATEST(
                    COALESCE(last_seen_at, 'epoch'::timestamptz),
                    to_timestamp($2::double precision / 1000.0)
                ),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(node_id)
        .bind(ts_ms)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// ROW MAPPING
// =============================================================================

/// Flat row shape of the roster query; assembled into [`NodeWithStats`].
#[derive(FromRow)]
struct NodeStatsRow {
    id: Uuid,
    name: Option<String>,
    auth_token_hash: Option<String>,
    last_seen_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    publish_count: i64,
    last_publish_at: Option<DateTime<Utc>>,
    metric_id: Option<i64>,
    metric_created_at: Option<DateTime<Utc>>,
    metric_ts: Option<i64>,
    cpu: Option<f64>,
    mem_used: Option<i64>,
    mem_total: Option<i64>,
    disk_used: Option<i64>,
    disk_total: Option<i64>,
    net_rx: Option<i64>,
    net_tx: Option<i64>,
    info_hash: Option<String>,
    info_payload: Option<serde_json::Value>,
    info_reported_ts: Option<i64>,
    info_updated_at: Option<DateTime<Utc>>,
}

impl NodeStatsRow {
    fn assemble(self) -> NodeWithStats {
        let node = Node {
            id: self.id,
            name: self.name,
            auth_token_hash: self.auth_token_hash,
            last_seen_at: self.last_seen_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        let latest_metric = match (self.metric_id, self.metric_created_at, self.metric_ts) {
            (Some(id), Some(created_at), Some(ts)) => Some(Metric {
                id,
                node_id: node.id,
                created_at,
                ts,
                cpu: self.cpu.unwrap_or(0.0),
                mem_used: self.mem_used.unwrap_or(0),
                mem_total: self.mem_total.unwrap_or(0),
                disk_used: self.disk_used.unwrap_or(0),
                disk_total: self.disk_total.unwrap_or(0),
                net_rx: self.net_rx.unwrap_or(0),
                net_tx: self.net_tx.unwrap_or(0),
            }),
            _ => None,
        };

        let system_info = match (self.info_hash, self.info_payload, self.info_reported_ts, self.info_updated_at) {
            (Some(hash), Some(payload), Some(reported_ts), Some(updated_at)) => {
                Some(NodeSystemInfo { node_id: node.id, hash, payload, reported_ts, updated_at })
            }
            _ => None,
        };

        NodeWithStats {
            node,
            publish_count: self.publish_count,
            last_publish_at: self.last_publish_at,
            latest_metric,
            system_info,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Repository SQL requires a live database; the limit clamp is the one
    // piece of pure logic worth pinning here.

    #[test]
    fn test_recent_metrics_limit_clamp() {
        assert_eq!(0i64.clamp(1, MAX_RECENT_METRICS), 1);
        assert_eq!((-5i64).clamp(1, MAX_RECENT_METRICS), 1);
        assert_eq!(60i64.clamp(1, MAX_RECENT_METRICS), 60);
        assert_eq!(10_000i64.clamp(1, MAX_RECENT_METRICS), 300);
    }
}
