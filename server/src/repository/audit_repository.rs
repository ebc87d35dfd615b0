//! # Audit Log Repository
//!
//! Append-only trail of identity events. Writes here are best-effort from
//! the caller's point of view: the identity service logs a warning and
//! proceeds if an audit insert fails.

use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::AuditAction;

/// Repository for the append-only audit trail.
#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one audit row.
    pub async fn record(
        &self,
        action: AuditAction,
        user_id: Option<Uuid>,
        ip: Option<&str>,
        user_agent: Option<&str>,
        details: Option<&serde_json::Value>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (user_id, action, ip, user_agent, details)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(action.as_str())
        .bind(ip)
        .bind(user_agent)
        .bind(details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
