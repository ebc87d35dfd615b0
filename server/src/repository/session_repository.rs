//! # Session & Auth-Token Repository
//!
//! Data access for login sessions and single-use setup/reset tokens. Both
//! are looked up exclusively by the SHA-256 digest of whatever secret the
//! caller presents; plaintext never reaches this layer.
//!
//! ## Liveness Predicates
//!
//! | Row | Active / usable iff |
//! |-----|---------------------|
//! | Session | `revoked_at IS NULL AND expires_at > NOW()` |
//! | AuthToken | `consumed_at IS NULL AND expires_at > NOW()` |
//!
//! ## Rotation
//!
//! At most one reset token per user is usable at any time: the rotate
//! operation deletes outstanding unconsumed tokens before inserting the
//! replacement, inside one transaction.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{AuthToken, AuthTokenType, Session, User};

/// The joined view behind a valid bearer: the session's user plus the
/// flattened authorization data, built by one read.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub user: User,
    /// Role names, sorted
    pub roles: Vec<String>,
    /// Union of permission codes across all roles, sorted
    pub permissions: Vec<String>,
}

/// Repository for session and auth-token operations.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    /// Persists a new session for a freshly minted bearer.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Session, ApiError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, token_hash, expires_at, ip, user_agent)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(ip)
        .bind(user_agent)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Resolves a presented bearer digest to its active session, joined with
    /// the user and the union of permission codes through their roles.
    ///
    /// Returns `None` for unknown, revoked or expired sessions.
    pub async fn find_active_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<ActiveSession>, ApiError> {
        let row = sqlx::query_as::<_, SessionUserRow>(
            r#"
            SELECT s.id AS session_id, s.expires_at AS session_expires_at, u.*
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1
              AND s.revoked_at IS NULL
              AND s.expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let roles: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(row.user.id)
        .fetch_all(&self.pool)
        .await?;

        let permissions: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT p.code
            FROM user_roles ur
            JOIN role_permissions rp ON rp.role_id = ur.role_id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = $1
            ORDER BY p.code
            "#,
        )
        .bind(row.user.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ActiveSession {
            session_id: row.session_id,
            expires_at: row.session_expires_at,
            user: row.user,
            roles,
            permissions,
        }))
    }

    /// Stamps a session's `last_seen_at`.
    pub async fn touch(&self, session_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE sessions SET last_seen_at = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Revokes the session behind a bearer digest. Idempotent: revoking an
    /// unknown or already-revoked session is not an error.
    pub async fn revoke_by_token_hash(&self, token_hash: &str) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = NOW()
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // AUTH TOKENS
    // =========================================================================

    /// Persists a single-use reset/setup token.
    pub async fn create_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<AuthToken, ApiError> {
        let token = sqlx::query_as::<_, AuthToken>(
            r#"
            INSERT INTO auth_tokens (user_id, token_type, token_hash, expires_at, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(AuthTokenType::ResetPassword.as_str())
        .bind(token_hash)
        .bind(expires_at)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    /// Deletes any outstanding unconsumed reset token for the user, then
    /// inserts the replacement. One transaction, so at most one reset token
    /// per user is ever usable.
    pub async fn rotate_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<AuthToken, ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM auth_tokens
            WHERE user_id = $1 AND token_type = $2 AND consumed_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(AuthTokenType::ResetPassword.as_str())
        .execute(&mut *tx)
        .await?;

        let token = sqlx::query_as::<_, AuthToken>(
            r#"
            INSERT INTO auth_tokens (user_id, token_type, token_hash, expires_at, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(AuthTokenType::ResetPassword.as_str())
        .bind(token_hash)
        .bind(expires_at)
        .bind(metadata)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(token)
    }

    /// Finds a reset token by digest that is still unconsumed and unexpired.
    pub async fn find_usable_reset_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<AuthToken>, ApiError> {
        let token = sqlx::query_as::<_, AuthToken>(
            r#"
            SELECT * FROM auth_tokens
            WHERE token_hash = $1
              AND token_type = $2
              AND consumed_at IS NULL
              AND expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .bind(AuthTokenType::ResetPassword.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// The user's currently usable reset token, if any.
    pub async fn find_active_reset_token_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<AuthToken>, ApiError> {
        let token = sqlx::query_as::<_, AuthToken>(
            r#"
            SELECT * FROM auth_tokens
            WHERE user_id = $1
              AND token_type = $2
              AND consumed_at IS NULL
              AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .bind(AuthTokenType::ResetPassword.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Marks a token consumed; a second use will no longer find it.
    pub async fn consume_token(&self, token_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE auth_tokens SET consumed_at = NOW() WHERE id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Row shape for the session-user join.
#[derive(sqlx::FromRow)]
struct SessionUserRow {
    session_id: Uuid,
    session_expires_at: DateTime<Utc>,
    #[sqlx(flatten)]
    user: User,
}
