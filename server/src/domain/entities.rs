//! # Domain Entities
//!
//! This module defines the persistent business objects of the platform.
//! Entities map directly to database tables; the `*With*` types are the
//! flattened views built by a single join at read time.
//!
//! ## Entity Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Identity                                      │
//! │                                                                         │
//! │   User ──< UserRole >── Role ──< RolePermission >── Permission          │
//! │    │                                                                    │
//! │    ├──< Session      (opaque bearer, hashed)                            │
//! │    └──< AuthToken    (single-use setup/reset, hashed)                   │
//! │                                                                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                           Telemetry                                     │
//! │                                                                         │
//! │   Node ──< Metric          (append-only time series)                    │
//! │    └──── NodeSystemInfo    (1:1, upserted on change)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! - **Never expose hash columns**: `password_hash`, `token_hash` and
//!   `auth_token_hash` stay inside the repository/service layers; API
//!   responses are built from the DTO module.
//! - **No plaintext secrets**: every secret column holds a digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// USERS
// =============================================================================

/// Complete user entity as stored in the database.
///
/// A user with `password_hash = NULL` is a *shell* account: created by an
/// admin (or the bootstrap routine) and awaiting completion through a
/// single-use setup token.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    /// Primary key (UUID v4)
    pub id: Uuid,
    /// Email address as entered
    pub email: String,
    /// Lowercased, trimmed copy of `email`; unique login key
    pub email_normalized: String,
    /// Argon2id hash in PHC format; NULL for shell accounts
    pub password_hash: Option<String>,
    /// When the address was verified (set on setup completion)
    pub email_verified_at: Option<DateTime<Utc>>,
    /// Administratively disabled accounts cannot log in
    pub is_disabled: bool,
    /// Consecutive failed logins since the last success
    pub failed_login_count: i32,
    /// Lockout horizon (reserved; cleared on successful setup)
    pub locked_until: Option<DateTime<Utc>>,
    /// Timestamp of last successful login
    pub last_login_at: Option<DateTime<Utc>>,
    /// Peer address of the last successful login
    pub last_login_ip: Option<String>,
    /// Optional display name
    pub display_name: Option<String>,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A credentialed user has completed setup and can authenticate.
    pub fn is_credentialed(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// User joined with its role names, for admin listings.
#[derive(Debug, Clone)]
pub struct UserWithRoles {
    pub user: User,
    pub roles: Vec<String>,
}

// =============================================================================
// ROLES & PERMISSIONS
// =============================================================================

/// Named set of permissions. `admin` and `user` are reserved seeds.
#[derive(Debug, Clone, FromRow)]
pub struct Role {
    pub id: Uuid,
    /// Lowercase identifier, e.g. `admin`, `node-operators`
    pub name: String,
    pub description: Option<String>,
}

/// Opaque capability code, e.g. `nodes:read` or the per-node dynamic
/// `node:read:<id>`. Authorization is always a set-membership test on these
/// codes; nothing parses them at check time.
#[derive(Debug, Clone, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
}

/// Role joined with its permission codes and member count.
#[derive(Debug, Clone)]
pub struct RoleWithPermissions {
    pub role: Role,
    pub permissions: Vec<String>,
    pub users_count: i64,
}

// =============================================================================
// SESSIONS & AUTH TOKENS
// =============================================================================

/// One login session. Active iff `revoked_at IS NULL AND expires_at > now`.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 digest of the bearer; the plaintext never persists
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Single-use token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTokenType {
    VerifyEmail,
    ResetPassword,
    ChangeEmail,
}

impl AuthTokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerifyEmail => "VERIFY_EMAIL",
            Self::ResetPassword => "RESET_PASSWORD",
            Self::ChangeEmail => "CHANGE_EMAIL",
        }
    }
}

/// Single-use setup/reset token. The first-admin bootstrap token is a
/// regular reset token distinguished by its `metadata`.
#[derive(Debug, Clone, FromRow)]
pub struct AuthToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_type: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

impl AuthToken {
    /// True when the token carries the bootstrap tag.
    pub fn is_bootstrap(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("bootstrapToken"))
            .is_some()
    }
}

/// Enumerated audit trail actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    LoginSuccess,
    LoginFailed,
    Logout,
    BootstrapClaimed,
    UserCreated,
    PasswordSet,
    RolesChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::Logout => "LOGOUT",
            Self::BootstrapClaimed => "BOOTSTRAP_CLAIMED",
            Self::UserCreated => "USER_CREATED",
            Self::PasswordSet => "PASSWORD_SET",
            Self::RolesChanged => "ROLES_CHANGED",
        }
    }
}

// =============================================================================
// NODES & TELEMETRY
// =============================================================================

/// One monitored host running the agent.
#[derive(Debug, Clone, FromRow)]
pub struct Node {
    /// UUIDv7: time-ordered, lexicographically sortable
    pub id: Uuid,
    pub name: Option<String>,
    /// Digest of the long-lived agent bearer; NULL disables exchange
    pub auth_token_hash: Option<String>,
    /// Advanced on every successful ingest for this node
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One metrics sample row (append-only).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Metric {
    pub id: i64,
    pub node_id: Uuid,
    /// Server ingest time
    pub created_at: DateTime<Utc>,
    /// Agent sample time (epoch ms)
    pub ts: i64,
    pub cpu: f64,
    pub mem_used: i64,
    pub mem_total: i64,
    pub disk_used: i64,
    pub disk_total: i64,
    pub net_rx: i64,
    pub net_tx: i64,
}

/// Stored inventory record (1:1 with node).
#[derive(Debug, Clone, FromRow)]
pub struct NodeSystemInfo {
    pub node_id: Uuid,
    /// Agent-computed stable digest of the inventory
    pub hash: String,
    /// Full inventory payload as published
    pub payload: serde_json::Value,
    /// Agent collection time (epoch ms)
    pub reported_ts: i64,
    pub updated_at: DateTime<Utc>,
}

/// Flattened roster row: node identity plus aggregated telemetry, as served
/// to dashboards. Built by a single query in the node repository.
#[derive(Debug, Clone)]
pub struct NodeWithStats {
    pub node: Node,
    /// Total number of metric rows for this node
    pub publish_count: i64,
    /// Ingest time of the newest metric
    pub last_publish_at: Option<DateTime<Utc>>,
    /// Newest metric sample, if any
    pub latest_metric: Option<Metric>,
    /// Stored inventory, if any
    pub system_info: Option<NodeSystemInfo>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_names() {
        assert_eq!(AuditAction::LoginSuccess.as_str(), "LOGIN_SUCCESS");
        assert_eq!(AuditAction::RolesChanged.as_str(), "ROLES_CHANGED");
    }

    #[test]
    fn test_auth_token_type_names() {
        assert_eq!(AuthTokenType::ResetPassword.as_str(), "RESET_PASSWORD");
        assert_eq!(AuthTokenType::VerifyEmail.as_str(), "VERIFY_EMAIL");
    }

    #[test]
    fn test_bootstrap_tag_detection() {
        let token = AuthToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_type: "RESET_PASSWORD".into(),
            token_hash: "h".into(),
            expires_at: Utc::now(),
            consumed_at: None,
            metadata: Some(serde_json::json!({"bootstrapToken": "secret"})),
        };
        assert!(token.is_bootstrap());

        let plain = AuthToken { metadata: None, ..token.clone() };
        assert!(!plain.is_bootstrap());

        let other = AuthToken {
            metadata: Some(serde_json::json!({"reason": "invite"})),
            ..token
        };
        assert!(!other.is_bootstrap());
    }
}
