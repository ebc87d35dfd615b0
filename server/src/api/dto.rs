//! # Data Transfer Objects
//!
//! Request bodies (with their validation rules) and response shapes.
//! JSON is camelCase on the wire; hash and secret columns never appear in
//! any response type, with the single exception of token plaintexts that
//! are returned exactly once at mint time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use shared::validation::validators;

use crate::domain::{Metric, Permission, RoleWithPermissions, User, UserWithRoles};
use crate::repository::session_repository::ActiveSession;
use crate::service::node_auth_service::BrokerCredentials;

// =============================================================================
// REQUESTS
// =============================================================================

/// `POST /auth/login`
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// `POST /auth/bootstrap/claim`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapClaimRequest {
    #[validate(custom(function = "validators::not_blank"))]
    pub token: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8))]
    pub password: String,

    #[serde(default)]
    pub display_name: Option<String>,
}

/// `POST /auth/users`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,

    #[serde(default)]
    pub display_name: Option<String>,
}

/// `POST /auth/set-password`
#[derive(Debug, Deserialize, Validate)]
pub struct SetPasswordRequest {
    #[validate(custom(function = "validators::not_blank"))]
    pub token: String,

    #[validate(length(min = 8))]
    pub password: String,
}

/// `POST /auth/users/{userId}/roles`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceRolesRequest {
    #[validate(length(min = 1), custom(function = "valid_role_names"))]
    pub role_names: Vec<String>,
}

/// `POST /auth/roles`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    #[validate(custom(function = "validators::valid_role_name"))]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub permission_codes: Vec<String>,
}

/// `POST /auth/roles/{roleName}/permissions`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePermissionsRequest {
    pub permission_codes: Vec<String>,
}

/// `POST /nodes/create`
#[derive(Debug, Deserialize, Validate)]
pub struct CreateNodeRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// `PATCH /nodes/{nodeId}` (null clears the name)
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateNodeRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /nodes/auth/exchange`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    #[validate(custom(function = "validators::not_blank"))]
    pub node_id: String,

    #[validate(custom(function = "validators::not_blank"))]
    pub node_token: String,
}

/// Query string of `GET /nodes/{nodeId}/metrics`
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// Clamped server-side to [1, 300]; default 60
    pub limit: Option<i64>,
}

fn valid_role_names(names: &Vec<String>) -> Result<(), ValidationError> {
    for name in names {
        validators::valid_role_name(name)?;
    }
    Ok(())
}

// =============================================================================
// RESPONSES
// =============================================================================

/// `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'static str>,
}

/// Generic `{ "ok": true }` acknowledgment.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// `GET /auth/bootstrap/status`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapStatusResponse {
    pub needs_bootstrap: bool,
}

/// User snapshot, safe for clients: no hash columns.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub is_disabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub roles: Vec<String>,
    /// Sorted union of permission codes; present on login/me responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl UserDto {
    pub fn from_user(user: User, roles: Vec<String>, permissions: Option<Vec<String>>) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email,
            display_name: user.display_name,
            email_verified_at: user.email_verified_at,
            is_disabled: user.is_disabled,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
            roles,
            permissions,
        }
    }
}

impl From<UserWithRoles> for UserDto {
    fn from(value: UserWithRoles) -> Self {
        Self::from_user(value.user, value.roles, None)
    }
}

impl From<ActiveSession> for UserDto {
    fn from(session: ActiveSession) -> Self {
        Self::from_user(session.user, session.roles, Some(session.permissions))
    }
}

/// `POST /auth/login`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Session bearer plaintext; shown exactly once
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserDto,
}

/// `POST /auth/users` (201)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUserResponse {
    pub id: String,
    pub email: String,
    /// Setup token plaintext; shown exactly once
    pub setup_token: String,
    pub setup_token_expires_at: DateTime<Utc>,
}

/// Role with its permission codes and member count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDto {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub users_count: i64,
}

impl From<RoleWithPermissions> for RoleDto {
    fn from(value: RoleWithPermissions) -> Self {
        Self {
            id: value.role.id.to_string(),
            name: value.role.name,
            description: value.role.description,
            permissions: value.permissions,
            users_count: value.users_count,
        }
    }
}

/// Permission listing entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDto {
    pub id: String,
    pub code: String,
    pub description: Option<String>,
}

impl From<Permission> for PermissionDto {
    fn from(value: Permission) -> Self {
        Self { id: value.id.to_string(), code: value.code, description: value.description }
    }
}

/// One metric row in `GET /nodes/{nodeId}/metrics`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDto {
    pub id: i64,
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

impl From<Metric> for MetricDto {
    fn from(m: Metric) -> Self {
        Self {
            id: m.id,
            ts: m.ts,
            created_at: m.created_at,
            cpu: m.cpu,
            mem_used: m.mem_used,
            mem_total: m.mem_total,
            disk_used: m.disk_used,
            disk_total: m.disk_total,
            net_rx: m.net_rx,
            net_tx: m.net_tx,
        }
    }
}

/// `GET /nodes/{nodeId}/metrics`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetricsResponse {
    pub node_id: String,
    pub metrics: Vec<MetricDto>,
}

/// Bare node shape returned by `PATCH /nodes/{nodeId}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDto {
    pub id: String,
    pub name: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<crate::domain::Node> for NodeDto {
    fn from(node: crate::domain::Node) -> Self {
        Self {
            id: node.id.to_string(),
            name: node.name,
            last_seen_at: node.last_seen_at,
            created_at: node.created_at,
            updated_at: node.updated_at,
        }
    }
}

/// `POST /nodes/create` (201)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeResponse {
    pub id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Node bearer plaintext; shown exactly once
    pub token: String,
    /// Ready-to-paste agent environment file
    pub env_file: String,
}

/// Broker coordinates inside the exchange response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerCredentialsDto {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<BrokerCredentials> for BrokerCredentialsDto {
    fn from(c: BrokerCredentials) -> Self {
        Self {
            host: c.host,
            port: c.port,
            username: c.username,
            password: c.password,
            expires_at: c.expires_at,
        }
    }
}

/// `POST /nodes/auth/exchange`
#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub mqtt: BrokerCredentialsDto,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_validation() {
        let valid = LoginRequest { email: "a@a.io".into(), password: "p".into() };
        assert!(valid.validate().is_ok());

        let bad_email = LoginRequest { email: "nope".into(), password: "p".into() };
        assert!(bad_email.validate().is_err());

        let empty_password = LoginRequest { email: "a@a.io".into(), password: "".into() };
        assert!(empty_password.validate().is_err());
    }

    #[test]
    fn test_replace_roles_requires_valid_names() {
        let valid = ReplaceRolesRequest { role_names: vec!["admin".into(), "user".into()] };
        assert!(valid.validate().is_ok());

        let empty = ReplaceRolesRequest { role_names: vec![] };
        assert!(empty.validate().is_err());

        let bad_shape = ReplaceRolesRequest { role_names: vec!["Admin".into()] };
        assert!(bad_shape.validate().is_err());
    }

    #[test]
    fn test_user_dto_hides_permissions_when_absent() {
        let json = serde_json::to_value(UserDto {
            id: "u".into(),
            email: "a@a".into(),
            display_name: None,
            email_verified_at: None,
            is_disabled: false,
            last_login_at: None,
            created_at: Utc::now(),
            roles: vec!["user".into()],
            permissions: None,
        })
        .unwrap();

        assert!(json.get("permissions").is_none());
        assert!(json.get("displayName").is_some());
    }
}
