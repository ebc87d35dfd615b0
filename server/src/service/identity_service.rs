//! # Identity Service
//!
//! Core business logic for authentication and account lifecycle:
//! - Login / logout over opaque session bearers
//! - First-admin bootstrap (status + claim)
//! - Invited-user creation and setup-token completion
//! - Role and permission administration
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Secret Handling                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Passwords      Argon2id (memory-hard), verified on a blocking worker   │
//! │  Session bearer 32 random bytes, SHA-256 digest stored, 7 day TTL       │
//! │  Setup tokens   same minting, 1 hour TTL, single use (consumed_at)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Login failures are deliberately opaque: a missing account, a shell
//! account and a wrong password all yield `INVALID_CREDENTIALS` so the
//! endpoint cannot be used to enumerate users.
//!
//! ## Admin Floor
//!
//! The service never lets the instance drop below one credentialed admin.
//! Role replacement that would strip the last admin fails with 400; the
//! only state without an admin is bootstrap-pending, which the prestart
//! routine (see [`super::bootstrap`]) establishes and resolves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::auth::{hash_token, MintedToken, PasswordHasher};
use shared::errors::ApiError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{AuditAction, Permission, RoleWithPermissions, User, UserWithRoles};
use crate::repository::session_repository::ActiveSession;
use crate::repository::{
    AuditLogRepository, RoleRepository, SessionRepository, UserRepository,
};

use super::perm;

/// Reserved role names.
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

// =============================================================================
// SERVICE STRUCT
// =============================================================================

/// Identity service with business logic for authentication and accounts.
///
/// `Clone` is cheap: repositories wrap an `Arc`-based pool and the hasher
/// is shared behind an `Arc`.
#[derive(Clone)]
pub struct IdentityService {
    users: UserRepository,
    roles: RoleRepository,
    sessions: SessionRepository,
    audit: AuditLogRepository,
    hasher: Arc<PasswordHasher>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The bearer plaintext; shown to the caller exactly once
    pub bearer: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Result of creating an invited user.
#[derive(Debug, Clone)]
pub struct CreatedUser {
    pub user: User,
    /// Setup token plaintext; shown to the caller exactly once
    pub setup_token: String,
    pub setup_token_expires_at: DateTime<Utc>,
}

impl IdentityService {
    pub fn new(
        users: UserRepository,
        roles: RoleRepository,
        sessions: SessionRepository,
        audit: AuditLogRepository,
        hasher: Arc<PasswordHasher>,
    ) -> Self {
        Self { users, roles, sessions, audit, hasher }
    }

    // =========================================================================
    // LOGIN / SESSION
    // =========================================================================

    /// Authenticates an operator and opens a session.
    ///
    /// # Failure Modes
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Unknown email | `InvalidCredentials` |
    /// | Shell account (no password yet) | `InvalidCredentials` |
    /// | Wrong password | `InvalidCredentials` (failure counter bumped) |
    /// | Disabled account, correct password | `AccountDisabled` |
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<LoginOutcome, ApiError> {
        let user = self.users.find_by_email(email).await?.ok_or_else(|| {
            warn!("login attempt for unknown email");
            ApiError::InvalidCredentials
        })?;

        let Some(password_hash) = user.password_hash.clone() else {
            warn!(user_id = %user.id, "login attempt against shell account");
            return Err(ApiError::InvalidCredentials);
        };

        let valid = self.verify_password(password.to_string(), password_hash).await?;

        if !valid {
            self.users.record_login_failure(user.id).await?;
            self.record_audit(
                AuditAction::LoginFailed,
                Some(user.id),
                ip.as_deref(),
                user_agent.as_deref(),
                None,
            )
            .await;
            warn!(user_id = %user.id, "failed login attempt");
            return Err(ApiError::InvalidCredentials);
        }

        if user.is_disabled {
            return Err(ApiError::AccountDisabled);
        }

        let token = MintedToken::session();
        self.sessions
            .create_session(
                user.id,
                &token.hash,
                token.expires_at,
                ip.as_deref(),
                user_agent.as_deref(),
            )
            .await?;
        self.users.record_login_success(user.id, ip.as_deref()).await?;

        self.record_audit(
            AuditAction::LoginSuccess,
            Some(user.id),
            ip.as_deref(),
            user_agent.as_deref(),
            None,
        )
        .await;

        let roles = self.roles.user_role_names(user.id).await?;
        let permissions = self.roles.user_permission_codes(user.id).await?;

        info!(user_id = %user.id, "user logged in");

        // Re-read the user so the snapshot reflects last_login_at
        let user = self.users.find_by_id(user.id).await?.unwrap_or(user);

        Ok(LoginOutcome {
            bearer: token.plaintext,
            expires_at: token.expires_at,
            user,
            roles,
            permissions,
        })
    }

    /// Resolves a presented bearer to its active session and stamps its
    /// `last_seen_at`. This is the backing call of the request extractor.
    pub async fn authenticate(&self, bearer: &str) -> Result<ActiveSession, ApiError> {
        let session = self
            .sessions
            .find_active_by_token_hash(&hash_token(bearer))
            .await?
            .ok_or(ApiError::InvalidToken)?;

        self.sessions.touch(session.session_id).await?;

        Ok(session)
    }

    /// Revokes the session behind a bearer. Idempotent.
    pub async fn logout(&self, bearer: &str, user_id: Uuid) -> Result<(), ApiError> {
        self.sessions.revoke_by_token_hash(&hash_token(bearer)).await?;
        self.record_audit(AuditAction::Logout, Some(user_id), None, None, None).await;

        info!(user_id = %user_id, "user logged out");

        Ok(())
    }

    // =========================================================================
    // BOOTSTRAP
    // =========================================================================

    /// True while no credentialed admin exists.
    pub async fn needs_bootstrap(&self) -> Result<bool, ApiError> {
        Ok(!self.users.has_credentialed_admin().await?)
    }

    /// Converts the shell admin into a credentialed admin using the one-time
    /// bootstrap token surfaced on the startup log.
    ///
    /// # Failure Modes
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Token unknown / expired / consumed | `InvalidToken` (401) |
    /// | Token not tagged for bootstrap | `InsufficientPermissions` (403) |
    /// | Linked user already credentialed or not admin | `InsufficientPermissions` (403) |
    /// | Chosen email already registered | `Conflict` (409) |
    pub async fn claim_bootstrap(
        &self,
        token: &str,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), ApiError> {
        let auth_token = self
            .sessions
            .find_usable_reset_token(&hash_token(token))
            .await?
            .ok_or(ApiError::InvalidToken)?;

        if !auth_token.is_bootstrap() {
            return Err(ApiError::InsufficientPermissions);
        }

        let user = self
            .users
            .find_by_id(auth_token.user_id)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        // Eligible only while the shell admin is still a shell and still admin
        let roles = self.roles.user_role_names(user.id).await?;
        if user.is_credentialed() || !roles.iter().any(|r| r == ROLE_ADMIN) {
            return Err(ApiError::InsufficientPermissions);
        }

        let password_hash = self.hash_password(password.to_string()).await?;

        self.users
            .update_profile_and_password(user.id, email, display_name, &password_hash)
            .await?;

        // Idempotent; the prestart routine already granted it
        let admin_role = self.roles.ensure_role(ROLE_ADMIN, None).await?;
        self.roles.assign_role(user.id, admin_role.id).await?;

        self.sessions.consume_token(auth_token.id).await?;

        self.record_audit(AuditAction::BootstrapClaimed, Some(user.id), None, None, None)
            .await;

        info!(user_id = %user.id, "bootstrap claimed, instance now has a credentialed admin");

        Ok(())
    }

    // =========================================================================
    // USER LIFECYCLE
    // =========================================================================

    /// Creates an invited shell user with the `user` role and a single-use
    /// setup token. The token plaintext is returned exactly once.
    pub async fn create_user(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<CreatedUser, ApiError> {
        let user = self.users.create_shell_user(email, display_name).await?;

        let role = self.roles.ensure_role(ROLE_USER, None).await?;
        self.roles.assign_role(user.id, role.id).await?;

        let token = MintedToken::reset();
        self.sessions
            .create_reset_token(user.id, &token.hash, token.expires_at, None)
            .await?;

        self.record_audit(AuditAction::UserCreated, Some(user.id), None, None, None).await;

        info!(user_id = %user.id, "invited user created");

        Ok(CreatedUser {
            user,
            setup_token: token.plaintext,
            setup_token_expires_at: token.expires_at,
        })
    }

    /// Completes an invite or reset: consumes the token and stores the new
    /// password. A second call with the same token fails with 401.
    pub async fn set_password(&self, token: &str, password: &str) -> Result<(), ApiError> {
        let auth_token = self
            .sessions
            .find_usable_reset_token(&hash_token(token))
            .await?
            .ok_or(ApiError::InvalidToken)?;

        let password_hash = self.hash_password(password.to_string()).await?;

        self.users.update_password(auth_token.user_id, &password_hash).await?;
        self.sessions.consume_token(auth_token.id).await?;

        self.record_audit(AuditAction::PasswordSet, Some(auth_token.user_id), None, None, None)
            .await;

        info!(user_id = %auth_token.user_id, "password set via token");

        Ok(())
    }

    /// Replaces a user's role set (set-equality semantics).
    ///
    /// # Failure Modes
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Target user missing | `NotFound` |
    /// | Empty or unresolved role names | `BadRequest` |
    /// | Would strip the last credentialed admin | `BadRequest` |
    pub async fn replace_user_roles(
        &self,
        user_id: Uuid,
        role_names: &[String],
    ) -> Result<UserWithRoles, ApiError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: format!("user:{}", user_id) })?;

        if role_names.is_empty() {
            return Err(ApiError::BadRequest {
                message: "a user must keep at least one role".to_string(),
            });
        }

        let resolved = self.roles.find_roles_by_names(role_names).await?;
        if resolved.len() != dedup_count(role_names) {
            let known: Vec<&str> = resolved.iter().map(|r| r.name.as_str()).collect();
            let missing: Vec<&str> = role_names
                .iter()
                .map(String::as_str)
                .filter(|n| !known.contains(n))
                .collect();
            return Err(ApiError::BadRequest {
                message: format!("unknown role names: {}", missing.join(", ")),
            });
        }

        // Admin floor: stripping `admin` from the last credentialed admin
        // would leave the instance without one.
        let current = self.roles.user_role_names(user.id).await?;
        let loses_admin = current.iter().any(|r| r == ROLE_ADMIN)
            && !resolved.iter().any(|r| r.name == ROLE_ADMIN);
        if loses_admin
            && user.is_credentialed()
            && !self
                .users
                .has_credentialed_admin_excluding_email(&user.email_normalized)
                .await?
        {
            return Err(ApiError::BadRequest {
                message: "cannot remove the last credentialed admin".to_string(),
            });
        }

        let role_ids: Vec<Uuid> = resolved.iter().map(|r| r.id).collect();
        self.roles.replace_user_roles(user.id, &role_ids).await?;

        self.record_audit(
            AuditAction::RolesChanged,
            Some(user.id),
            None,
            None,
            Some(&serde_json::json!({ "roles": role_names })),
        )
        .await;

        let mut names: Vec<String> = resolved.into_iter().map(|r| r.name).collect();
        names.sort_unstable();

        Ok(UserWithRoles { user, roles: names })
    }

    // =========================================================================
    // ROLE / PERMISSION ADMINISTRATION
    // =========================================================================

    /// Creates a new role, optionally granting an initial permission set.
    pub async fn create_role(
        &self,
        name: &str,
        description: Option<&str>,
        permission_codes: &[String],
    ) -> Result<RoleWithPermissions, ApiError> {
        if self.roles.find_by_name(name).await?.is_some() {
            return Err(ApiError::Conflict { resource: format!("role:{}", name) });
        }

        let role = self.roles.ensure_role(name, description).await?;

        let mut permissions = Vec::new();
        if !permission_codes.is_empty() {
            let ids = self.resolve_permission_ids(permission_codes).await?;
            self.roles.replace_role_permissions(role.id, &ids).await?;
            permissions = permission_codes.to_vec();
            permissions.sort_unstable();
            permissions.dedup();
        }

        Ok(RoleWithPermissions { role, permissions, users_count: 0 })
    }

    /// Replaces a role's permission set (set-equality semantics).
    pub async fn replace_role_permissions(
        &self,
        role_name: &str,
        permission_codes: &[String],
    ) -> Result<RoleWithPermissions, ApiError> {
        let role = self
            .roles
            .find_by_name(role_name)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: format!("role:{}", role_name) })?;

        let ids = self.resolve_permission_ids(permission_codes).await?;
        self.roles.replace_role_permissions(role.id, &ids).await?;

        let listing = self.roles.list_roles_with_permissions().await?;
        listing
            .into_iter()
            .find(|r| r.role.id == role.id)
            .ok_or_else(|| ApiError::InternalError {
                message: "role vanished during permission update".to_string(),
            })
    }

    /// Maps permission codes to ids, lazily provisioning dynamic per-node
    /// codes (`node:read:<id>` / `node:write:<id>`) on first reference.
    ///
    /// # Errors
    ///
    /// `BadRequest` for any unknown code that is not a dynamic node code.
    async fn resolve_permission_ids(&self, codes: &[String]) -> Result<Vec<Uuid>, ApiError> {
        let known = self.roles.find_permissions_by_codes(codes).await?;
        let known_codes: Vec<&str> = known.iter().map(|p| p.code.as_str()).collect();

        let mut unknown = Vec::new();
        let mut provisioned: Vec<Permission> = Vec::new();
        for code in codes {
            if known_codes.contains(&code.as_str()) {
                continue;
            }
            if perm::is_dynamic_node_code(code) {
                provisioned.push(self.roles.ensure_permission(code, None).await?);
            } else {
                unknown.push(code.as_str());
            }
        }

        if !unknown.is_empty() {
            return Err(ApiError::BadRequest {
                message: format!("unknown permission codes: {}", unknown.join(", ")),
            });
        }

        Ok(known.iter().map(|p| p.id).chain(provisioned.iter().map(|p| p.id)).collect())
    }

    // =========================================================================
    // LISTINGS
    // =========================================================================

    pub async fn list_users(&self) -> Result<Vec<UserWithRoles>, ApiError> {
        self.users.list_with_roles().await
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleWithPermissions>, ApiError> {
        self.roles.list_roles_with_permissions().await
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, ApiError> {
        self.roles.list_permissions().await
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Argon2id hashing on the blocking pool; memory-hard work must not
    /// stall the request-serving executor.
    async fn hash_password(&self, password: String) -> Result<String, ApiError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ApiError::InternalError { message: format!("hash task failed: {}", e) })?
    }

    /// Argon2id verification on the blocking pool.
    async fn verify_password(
        &self,
        password: String,
        password_hash: String,
    ) -> Result<bool, ApiError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash))
            .await
            .map_err(|e| ApiError::InternalError { message: format!("verify task failed: {}", e) })?
    }

    /// Best-effort audit append: failures are logged, never propagated.
    async fn record_audit(
        &self,
        action: AuditAction,
        user_id: Option<Uuid>,
        ip: Option<&str>,
        user_agent: Option<&str>,
        details: Option<&serde_json::Value>,
    ) {
        if let Err(e) = self.audit.record(action, user_id, ip, user_agent, details).await {
            warn!(error = %e, action = action.as_str(), "audit append failed");
        }
    }
}

/// Number of distinct entries in a name list.
fn dedup_count(names: &[String]) -> usize {
    let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_count() {
        let names = vec!["admin".to_string(), "user".to_string(), "admin".to_string()];
        assert_eq!(dedup_count(&names), 2);
        assert_eq!(dedup_count(&[]), 0);
    }
}
