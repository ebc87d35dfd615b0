//! # Seeding & First-Admin Bootstrap
//!
//! Runs once at server start, before the HTTP surface accepts requests:
//!
//! 1. **Seed** the reserved roles (`admin`, `user`) and the static
//!    permission codes, granting all of them to `admin` and a read-only
//!    subset to `user`. All seeding is idempotent upserts.
//! 2. **Prestart** the bootstrap state machine, enforcing the invariant
//!    *"at least one credentialed admin exists OR the instance is
//!    bootstrap-pending"*:
//!    - a credentialed admin exists → purge the shell admin row if present;
//!    - otherwise → ensure the shell admin exists with the `admin` role and
//!      an outstanding bootstrap token, and surface the token plaintext on
//!      the startup log for the operator.
//!
//! The bootstrap token is a regular reset token tagged with
//! `metadata.bootstrapToken`. The plaintext is kept in that metadata so a
//! restart can re-log it while the token is still usable; the tag is also
//! what makes the token eligible for `POST /auth/bootstrap/claim`. This is
//! the one place a secret deliberately leaves the system through the log.

use shared::auth::MintedToken;
use shared::config::BootstrapConfig;
use shared::errors::ApiError;
use tracing::info;

use crate::repository::{RoleRepository, SessionRepository, UserRepository};
use crate::service::identity_service::{ROLE_ADMIN, ROLE_USER};
use crate::service::perm;

/// Static permission codes with their seed descriptions.
const STATIC_PERMISSIONS: &[(&str, &str)] = &[
    (perm::HEALTH_READ, "Read service health"),
    (perm::NODES_READ, "List and read all nodes"),
    (perm::NODES_CREATE, "Register new nodes"),
    (perm::NODES_DELETE, "Delete nodes"),
    (perm::USERS_CREATE, "Invite users"),
    (perm::USERS_READ, "List users"),
    (perm::ROLES_ASSIGN, "Assign roles to users"),
    (perm::AUTH_ME, "Read own identity"),
];

/// Codes granted to the default `user` role.
const USER_ROLE_PERMISSIONS: &[&str] = &[perm::HEALTH_READ, perm::AUTH_ME, perm::NODES_READ];

/// Seeds roles and permissions. Safe to run on every start.
pub async fn seed(roles: &RoleRepository) -> Result<(), ApiError> {
    let admin = roles.ensure_role(ROLE_ADMIN, Some("Full platform access")).await?;
    let user = roles.ensure_role(ROLE_USER, Some("Default operator access")).await?;

    for (code, description) in STATIC_PERMISSIONS.iter().copied() {
        let permission = roles.ensure_permission(code, Some(description)).await?;
        roles.grant_permission(admin.id, permission.id).await?;

        if USER_ROLE_PERMISSIONS.contains(&code) {
            roles.grant_permission(user.id, permission.id).await?;
        }
    }

    info!("roles and permissions seeded");

    Ok(())
}

/// Enforces the bootstrap invariant on startup.
pub async fn prestart(
    users: &UserRepository,
    roles: &RoleRepository,
    sessions: &SessionRepository,
    config: &BootstrapConfig,
) -> Result<(), ApiError> {
    let shell_email = config.admin_email.as_str();

    if users.has_credentialed_admin_excluding_email(shell_email).await? {
        // Claimed instance: the shell admin has no business existing anymore
        if let Some(shell) = users.find_by_email(shell_email).await? {
            if !shell.is_credentialed() {
                users.delete_by_id(shell.id).await?;
                info!("stale shell admin purged");
            }
        }
        return Ok(());
    }

    // Pending instance: make sure the shell admin and its token exist
    let shell = match users.find_by_email(shell_email).await? {
        Some(user) => user,
        None => users.create_shell_user(shell_email, Some("Bootstrap Admin")).await?,
    };

    let admin_role = roles.ensure_role(ROLE_ADMIN, Some("Full platform access")).await?;
    roles.assign_role(shell.id, admin_role.id).await?;

    // Rotate only when no usable token exists, so restarts don't invalidate
    // a token the operator may already have copied
    let plaintext = match sessions.find_active_reset_token_by_user(shell.id).await? {
        Some(existing) => existing
            .metadata
            .as_ref()
            .and_then(|m| m.get("bootstrapToken"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        None => None,
    };

    let plaintext = match plaintext {
        Some(existing) => existing,
        None => {
            let token = MintedToken::reset();
            let metadata = serde_json::json!({ "bootstrapToken": token.plaintext });
            sessions
                .rotate_reset_token(shell.id, &token.hash, token.expires_at, Some(&metadata))
                .await?;
            token.plaintext
        }
    };

    // Operator-visible channel for the one-time claim secret
    info!("[bootstrap] token={}", plaintext);
    info!("instance is unclaimed; claim it via POST /auth/bootstrap/claim");

    Ok(())
}
