//! # Request Extractors
//!
//! [`Identity`] resolves the `Authorization: Bearer` header to the active
//! session (touching its `last_seen_at`) and exposes the permission helpers
//! handlers authorize with.
//!
//! ## Usage
//!
//! ```rust,ignore
//! async fn handler(identity: Identity) -> Result<HttpResponse, ApiError> {
//!     identity.require(perm::NODES_CREATE)?;
//!     // ...
//! }
//! ```
//!
//! Authorization is always a set-membership test on permission codes; the
//! only structured knowledge lives in the `can_read_node`/`can_write_node`
//! helpers that try the broad code first and the per-node code second.

use std::future::Future;
use std::pin::Pin;

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::User;
use crate::repository::session_repository::ActiveSession;
use crate::service::identity_service::ROLE_ADMIN;
use crate::service::perm;
use crate::AppState;

/// The authenticated caller behind a valid bearer.
#[derive(Debug, Clone)]
pub struct Identity {
    pub session: ActiveSession,
}

impl Identity {
    pub fn user(&self) -> &User {
        &self.session.user
    }

    /// Admin role short-circuits all `/auth/*` administration routes.
    pub fn is_admin(&self) -> bool {
        self.session.roles.iter().any(|r| r == ROLE_ADMIN)
    }

    /// Set-membership test on the effective permission set.
    pub fn has_permission(&self, code: &str) -> bool {
        self.session.permissions.iter().any(|c| c == code)
    }

    /// Broad read grant, or at least one per-node read grant.
    pub fn can_read_any_node(&self) -> bool {
        self.has_permission(perm::NODES_READ)
            || self.session.permissions.iter().any(|c| c.starts_with("node:read:"))
    }

    pub fn can_read_node(&self, node_id: Uuid) -> bool {
        self.has_permission(perm::NODES_READ) || self.has_permission(&perm::node_read(node_id))
    }

    pub fn can_delete_node(&self, node_id: Uuid) -> bool {
        self.has_permission(perm::NODES_DELETE) || self.has_permission(&perm::node_write(node_id))
    }

    /// Fails with 403 unless the caller holds `code`.
    pub fn require(&self, code: &str) -> Result<(), ApiError> {
        if self.has_permission(code) {
            Ok(())
        } else {
            Err(ApiError::InsufficientPermissions)
        }
    }

    /// Fails with 403 unless the caller holds the admin role.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::InsufficientPermissions)
        }
    }
}

/// Pulls the bearer plaintext out of the `Authorization` header.
pub fn bearer_from_request(req: &HttpRequest) -> Result<String, ApiError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::MissingAuth)?;

    let token = header.strip_prefix("Bearer ").ok_or(ApiError::MissingAuth)?;

    if token.is_empty() {
        return Err(ApiError::MissingAuth);
    }

    Ok(token.to_string())
}

impl FromRequest for Identity {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();

        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or_else(|| ApiError::InternalError {
                    message: "application state missing".to_string(),
                })?;

            let bearer = bearer_from_request(&req)?;
            let session = state.identity.authenticate(&bearer).await?;

            Ok(Identity { session })
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;
    use chrono::Utc;

    fn identity_with(roles: Vec<&str>, permissions: Vec<String>) -> Identity {
        Identity {
            session: ActiveSession {
                session_id: Uuid::new_v4(),
                expires_at: Utc::now(),
                user: User {
                    id: Uuid::new_v4(),
                    email: "op@example.com".into(),
                    email_normalized: "op@example.com".into(),
                    password_hash: Some("hash".into()),
                    email_verified_at: None,
                    is_disabled: false,
                    failed_login_count: 0,
                    locked_until: None,
                    last_login_at: None,
                    last_login_ip: None,
                    display_name: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
                roles: roles.into_iter().map(String::from).collect(),
                permissions,
            },
        }
    }

    #[test]
    fn test_admin_role_check() {
        assert!(identity_with(vec!["admin"], vec![]).is_admin());
        assert!(!identity_with(vec!["user"], vec![]).is_admin());
    }

    #[test]
    fn test_permission_membership() {
        let identity = identity_with(vec!["user"], vec!["nodes:read".into()]);
        assert!(identity.has_permission("nodes:read"));
        assert!(!identity.has_permission("nodes:create"));
        assert!(identity.require("nodes:read").is_ok());
        assert!(identity.require("nodes:create").is_err());
    }

    #[test]
    fn test_broad_read_covers_every_node() {
        let identity = identity_with(vec!["user"], vec!["nodes:read".into()]);
        assert!(identity.can_read_any_node());
        assert!(identity.can_read_node(Uuid::new_v4()));
    }

    #[test]
    fn test_per_node_read_is_scoped() {
        let node = Uuid::new_v4();
        let identity = identity_with(vec!["user"], vec![perm::node_read(node)]);

        assert!(identity.can_read_any_node());
        assert!(identity.can_read_node(node));
        assert!(!identity.can_read_node(Uuid::new_v4()));
    }

    #[test]
    fn test_per_node_write_allows_delete() {
        let node = Uuid::new_v4();
        let identity = identity_with(vec!["user"], vec![perm::node_write(node)]);

        assert!(identity.can_delete_node(node));
        assert!(!identity.can_delete_node(Uuid::new_v4()));
        assert!(!identity.can_read_node(node));
    }
}
