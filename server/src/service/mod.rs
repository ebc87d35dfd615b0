//! # Service Layer
//!
//! Business logic over the repositories:
//!
//! | Service | Responsibility |
//! |---------|----------------|
//! | [`IdentityService`] | Login, sessions, bootstrap, user/role lifecycle, authorization data |
//! | [`NodeAuthService`] | Node credential minting and the agent exchange |
//! | [`ingest`] | Broker subscription, payload validation, storage commit |
//! | [`roster`] | Coalesced snapshot fan-out to dashboard sockets |
//! | [`bootstrap`] | Seeding and the first-admin prestart routine |

pub mod bootstrap;
pub mod identity_service;
pub mod ingest;
pub mod node_auth_service;
pub mod roster;

pub use identity_service::IdentityService;
pub use node_auth_service::NodeAuthService;
pub use roster::RosterHandle;

// =============================================================================
// Permission Codes
// =============================================================================

/// Static permission codes seeded at startup.
pub mod perm {
    pub const HEALTH_READ: &str = "health:read";
    pub const NODES_READ: &str = "nodes:read";
    pub const NODES_CREATE: &str = "nodes:create";
    pub const NODES_DELETE: &str = "nodes:delete";
    pub const USERS_CREATE: &str = "users:create";
    pub const USERS_READ: &str = "users:read";
    pub const ROLES_ASSIGN: &str = "roles:assign";
    pub const AUTH_ME: &str = "auth:me";

    /// Per-node read grant, provisioned lazily on first reference.
    pub fn node_read(node_id: uuid::Uuid) -> String {
        format!("node:read:{}", node_id)
    }

    /// Per-node write grant, provisioned lazily on first reference.
    pub fn node_write(node_id: uuid::Uuid) -> String {
        format!("node:write:{}", node_id)
    }

    /// True when `code` has the dynamic per-node shape
    /// (`node:read:<uuid>` / `node:write:<uuid>`).
    ///
    /// Only provisioning looks at the structure of a code; authorization
    /// checks are always plain set membership.
    pub fn is_dynamic_node_code(code: &str) -> bool {
        let suffix = code
            .strip_prefix("node:read:")
            .or_else(|| code.strip_prefix("node:write:"));

        matches!(suffix, Some(id) if uuid::Uuid::parse_str(id).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::perm;
    use uuid::Uuid;

    #[test]
    fn test_dynamic_node_codes_are_recognized() {
        let id = Uuid::new_v4();
        assert!(perm::is_dynamic_node_code(&perm::node_read(id)));
        assert!(perm::is_dynamic_node_code(&perm::node_write(id)));
    }

    #[test]
    fn test_static_and_malformed_codes_are_not_dynamic() {
        assert!(!perm::is_dynamic_node_code(perm::NODES_READ));
        assert!(!perm::is_dynamic_node_code("node:read:"));
        assert!(!perm::is_dynamic_node_code("node:read:not-a-uuid"));
        assert!(!perm::is_dynamic_node_code("node:admin:123"));
    }
}
