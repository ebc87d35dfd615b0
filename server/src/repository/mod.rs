//! # Repository Layer
//!
//! Data access for the platform. Every multi-row write that touches an
//! invariant runs inside a transaction; no in-process lock is ever held
//! across a database call.
//!
//! ## Query Patterns
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ Pattern          │ Example                                              │
//! ├──────────────────┼──────────────────────────────────────────────────────┤
//! │ Active Sessions  │ WHERE revoked_at IS NULL AND expires_at > NOW()      │
//! │ Usable Tokens    │ WHERE consumed_at IS NULL AND expires_at > NOW()     │
//! │ Returning        │ INSERT ... RETURNING * (to get generated fields)     │
//! │ Parameterized    │ Always use $1, $2 (never string interpolation)       │
//! │ Monotone touch   │ last_seen_at = GREATEST(last_seen_at, sample time)   │
//! └──────────────────┴──────────────────────────────────────────────────────┘
//! ```

pub mod audit_repository;
pub mod node_repository;
pub mod role_repository;
pub mod session_repository;
pub mod user_repository;

pub use audit_repository::AuditLogRepository;
pub use node_repository::NodeRepository;
pub use role_repository::RoleRepository;
pub use session_repository::SessionRepository;
pub use user_repository::UserRepository;
