//! # Route Configuration
//!
//! Defines URL patterns and maps them to handler functions.
//!
//! ## Route Structure
//!
//! ```text
//! /
//! ├── health                           GET    → health
//! ├── db/health                        GET    → db_health
//! │
//! ├── auth/
//! │   ├── bootstrap/status             GET    → bootstrap_status
//! │   ├── bootstrap/claim              POST   → bootstrap_claim
//! │   ├── login                        POST   → login
//! │   ├── me                           GET    → me                  (bearer)
//! │   ├── logout                       POST   → logout              (bearer)
//! │   ├── set-password                 POST   → set_password
//! │   ├── users                        GET    → list_users          (admin)
//! │   ├── users                        POST   → create_user         (admin)
//! │   ├── users/{userId}/roles         POST   → replace_user_roles  (admin)
//! │   ├── roles                        GET    → list_roles          (admin)
//! │   ├── roles                        POST   → create_role         (admin)
//! │   ├── roles/{roleName}/permissions POST   → replace_role_permissions (admin)
//! │   └── permissions                  GET    → list_permissions    (admin)
//! │
//! ├── nodes/
//! │   ├── (root)                       GET    → list_nodes          (bearer)
//! │   ├── create                       POST   → create_node         (bearer)
//! │   ├── auth/exchange                POST   → exchange_node_token
//! │   ├── {nodeId}                     DELETE → delete_node         (bearer)
//! │   ├── {nodeId}                     PATCH  → rename_node         (bearer)
//! │   └── {nodeId}/metrics             GET    → node_metrics        (bearer)
//! │
//! └── ws/nodes                         GET    → ws_nodes (WebSocket)
//! ```
//!
//! ## Authentication
//!
//! Routes marked `(bearer)` resolve the `Authorization: Bearer` header via
//! the [`Identity`](super::extractors::Identity) extractor; `(admin)`
//! additionally requires the admin role inside the handler. Everything else
//! is public by design (health probes, login, bootstrap, token redemption
//! and the agent exchange).

use actix_web::web;

use super::handlers;

/// Configures all routes for the server.
///
/// Called from `main.rs` during app initialization:
///
/// ```rust,ignore
/// App::new()
///     .configure(routes::configure)
/// ```
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // ─────────────────────────────────────────────────────────────────
        // Health Checks
        // ─────────────────────────────────────────────────────────────────
        .route("/health", web::get().to(handlers::health))
        .route("/db/health", web::get().to(handlers::db_health))
        // ─────────────────────────────────────────────────────────────────
        // Identity
        // ─────────────────────────────────────────────────────────────────
        .service(
            web::scope("/auth")
                .route("/bootstrap/status", web::get().to(handlers::bootstrap_status))
                .route("/bootstrap/claim", web::post().to(handlers::bootstrap_claim))
                .route("/login", web::post().to(handlers::login))
                .route("/me", web::get().to(handlers::me))
                .route("/logout", web::post().to(handlers::logout))
                .route("/set-password", web::post().to(handlers::set_password))
                .route("/users", web::get().to(handlers::list_users))
                .route("/users", web::post().to(handlers::create_user))
                .route("/users/{userId}/roles", web::post().to(handlers::replace_user_roles))
                .route("/roles", web::get().to(handlers::list_roles))
                .route("/roles", web::post().to(handlers::create_role))
                .route(
                    "/roles/{roleName}/permissions",
                    web::post().to(handlers::replace_role_permissions),
                )
                .route("/permissions", web::get().to(handlers::list_permissions)),
        )
        // ─────────────────────────────────────────────────────────────────
        // Nodes
        // ─────────────────────────────────────────────────────────────────
        .service(
            web::scope("/nodes")
                .route("", web::get().to(handlers::list_nodes))
                .route("/create", web::post().to(handlers::create_node))
                .route("/auth/exchange", web::post().to(handlers::exchange_node_token))
                .route("/{nodeId}", web::delete().to(handlers::delete_node))
                .route("/{nodeId}", web::patch().to(handlers::rename_node))
                .route("/{nodeId}/metrics", web::get().to(handlers::node_metrics)),
        )
        // ─────────────────────────────────────────────────────────────────
        // Dashboard WebSocket
        // ─────────────────────────────────────────────────────────────────
        .route("/ws/nodes", web::get().to(handlers::ws_nodes));
}
