//! # Statix - Fleet Telemetry Server
//!
//! The central server of the Statix platform: it authenticates operators
//! and agents, ingests the telemetry agents publish over the message
//! broker, persists it, and pushes a live node roster to browser
//! dashboards.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        HTTP Layer (api/)                        │
//! │   routes · handlers · DTOs · Identity extractor · /ws/nodes     │
//! └─────────┬───────────────────────────────────────────────────────┘
//!           │
//! ┌─────────▼───────────────────────────────────────────────────────┐
//! │                     Service Layer (service/)                    │
//! │   IdentityService · NodeAuthService · ingest loop · roster      │
//! └─────────┬───────────────────────────────────────────────────────┘
//!           │
//! ┌─────────▼───────────────────────────────────────────────────────┐
//! │                  Repository Layer (repository/)                 │
//! │   nodes/metrics/inventory · users · roles · sessions · audit    │
//! └─────────┬───────────────────────────────────────────────────────┘
//!           │
//!           ▼
//!      PostgreSQL                         MQTT broker
//!           ▲                                  ▲
//!           └── transactional writes           └── QoS 1 subscription
//! ```
//!
//! ## Runtime Shape
//!
//! Three long-lived workers share the process:
//!
//! | Worker | Spawned by | Purpose |
//! |--------|-----------|---------|
//! | HTTP workers | actix | request handling, WebSocket accepts |
//! | Ingest loop | `actix_rt::spawn` | broker subscription → storage |
//! | Roster owner | `actix_rt::spawn` | socket set + coalesced fan-out |
//!
//! Shared state flows through [`AppState`]; the roster owner task is the
//! only holder of the dashboard socket set.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from environment variables
//! 2. Initialize structured logging/tracing
//! 3. Create the PostgreSQL pool and run migrations
//! 4. Seed roles/permissions; run the bootstrap prestart routine
//!    (this is where the one-time `[bootstrap] token=...` line is logged)
//! 5. Spawn the roster owner and the broker ingest loop
//! 6. Start the HTTP server
//!
//! ## Graceful Shutdown
//!
//! Actix-web handles SIGTERM/SIGINT: it stops accepting connections and
//! drains in-flight requests. The ingest and roster tasks end with the
//! process; QoS 1 redelivery catches anything in flight at the broker.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use shared::{auth::PasswordHasher, config::AppConfig, database, tracing_config};
use sqlx::PgPool;
use tracing::info;

mod api;
mod domain;
mod repository;
mod service;

use api::routes;
use repository::{
    AuditLogRepository, NodeRepository, RoleRepository, SessionRepository, UserRepository,
};
use service::{bootstrap, ingest, roster, IdentityService, NodeAuthService, RosterHandle};

/// Shared application state injected into all request handlers.
///
/// Wrapped in [`actix_web::web::Data`] (an `Arc`) and cloned per worker.
pub struct AppState {
    /// Authentication, sessions, bootstrap, user/role lifecycle
    pub identity: IdentityService,
    /// Node registration and the agent credential exchange
    pub node_auth: NodeAuthService,
    /// Node/telemetry reads for the roster and metrics endpoints
    pub nodes: NodeRepository,
    /// Handle to the roster fan-out owner task
    pub roster: RosterHandle,
    /// Pool handle for the database health probe
    pub db: PgPool,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ─────────────────────────────────────────────────────────────────────
    // Step 1: Configuration
    // ─────────────────────────────────────────────────────────────────────
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // ─────────────────────────────────────────────────────────────────────
    // Step 2: Structured logging
    // ─────────────────────────────────────────────────────────────────────
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = config.server.port,
        "Starting statix-server"
    );

    // ─────────────────────────────────────────────────────────────────────
    // Step 3: Database pool + migrations
    // ─────────────────────────────────────────────────────────────────────
    let db_pool = database::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // ─────────────────────────────────────────────────────────────────────
    // Step 4: Repositories, seeding, bootstrap prestart
    // ─────────────────────────────────────────────────────────────────────
    let nodes = NodeRepository::new(db_pool.clone());
    let users = UserRepository::new(db_pool.clone());
    let roles = RoleRepository::new(db_pool.clone());
    let sessions = SessionRepository::new(db_pool.clone());
    let audit = AuditLogRepository::new(db_pool.clone());

    bootstrap::seed(&roles).await.expect("Failed to seed roles and permissions");
    bootstrap::prestart(&users, &roles, &sessions, &config.bootstrap)
        .await
        .expect("Bootstrap prestart failed");

    let identity = IdentityService::new(
        users,
        roles,
        sessions,
        audit,
        Arc::new(PasswordHasher::new()),
    );
    let node_auth = NodeAuthService::new(nodes.clone(), config.mqtt.clone());

    // ─────────────────────────────────────────────────────────────────────
    // Step 5: Background workers (roster fan-out, broker ingest)
    // ─────────────────────────────────────────────────────────────────────
    let roster_handle = roster::spawn(nodes.clone());

    actix_rt::spawn(ingest::run(config.mqtt.clone(), nodes.clone(), roster_handle.clone()));

    // ─────────────────────────────────────────────────────────────────────
    // Step 6: HTTP server
    // ─────────────────────────────────────────────────────────────────────
    let app_state = web::Data::new(AppState {
        identity,
        node_auth,
        nodes,
        roster: roster_handle,
        db: db_pool,
    });

    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let workers = config.server.workers;

    info!("Server listening on {}:{}", server_host, server_port);

    let mut server = HttpServer::new(move || {
        // Dashboards are served from their own origin in development
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            // Middleware stack (first added = last executed)
            .wrap(cors)
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            // Shared state
            .app_data(app_state.clone())
            // Routes - see api/routes.rs
            .configure(routes::configure)
    });

    if workers > 0 {
        server = server.workers(workers);
    }

    server.bind((server_host, server_port))?.run().await
}
