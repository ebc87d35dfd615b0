//! # Statix - Shared Library
//!
//! Core shared functionality for the Statix fleet-telemetry platform.
//!
//! This crate provides the utilities, types and wire contracts that are used
//! by both the central server and the per-host agent. It follows the DRY
//! principle: anything both binaries must agree on (payload schemas, topic
//! grammar, canonical hashing, token crypto) lives here exactly once.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Binaries                             │
//! │        ┌────────────────┐   ┌────────────────┐              │
//! │        │ statix-server  │   │  statix-agent  │              │
//! │        └───────┬────────┘   └───────┬────────┘              │
//! │                └───────────┬────────┘                       │
//! │                   ┌────────▼────────┐                       │
//! │                   │  shared crate   │ ◄── You are here      │
//! │                   └─────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`config`] | Environment-based configuration | [`AppConfig`] |
//! | [`errors`] | Standardized error handling | [`ApiError`], [`ApiResult`] |
//! | [`auth`] | Password hashing, bearer-token minting | [`auth::PasswordHasher`], [`auth::MintedToken`] |
//! | [`database`] | PostgreSQL connection pool | [`database::create_pool`] |
//! | [`telemetry`] | Broker payload schemas, topics, stable hashing | [`telemetry::MetricsPayload`], [`telemetry::SystemInfoPayload`] |
//! | [`tracing_config`] | Structured logging setup | [`tracing_config::init_tracing`] |
//! | [`validation`] | Request validation helpers | Custom validators |
//!
//! ## Design Decisions
//!
//! 1. **Single source of truth**: the payload schema and the canonical JSON
//!    hash are the interoperability contract between agent and server, so
//!    both sides compile the same implementation.
//! 2. **Security first**: plaintext secrets never persist; only digests do.
//! 3. **Observable by default**: structured logging built-in.

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod telemetry;
pub mod tracing_config;
pub mod validation;

// Re-exports for convenience - import commonly used types directly from `shared`
pub use config::AppConfig;
pub use errors::{ApiError, ApiResult};
