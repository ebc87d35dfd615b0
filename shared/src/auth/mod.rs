//! # Authentication Primitives
//!
//! Crypto building blocks for the identity subsystem.
//!
//! ## Module Structure
//!
//! ```text
//! auth/
//! ├── password.rs - Secure password hashing with Argon2id
//! └── token.rs    - Opaque bearer minting and SHA-256 digesting
//! ```
//!
//! ## Overview
//!
//! | Component | Purpose | See Also |
//! |-----------|---------|----------|
//! | [`PasswordHasher`] | Argon2id password hashing | [OWASP Password Storage](https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html) |
//! | [`MintedToken`] | Fresh random bearer + its digest | session / setup / node tokens |
//! | [`hash_token`] | Digest of a presented bearer | session lookup, node exchange |
//!
//! ## Token Model
//!
//! Statix does not use signed tokens. Every secret handed to a caller
//! (session bearer, setup/reset token, node token) is an opaque random
//! string; the server stores only its SHA-256 digest and looks it up by
//! re-hashing whatever the caller presents.
//!
//! ```text
//! ┌────────┐  mint   ┌──────────────┐  store   ┌──────────────┐
//! │ server │────────►│ plaintext    │─────────►│ sha256(hex)  │
//! └────────┘         │ (seen once)  │          │ in database  │
//!                    └──────┬───────┘          └──────▲───────┘
//!                           │ presented later        │ compare
//!                           ▼                        │
//!                    ┌──────────────┐   re-hash      │
//!                    │ Authorization│────────────────┘
//!                    │ Bearer <...> │
//!                    └──────────────┘
//! ```
//!
//! Plaintext secrets are returned to the caller exactly once and never
//! persist anywhere on the server side.

pub mod password;
pub mod token;

// Re-export main types for convenient access
pub use password::PasswordHasher;
pub use token::{hash_token, mint_secret, reset_token_ttl, session_ttl, MintedToken};
