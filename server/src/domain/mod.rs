//! # Domain Layer
//!
//! Persistent entities and the flattened read models the repositories
//! return. No business logic lives here; services operate on these types.

pub mod entities;

pub use entities::*;
