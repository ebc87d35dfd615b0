//! # Telemetry Wire Contracts
//!
//! Everything the agent and the server must agree on byte-for-byte:
//!
//! ```text
//! telemetry/
//! ├── payloads.rs  - Broker payload schemas (the parser IS the validator)
//! ├── canonical.rs - Canonical JSON + stable SHA-256 hashing
//! └── topics.rs    - Broker topic grammar
//! ```
//!
//! ## Topic / Payload Pairing
//!
//! | Topic | QoS | Retained | Payload |
//! |-------|-----|----------|---------|
//! | `statix/nodes/<nodeId>/metrics` | 1 | no | [`MetricsPayload`] |
//! | `statix/nodes/<nodeId>/system` | 1 | **yes** | [`SystemInfoPayload`] |
//!
//! The system-inventory topic is retained so new subscribers immediately see
//! each node's current inventory without waiting for the next publish.

pub mod canonical;
pub mod payloads;
pub mod topics;

pub use canonical::{canonical_json, stable_hash};
pub use payloads::{GpuInfo, MetricsPayload, PAYLOAD_VERSION, SystemInfo, SystemInfoPayload};
pub use topics::{TopicKind, TOPIC_FILTER};
