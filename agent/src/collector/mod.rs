//! # Host Probes
//!
//! Best-effort collection of the numbers the agent publishes:
//!
//! ```text
//! collector/
//! ├── metrics.rs   - cpu/memory/disk/network sample (5 s cadence)
//! └── inventory.rs - slow-changing system inventory (+ GPU detection)
//! ```
//!
//! Everything here degrades gracefully: a probe that cannot read its source
//! reports a zero (metrics) or an empty/`unknown` field (inventory) rather
//! than failing the publish.

pub mod inventory;
pub mod metrics;

pub use inventory::InventoryCollector;
pub use metrics::MetricsCollector;

/// Current wall clock in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
