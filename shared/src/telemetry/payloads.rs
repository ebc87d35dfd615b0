//! # Broker Payload Schemas
//!
//! Strict schemas for the two message kinds agents publish. Parsing and
//! validation are one step: a payload that deserializes and passes
//! `validate()` is safe to persist, anything else is dropped by the ingest
//! loop with a warning.
//!
//! ## Versioning
//!
//! Both payloads carry `"v": 1`. A future incompatible revision bumps the
//! number; the server rejects versions it does not know.
//!
//! ## Tolerance
//!
//! Unknown keys are ignored on deserialization so agents can be upgraded
//! before the server. Numeric bounds are enforced strictly: a metrics sample
//! with `cpu = 1.7` or `mem_total = 0` never reaches the database.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::validators;

/// Current payload schema version.
pub const PAYLOAD_VERSION: u32 = 1;

// =============================================================================
// METRICS
// =============================================================================

/// One periodic host-metrics sample.
///
/// Wire example:
///
/// ```json
/// {
///   "v": 1,
///   "ts": 1700000000000,
///   "cpu": 0.5,
///   "mem_used": 1073741824,
///   "mem_total": 2147483648,
///   "disk_used": 0,
///   "disk_total": 1,
///   "net_rx": 0,
///   "net_tx": 0
/// }
/// ```
///
/// `ts` is the agent's clock in epoch milliseconds. The server keeps its own
/// ingest timestamp alongside because agent clocks may skew.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct MetricsPayload {
    /// Schema version, must be 1
    #[validate(range(min = 1, max = 1))]
    pub v: u32,

    /// Sample time, epoch milliseconds (agent clock)
    #[validate(range(min = 1))]
    pub ts: i64,

    /// Normalized CPU pressure in `[0, 1]`
    #[validate(range(min = 0.0, max = 1.0))]
    pub cpu: f64,

    /// Used memory in bytes
    #[validate(range(min = 0))]
    pub mem_used: i64,

    /// Total memory in bytes, strictly positive
    #[validate(range(min = 1))]
    pub mem_total: i64,

    /// Used root-filesystem space in bytes
    #[validate(range(min = 0))]
    pub disk_used: i64,

    /// Total root-filesystem space in bytes, strictly positive
    #[validate(range(min = 1))]
    pub disk_total: i64,

    /// Cumulative received bytes (0 when the agent cannot measure)
    #[validate(range(min = 0))]
    pub net_rx: i64,

    /// Cumulative transmitted bytes (0 when the agent cannot measure)
    #[validate(range(min = 0))]
    pub net_tx: i64,
}

// =============================================================================
// SYSTEM INVENTORY
// =============================================================================

/// Slow-changing system-inventory record.
///
/// Published retained, and only when the inventory actually changed or a
/// freshness window elapsed. `hash` is the stable digest of `info` computed
/// by the agent via [`crate::telemetry::stable_hash`]; the server uses it
/// for change detection without re-canonicalizing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct SystemInfoPayload {
    /// Schema version, must be 1
    #[validate(range(min = 1, max = 1))]
    pub v: u32,

    /// Collection time, epoch milliseconds (agent clock)
    #[validate(range(min = 1))]
    pub ts: i64,

    /// Stable SHA-256 of `info` (lowercase hex)
    #[validate(custom(function = "validators::valid_hex_digest"))]
    pub hash: String,

    /// The inventory itself
    #[validate(nested)]
    pub info: SystemInfo,
}

/// Host inventory fields.
///
/// Serialized in camelCase on the wire; descriptive fields are free-form
/// strings, capacity fields carry strict bounds.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// Operating system family, e.g. `linux`
    #[validate(custom(function = "validators::not_blank"))]
    pub os_platform: String,

    /// Kernel or OS release string
    pub os_release: String,

    /// CPU architecture, e.g. `x86_64`
    pub os_arch: String,

    /// Host name as the agent sees it
    #[validate(custom(function = "validators::not_blank"))]
    pub hostname: String,

    /// Model string of the first CPU
    pub cpu_model: String,

    /// Total logical core count, strictly positive
    #[validate(range(min = 1))]
    pub cpu_cores: i64,

    /// Total memory in bytes, strictly positive
    #[validate(range(min = 1))]
    pub mem_total: i64,

    /// Agent build version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,

    /// Agent build commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_commit: Option<String>,

    /// Agent build timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_built_at: Option<String>,

    /// Detected GPUs, best effort; empty when detection is unavailable
    #[validate(nested)]
    #[serde(default)]
    pub gpus: Vec<GpuInfo>,
}

/// One detected GPU.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GpuInfo {
    /// Device name as reported by the driver or PCI database
    #[validate(custom(function = "validators::not_blank"))]
    pub name: String,

    /// Vendor classification, e.g. `nvidia`, `amd`, `intel`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Dedicated memory in bytes
    #[validate(range(min = 0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<i64>,

    /// Driver version string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_version: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn valid_metrics_json() -> serde_json::Value {
        serde_json::json!({
            "v": 1,
            "ts": 1_700_000_000_000i64,
            "cpu": 0.5,
            "mem_used": 1,
            "mem_total": 2,
            "disk_used": 0,
            "disk_total": 1,
            "net_rx": 0,
            "net_tx": 0
        })
    }

    fn valid_system_info() -> SystemInfoPayload {
        SystemInfoPayload {
            v: 1,
            ts: 1_700_000_000_000,
            hash: "a".repeat(64),
            info: SystemInfo {
                os_platform: "linux".into(),
                os_release: "6.8.0".into(),
                os_arch: "x86_64".into(),
                hostname: "edge-1".into(),
                cpu_model: "AMD EPYC 7543".into(),
                cpu_cores: 32,
                mem_total: 137_438_953_472,
                agent_version: Some("0.1.0".into()),
                agent_commit: None,
                agent_built_at: None,
                gpus: vec![],
            },
        }
    }

    #[test]
    fn test_metrics_accepts_valid_payload() {
        let payload: MetricsPayload = serde_json::from_value(valid_metrics_json()).unwrap();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.cpu, 0.5);
    }

    #[test]
    fn test_metrics_ignores_unknown_keys() {
        let mut json = valid_metrics_json();
        json["extra_field"] = serde_json::json!("ignored");
        let payload: MetricsPayload = serde_json::from_value(json).unwrap();
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_metrics_rejects_cpu_out_of_range() {
        let mut json = valid_metrics_json();
        json["cpu"] = serde_json::json!(1.7);
        let payload: MetricsPayload = serde_json::from_value(json.clone()).unwrap();
        assert!(payload.validate().is_err());

        json["cpu"] = serde_json::json!(-0.1);
        let payload: MetricsPayload = serde_json::from_value(json).unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_metrics_rejects_zero_totals() {
        let mut json = valid_metrics_json();
        json["mem_total"] = serde_json::json!(0);
        let payload: MetricsPayload = serde_json::from_value(json).unwrap();
        assert!(payload.validate().is_err());

        let mut json = valid_metrics_json();
        json["disk_total"] = serde_json::json!(0);
        let payload: MetricsPayload = serde_json::from_value(json).unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_metrics_rejects_unknown_version() {
        let mut json = valid_metrics_json();
        json["v"] = serde_json::json!(2);
        let payload: MetricsPayload = serde_json::from_value(json).unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_metrics_rejects_missing_field() {
        let mut json = valid_metrics_json();
        json.as_object_mut().unwrap().remove("mem_total");
        assert!(serde_json::from_value::<MetricsPayload>(json).is_err());
    }

    #[test]
    fn test_system_info_accepts_valid_payload() {
        assert!(valid_system_info().validate().is_ok());
    }

    #[test]
    fn test_system_info_wire_format_is_camel_case() {
        let json = serde_json::to_value(valid_system_info()).unwrap();
        let info = json.get("info").unwrap();
        assert!(info.get("osPlatform").is_some());
        assert!(info.get("cpuCores").is_some());
        assert!(info.get("memTotal").is_some());
        // snake_case must not leak onto the wire
        assert!(info.get("os_platform").is_none());
    }

    #[test]
    fn test_system_info_rejects_bad_hash() {
        let mut payload = valid_system_info();
        payload.hash = "not-a-digest".into();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_system_info_rejects_zero_cores() {
        let mut payload = valid_system_info();
        payload.info.cpu_cores = 0;
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_system_info_gpus_default_to_empty() {
        let json = serde_json::json!({
            "v": 1,
            "ts": 1,
            "hash": "b".repeat(64),
            "info": {
                "osPlatform": "linux",
                "osRelease": "",
                "osArch": "x86_64",
                "hostname": "h",
                "cpuModel": "",
                "cpuCores": 1,
                "memTotal": 1
            }
        });
        let payload: SystemInfoPayload = serde_json::from_value(json).unwrap();
        assert!(payload.info.gpus.is_empty());
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_gpu_rejects_negative_memory() {
        let mut payload = valid_system_info();
        payload.info.gpus.push(GpuInfo {
            name: "RTX 4090".into(),
            vendor: Some("nvidia".into()),
            memory_bytes: Some(-1),
            driver_version: None,
        });
        assert!(payload.validate().is_err());
    }
}
