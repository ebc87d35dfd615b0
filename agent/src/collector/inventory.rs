//! # Inventory Probe
//!
//! Collects the slow-changing system inventory and wraps it into a
//! [`SystemInfoPayload`] with its stable hash. The hash is what the
//! publish gate compares, so two collections of an unchanged host must
//! hash identically; that is guaranteed by the canonical stringification
//! in `shared::telemetry`.
//!
//! ## GPU Detection
//!
//! Best effort, in order:
//!
//! 1. `nvidia-smi --query-gpu=name,memory.total,driver_version` (CSV)
//! 2. `lspci`, classifying display controllers by vendor substring
//! 3. empty list
//!
//! Agent build metadata is read from a `version.json` next to the binary
//! when present, falling back to compile-time/environment values.

use std::process::Command;

use serde::Deserialize;
use shared::telemetry::{stable_hash, GpuInfo, SystemInfo, SystemInfoPayload, PAYLOAD_VERSION};
use sysinfo::System;
use tracing::debug;

use super::now_ms;

/// Agent build identification, surfaced in the inventory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentBuildInfo {
    pub version: Option<String>,
    pub commit: Option<String>,
    pub built_at: Option<String>,
}

impl AgentBuildInfo {
    /// Loads build info: `version.json` beside the executable, then the
    /// `AGENT_COMMIT` / `AGENT_BUILT_AT` environment, then compile time.
    pub fn load() -> Self {
        let from_file = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("version.json")))
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|contents| serde_json::from_str::<AgentBuildInfo>(&contents).ok());

        let mut info = from_file.unwrap_or_default();

        if info.version.is_none() {
            info.version = Some(env!("CARGO_PKG_VERSION").to_string());
        }
        if info.commit.is_none() {
            info.commit = std::env::var("AGENT_COMMIT").ok();
        }
        if info.built_at.is_none() {
            info.built_at = std::env::var("AGENT_BUILT_AT").ok();
        }

        info
    }
}

/// Inventory probe.
pub struct InventoryCollector {
    build: AgentBuildInfo,
}

impl InventoryCollector {
    pub fn new(build: AgentBuildInfo) -> Self {
        Self { build }
    }

    /// Collects the inventory and computes its stable hash.
    pub fn collect(&self) -> SystemInfoPayload {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let info = SystemInfo {
            os_platform: std::env::consts::OS.to_string(),
            os_release: System::os_version().unwrap_or_default(),
            os_arch: std::env::consts::ARCH.to_string(),
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            cpu_model: sys
                .cpus()
                .first()
                .map(|c| c.brand().trim().to_string())
                .unwrap_or_default(),
            cpu_cores: sys.cpus().len().max(1) as i64,
            mem_total: (sys.total_memory() as i64).max(1),
            agent_version: self.build.version.clone(),
            agent_commit: self.build.commit.clone(),
            agent_built_at: self.build.built_at.clone(),
            gpus: detect_gpus(),
        };

        let hash = stable_hash(&serde_json::to_value(&info).unwrap_or_default());

        SystemInfoPayload { v: PAYLOAD_VERSION, ts: now_ms(), hash, info }
    }
}

// =============================================================================
// GPU DETECTION
// =============================================================================

fn detect_gpus() -> Vec<GpuInfo> {
    if let Some(gpus) = nvidia_smi_gpus() {
        return gpus;
    }

    if let Some(gpus) = lspci_gpus() {
        return gpus;
    }

    debug!("no gpu detection source available");
    Vec::new()
}

fn nvidia_smi_gpus() -> Option<Vec<GpuInfo>> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=name,memory.total,driver_version",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let gpus = parse_nvidia_smi(&stdout);

    (!gpus.is_empty()).then_some(gpus)
}

/// Parses `nvidia-smi` CSV lines: `name, memory-MiB, driver`.
fn parse_nvidia_smi(stdout: &str) -> Vec<GpuInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(',').map(str::trim);
            let name = fields.next().filter(|n| !n.is_empty())?;
            let memory_mib: Option<i64> = fields.next().and_then(|m| m.parse().ok());
            let driver = fields.next().filter(|d| !d.is_empty());

            Some(GpuInfo {
                name: name.to_string(),
                vendor: Some("nvidia".to_string()),
                memory_bytes: memory_mib.map(|mib| mib * 1024 * 1024),
                driver_version: driver.map(str::to_string),
            })
        })
        .collect()
}

fn lspci_gpus() -> Option<Vec<GpuInfo>> {
    let output = Command::new("lspci").output().ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let gpus = parse_lspci(&stdout);

    (!gpus.is_empty()).then_some(gpus)
}

/// Picks display controllers out of `lspci` output and classifies the
/// vendor by substring.
fn parse_lspci(stdout: &str) -> Vec<GpuInfo> {
    stdout
        .lines()
        .filter(|line| {
            line.contains("VGA compatible controller")
                || line.contains("3D controller")
                || line.contains("Display controller")
        })
        .filter_map(|line| {
            let name = line.split_once(": ").map(|(_, rest)| rest.trim())?;

            let lower = name.to_lowercase();
            let vendor = if lower.contains("nvidia") {
                Some("nvidia")
            } else if lower.contains("amd") || lower.contains("ati") {
                Some("amd")
            } else if lower.contains("intel") {
                Some("intel")
            } else {
                None
            };

            Some(GpuInfo {
                name: name.to_string(),
                vendor: vendor.map(str::to_string),
                memory_bytes: None,
                driver_version: None,
            })
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_parse_nvidia_smi() {
        let stdout = "NVIDIA GeForce RTX 4090, 24564, 550.54.14\n\
                      NVIDIA A100-SXM4-80GB, 81920, 550.54.14\n";

        let gpus = parse_nvidia_smi(stdout);
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].name, "NVIDIA GeForce RTX 4090");
        assert_eq!(gpus[0].vendor.as_deref(), Some("nvidia"));
        assert_eq!(gpus[0].memory_bytes, Some(24_564 * 1024 * 1024));
        assert_eq!(gpus[1].driver_version.as_deref(), Some("550.54.14"));
    }

    #[test]
    fn test_parse_nvidia_smi_empty() {
        assert!(parse_nvidia_smi("").is_empty());
        assert!(parse_nvidia_smi("\n\n").is_empty());
    }

    #[test]
    fn test_parse_lspci_classifies_vendors() {
        let stdout = "\
00:02.0 VGA compatible controller: Intel Corporation AlderLake-S GT1 (rev 0c)\n\
01:00.0 3D controller: NVIDIA Corporation GA102 [GeForce RTX 3090] (rev a1)\n\
02:00.0 Ethernet controller: Intel Corporation Ethernet Connection\n\
03:00.0 VGA compatible controller: Advanced Micro Devices, Inc. [AMD/ATI] Navi 31\n";

        let gpus = parse_lspci(stdout);
        assert_eq!(gpus.len(), 3);
        assert_eq!(gpus[0].vendor.as_deref(), Some("intel"));
        assert_eq!(gpus[1].vendor.as_deref(), Some("nvidia"));
        assert_eq!(gpus[2].vendor.as_deref(), Some("amd"));
    }

    #[test]
    fn test_collected_inventory_passes_schema_and_hash_is_stable() {
        let collector = InventoryCollector::new(AgentBuildInfo {
            version: Some("0.1.0".into()),
            commit: Some("abc123".into()),
            built_at: None,
        });

        let a = collector.collect();
        assert!(a.validate().is_ok(), "live inventory must satisfy the wire schema");

        // Hash must be reproducible for an unchanged host
        let recomputed = stable_hash(&serde_json::to_value(&a.info).unwrap());
        assert_eq!(a.hash, recomputed);
    }
}
