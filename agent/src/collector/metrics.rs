//! # Metrics Probe
//!
//! Produces one [`MetricsPayload`] per publish tick.
//!
//! ## Sources
//!
//! | Field | Source chain |
//! |-------|--------------|
//! | `cpu` | 1-minute load average / logical cores, clamped to [0, 1] |
//! | `mem_*` | cgroup v2 (`memory.current`/`memory.max`) → `/proc/meminfo` → sysinfo |
//! | `disk_*` | root filesystem from the mounted disk list |
//! | `net_*` | cumulative interface counters, loopback excluded |
//!
//! The cgroup path matters in containers, where the host's `MemTotal` says
//! nothing about the limit the workload actually runs under.

use std::path::Path;

use shared::telemetry::{MetricsPayload, PAYLOAD_VERSION};
use sysinfo::{Disks, Networks, System};

use super::now_ms;

/// Stateful metrics probe; owns the sysinfo handle so repeated samples
/// refresh instead of re-enumerating.
pub struct MetricsCollector {
    sys: System,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }

    /// Takes one sample of the host.
    pub fn sample(&mut self) -> MetricsPayload {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();

        let cores = self.sys.cpus().len().max(1);
        let cpu = cpu_fraction(System::load_average().one, cores);

        let (mem_used, mem_total) = self.memory();
        let (disk_used, disk_total) = root_disk();
        let (net_rx, net_tx) = network_totals();

        MetricsPayload {
            v: PAYLOAD_VERSION,
            ts: now_ms(),
            cpu,
            mem_used,
            mem_total,
            disk_used,
            disk_total,
            net_rx,
            net_tx,
        }
    }

    /// Memory via cgroup v2, `/proc/meminfo`, then sysinfo.
    fn memory(&self) -> (i64, i64) {
        if let Some(pair) = cgroup_memory("/sys/fs/cgroup") {
            return pair;
        }

        if let Ok(contents) = std::fs::read_to_string("/proc/meminfo") {
            if let Some((total, available)) = parse_meminfo(&contents) {
                return ((total - available).max(0), total.max(1));
            }
        }

        let total = self.sys.total_memory() as i64;
        let available = self.sys.available_memory() as i64;
        ((total - available).max(0), total.max(1))
    }
}

/// Normalized CPU pressure: 1-minute load per logical core, clamped.
fn cpu_fraction(load_one: f64, cores: usize) -> f64 {
    if !load_one.is_finite() || load_one < 0.0 {
        return 0.0;
    }
    (load_one / cores.max(1) as f64).clamp(0.0, 1.0)
}

/// Reads cgroup v2 memory accounting; `None` outside a limited cgroup.
fn cgroup_memory(base: &str) -> Option<(i64, i64)> {
    let current = std::fs::read_to_string(Path::new(base).join("memory.current")).ok()?;
    let max = std::fs::read_to_string(Path::new(base).join("memory.max")).ok()?;

    let used: i64 = current.trim().parse().ok()?;
    // "max" means unlimited; fall through to the host-wide sources
    let total: i64 = max.trim().parse().ok()?;

    if total <= 0 {
        return None;
    }

    Some((used.max(0), total))
}

/// Parses `MemTotal` and `MemAvailable` (kB) out of `/proc/meminfo`.
fn parse_meminfo(contents: &str) -> Option<(i64, i64)> {
    let mut total = None;
    let mut available = None;

    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_meminfo_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_meminfo_kb(rest);
        }
    }

    Some((total? * 1024, available? * 1024))
}

fn parse_meminfo_kb(rest: &str) -> Option<i64> {
    rest.trim().trim_end_matches("kB").trim().parse().ok()
}

/// Used/total space of the filesystem mounted at `/`.
fn root_disk() -> (i64, i64) {
    let disks = Disks::new_with_refreshed_list();

    let root = disks
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.iter().next());

    match root {
        Some(disk) => {
            let total = disk.total_space() as i64;
            let used = total - disk.available_space() as i64;
            (used.max(0), total.max(1))
        }
        None => (0, 1),
    }
}

/// Cumulative rx/tx across physical interfaces. Zeroes are valid per the
/// payload schema, so a host without readable counters still publishes.
fn network_totals() -> (i64, i64) {
    let networks = Networks::new_with_refreshed_list();

    let mut rx: i64 = 0;
    let mut tx: i64 = 0;
    for (name, data) in networks.iter() {
        if name == "lo" {
            continue;
        }
        rx = rx.saturating_add(data.total_received() as i64);
        tx = tx.saturating_add(data.total_transmitted() as i64);
    }

    (rx, tx)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_cpu_fraction_clamps() {
        assert_eq!(cpu_fraction(0.0, 4), 0.0);
        assert_eq!(cpu_fraction(2.0, 4), 0.5);
        assert_eq!(cpu_fraction(16.0, 4), 1.0);
        assert_eq!(cpu_fraction(-1.0, 4), 0.0);
        assert_eq!(cpu_fraction(f64::NAN, 4), 0.0);
    }

    #[test]
    fn test_cpu_fraction_zero_cores_does_not_divide_by_zero() {
        assert_eq!(cpu_fraction(1.0, 0), 1.0);
    }

    #[test]
    fn test_parse_meminfo() {
        let contents = "MemTotal:       16262720 kB\n\
                        MemFree:          520140 kB\n\
                        MemAvailable:    8325520 kB\n\
                        Buffers:          517172 kB\n";

        let (total, available) = parse_meminfo(contents).unwrap();
        assert_eq!(total, 16_262_720 * 1024);
        assert_eq!(available, 8_325_520 * 1024);
    }

    #[test]
    fn test_parse_meminfo_missing_fields() {
        assert!(parse_meminfo("MemTotal: 1 kB\n").is_none());
        assert!(parse_meminfo("").is_none());
    }

    #[test]
    fn test_sample_passes_schema() {
        let mut collector = MetricsCollector::new();
        let payload = collector.sample();

        assert!(payload.validate().is_ok(), "live sample must satisfy the wire schema");
        assert!(payload.cpu >= 0.0 && payload.cpu <= 1.0);
        assert!(payload.mem_total >= 1);
        assert!(payload.disk_total >= 1);
    }
}
