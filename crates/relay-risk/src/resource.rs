//! Host resource sampling.
//!
//! CPU/memory pressure feeds lower-severity operator warnings; it never
//! halts trading.

use parking_lot::Mutex;
use sysinfo::System;

/// One resource sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    /// Global CPU utilization, percent.
    pub cpu_pct: f32,
    /// Used memory as a share of total, percent.
    pub memory_pct: f32,
    /// Used memory in bytes.
    pub memory_bytes: u64,
}

/// Samples host CPU and memory via `sysinfo`.
pub struct ResourceMonitor {
    system: Mutex<System>,
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
        }
    }

    /// Take one sample. CPU figures need two refreshes to be meaningful;
    /// the first call after startup may read low.
    pub fn sample(&self) -> ResourceUsage {
        let mut sys = self.system.lock();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let total = sys.total_memory();
        let used = sys.used_memory();
        let memory_pct = if total > 0 {
            (used as f32 / total as f32) * 100.0
        } else {
            0.0
        };

        ResourceUsage {
            cpu_pct: sys.global_cpu_info().cpu_usage(),
            memory_pct,
            memory_bytes: used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_in_range() {
        let monitor = ResourceMonitor::new();
        let usage = monitor.sample();

        assert!(usage.cpu_pct >= 0.0);
        assert!(usage.memory_pct >= 0.0 && usage.memory_pct <= 100.0);
    }
}
