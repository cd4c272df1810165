//! Host capability detection and process memory sampling.
//!
//! Linux reads `/proc`; other platforms report what `std` can tell us and
//! leave the rest unknown.

use std::thread;

use serde::{Deserialize, Serialize};

use crate::models::estimation::PerformanceTier;

const GIB: u64 = 1024 * 1024 * 1024;

/// Hints about the host used to scale time estimates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemProfile {
    /// Logical CPUs available to this process.
    pub cpu_cores: Option<usize>,
    /// Total physical memory.
    pub memory_bytes: Option<u64>,
}

impl SystemProfile {
    /// Probe the current host.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            cpu_cores: thread::available_parallelism().ok().map(std::num::NonZeroUsize::get),
            memory_bytes: detect_total_memory(),
        }
    }

    /// Profile with unknown capabilities (estimates as a medium host).
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Performance bucket for this host.
    #[must_use]
    pub fn tier(&self) -> PerformanceTier {
        match (self.cpu_cores, self.memory_bytes) {
            (None, _) => PerformanceTier::Medium,
            (Some(cores), Some(mem)) if cores >= 8 && mem >= 8 * GIB => PerformanceTier::High,
            (Some(cores), _) if cores >= 4 => PerformanceTier::Medium,
            (Some(_), _) => PerformanceTier::Low,
        }
    }
}

/// Resident memory of this process, if the platform exposes it.
#[must_use]
pub fn sample_process_memory() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        // VmRSS is reported in kB whatever the page size.
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
        let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kib * 1024)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn detect_total_memory() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
        let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kib * 1024)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
