// System monitoring - available memory for model selection and diagnostics

use sysinfo::System;

const BYTES_PER_GIB: f64 = 1_073_741_824.0;

/// Source of available-memory readings.
///
/// The gateway reads memory at startup (tier selection), before and after
/// each request (phase records) and on every health check.
pub trait MemoryProbe: Send + Sync {
    /// Currently available (free + reclaimable) RAM in GiB
    fn available_gib(&self) -> f64;
}

/// Memory usage information
#[derive(Debug, Clone)]
pub struct MemoryInfo {
    /// Total system RAM in bytes
    pub total_memory: u64,
    /// Available system RAM in bytes
    pub available_memory: u64,
}

impl MemoryInfo {
    /// Get current memory information
    pub fn current() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        Self {
            total_memory: system.total_memory(),
            available_memory: system.available_memory(),
        }
    }

    pub fn total_gib(&self) -> f64 {
        self.total_memory as f64 / BYTES_PER_GIB
    }

    pub fn available_gib(&self) -> f64 {
        self.available_memory as f64 / BYTES_PER_GIB
    }
}

/// Reads the host's memory through sysinfo.
///
/// An unreadable value reports 0 GiB, which fails tier selection at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemoryProbe for SystemMemory {
    fn available_gib(&self) -> f64 {
        let info = MemoryInfo::current();
        if info.total_memory == 0 {
            tracing::warn!("Could not read system memory; reporting 0 GiB available");
        }
        info.available_gib()
    }
}

/// Fixed reading, for tests and for pinning the tier by hand
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub f64);

impl MemoryProbe for FixedMemory {
    fn available_gib(&self) -> f64 {
        self.0
    }
}
