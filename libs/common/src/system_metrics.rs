//! System memory probing
//!
//! The connection pool flushes itself when available memory runs low; the
//! probe is a trait so tests can simulate exhaustion.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::System;

/// Source of the currently available system memory
pub trait MemoryProbe: Send + Sync {
    /// Available memory in bytes
    fn available_bytes(&self) -> u64;
}

/// Memory probe backed by `sysinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoMemoryProbe;

impl MemoryProbe for SysinfoMemoryProbe {
    fn available_bytes(&self) -> u64 {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.available_memory()
    }
}

/// Memory probe returning a settable value
#[derive(Debug)]
pub struct FixedMemoryProbe {
    available: AtomicU64,
}

impl FixedMemoryProbe {
    pub fn new(available: u64) -> Self {
        Self {
            available: AtomicU64::new(available),
        }
    }

    pub fn set(&self, available: u64) {
        self.available.store(available, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn available_bytes(&self) -> u64 {
        self.available.load(Ordering::Relaxed)
    }
}

/// Memory figures logged at startup
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    /// Total system memory (MB)
    pub memory_total_mb: u64,
    /// Available system memory (MB)
    pub memory_available_mb: u64,
}

impl SystemMetrics {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self {
            memory_total_mb: sys.total_memory() / 1024 / 1024,
            memory_available_mb: sys.available_memory() / 1024 / 1024,
        }
    }
}
