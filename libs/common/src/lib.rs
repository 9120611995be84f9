//! Shared service plumbing for the gateway
//!
//! - logging setup with runtime level reload
//! - shutdown signal handling
//! - system memory probing

pub mod logging;
pub mod shutdown;
pub mod system_metrics;

pub use system_metrics::{FixedMemoryProbe, MemoryProbe, SysinfoMemoryProbe, SystemMetrics};
