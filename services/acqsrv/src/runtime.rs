//! Runtime Orchestration Layer
//!
//! Starts the acquisition workers and the batch monitor.

pub mod lifecycle;

pub use lifecycle::{start_acquisition, start_batch_monitor, AcquisitionHandles, RuntimeDeps};
