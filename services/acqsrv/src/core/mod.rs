//! Core Acquisition Components
//!
//! This module contains the acquisition engine: configuration, the pooled
//! Modbus TCP transport, the per-family poll scheduler and the shared
//! ledgers that downstream consumers read.
//!
//! # Architecture
//!
//! - **`config`** - Layered configuration loading and the live device store
//! - **`connection_pool`** - Bounded endpoint-keyed connection pool
//! - **`transport`** - Register reads over pooled connections
//! - **`scheduler`** - Per-device due-time bookkeeping and the poll loop
//! - **`batch`** - Per-tick expected/succeeded/failed ledger
//! - **`status`** - Per-device success/failure board
//! - **`sink`** - Delivery queue for decoded data points
//! - **`network`** - Uplink availability flag
//!
//! ```text
//! Scheduler ──► Transport ──► Connection Pool ──► device
//!     │             │
//!     │             └──► codec / decoder (fieldgate-modbus)
//!     ▼
//! Batch Tracker, Status Board ──► Output Sink
//! ```

pub mod batch;
pub mod bootstrap;
pub mod config;
pub mod connection_pool;
pub mod network;
pub mod scheduler;
pub mod sink;
pub mod status;
pub mod transport;
