//! Modbus Field Acquisition Service Library
//!
//! Polls Modbus devices on per-device cadences, decodes and calibrates the
//! register values and hands them to a delivery queue. A shared batch ledger
//! tells consumers when every device of the current tick is accounted for.
//!
//! # Architecture
//!
//! - **`core`**: configuration, connection pool, transport, scheduler, ledgers
//! - **`runtime`**: worker startup and the batch monitor
//! - **`error`**: service error type

pub mod core;
pub mod error;
pub mod runtime;

pub use crate::core::batch::{BatchEntry, BatchTracker};
pub use crate::core::config::{AppConfig, ConfigStore, MemoryConfigStore};
pub use crate::core::connection_pool::{ConnectionPool, Connector, PoolConfig, TcpConnector};
pub use crate::core::network::{ActiveTransport, NetworkAvailability, SharedNetworkState};
pub use crate::core::scheduler::{PassOutcome, PollScheduler, SchedulerConfig, SchedulerContext};
pub use crate::core::sink::{ChannelSink, DataPoint, OutputSink};
pub use crate::core::status::{DeviceStatus, StatusBoard};
pub use crate::core::transport::{FieldTransport, FrameExchange, TcpFieldTransport};
pub use error::{AcqError, Result};
