//! Configuration module
//!
//! - `app`: layered file + environment loading of [`AppConfig`]
//! - `store`: the live device list the scheduler snapshots

pub mod app;
pub mod store;

pub use app::{AppConfig, LoggingConfig, ServiceConfig, SinkConfig, ENV_PREFIX};
pub use store::{ConfigStore, MemoryConfigStore};
