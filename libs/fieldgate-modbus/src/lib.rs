//! Field gateway Modbus library
//!
//! Wire codec, value decoding and TCP transport for the acquisition service.
//! Everything except [`modbus::ModbusConnection`] is pure and free of I/O.

pub mod bytes;
pub mod error;
pub mod modbus;

pub use bytes::ByteOrder;
pub use error::{LinkError, Result};
