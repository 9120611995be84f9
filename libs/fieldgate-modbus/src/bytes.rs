//! Byte-level helpers for register values

pub mod byte_order;

pub use byte_order::ByteOrder;
