//! Modbus TCP acquisition primitives
//!
//! ```text
//! fieldgate-modbus/modbus
//!     ├── types       (device and register descriptors)
//!     ├── frame       (12-byte read request, response validation, transaction ids)
//!     ├── codec       (register words -> typed, calibrated values)
//!     └── connection  (TCP stream with bounded send/receive)
//! ```

mod codec;
mod connection;
mod constants;
mod frame;
mod types;

pub use codec::{decode_value, decode_words, encode_words, RawValue};

pub use connection::ModbusConnection;

pub use frame::{
    build_read_request, parse_read_response, ReadRequest, ReadResponse, TransactionIdGenerator,
};

pub use types::{
    BaseType, Calibration, DataType, DeviceDescriptor, DeviceTarget, FunctionCode,
    RegisterDescriptor, TransportFamily,
};

pub use constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN, READ_REQUEST_LEN};
