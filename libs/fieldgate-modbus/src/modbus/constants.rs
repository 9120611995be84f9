//! Modbus TCP framing constants

/// MBAP header: transaction id, protocol id, length, unit id
pub const MBAP_HEADER_LEN: usize = 7;

/// Read request: MBAP header + function code + start address + quantity
pub const READ_REQUEST_LEN: usize = 12;

/// Length field value of every read request (unit id + 5 PDU bytes)
pub const READ_REQUEST_MBAP_LENGTH: u16 = 6;

/// Largest legal MBAP length field (unit id + 253 byte PDU)
pub const MAX_MBAP_LENGTH: usize = 254;

/// Smallest response: MBAP header + function code + one byte
pub const MIN_RESPONSE_LEN: usize = MBAP_HEADER_LEN + 2;

/// Protocol identifier of Modbus TCP
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;
