//! Modbus TCP read request/response framing
//!
//! Pure functions over byte buffers: no I/O happens here. A request is always
//! the fixed 12-byte read frame; a response is validated field by field and
//! rejected on the first inconsistency.

use super::constants::{
    EXCEPTION_FLAG, MBAP_HEADER_LEN, MIN_RESPONSE_LEN, MODBUS_PROTOCOL_ID, READ_REQUEST_LEN,
    READ_REQUEST_MBAP_LENGTH,
};
use super::types::FunctionCode;
use crate::error::{LinkError, Result};
use std::sync::atomic::{AtomicU16, Ordering};
use tracing::debug;

/// Transaction id source shared by every poller
///
/// Ids increase by one and wrap from 65535 to 1; 0 is never handed out.
#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    last: AtomicU16,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator whose next id follows `last`
    pub fn starting_after(last: u16) -> Self {
        Self {
            last: AtomicU16::new(last),
        }
    }

    pub fn next_id(&self) -> u16 {
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = if current == u16::MAX { 1 } else { current + 1 };
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// One read transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub function: FunctionCode,
    pub address: u16,
    pub quantity: u16,
}

impl ReadRequest {
    /// Data bytes a conforming response carries
    pub fn expected_byte_count(&self) -> usize {
        let quantity = usize::from(self.quantity);
        if self.function.is_bit_read() {
            quantity.div_ceil(8)
        } else {
            quantity * 2
        }
    }
}

/// Decoded payload of a read response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResponse {
    /// First bit of a coil or discrete input read
    Bit(bool),
    /// Register words in wire order
    Registers(Vec<u16>),
}

impl ReadResponse {
    /// Words for the value decoder; a bit read becomes a single 0/1 word
    pub fn into_words(self) -> Vec<u16> {
        match self {
            Self::Bit(bit) => vec![u16::from(bit)],
            Self::Registers(words) => words,
        }
    }
}

/// Encode a read request as a Modbus TCP frame
pub fn build_read_request(request: &ReadRequest) -> [u8; READ_REQUEST_LEN] {
    let mut frame = [0u8; READ_REQUEST_LEN];
    frame[0..2].copy_from_slice(&request.transaction_id.to_be_bytes());
    frame[2..4].copy_from_slice(&MODBUS_PROTOCOL_ID.to_be_bytes());
    frame[4..6].copy_from_slice(&READ_REQUEST_MBAP_LENGTH.to_be_bytes());
    frame[6] = request.unit_id;
    frame[7] = request.function.code();
    frame[8..10].copy_from_slice(&request.address.to_be_bytes());
    frame[10..12].copy_from_slice(&request.quantity.to_be_bytes());

    debug!(
        "Building TCP frame: trans_id={:04X}, unit_id={}, FC={:02X}, addr={}, qty={}",
        request.transaction_id,
        request.unit_id,
        request.function.code(),
        request.address,
        request.quantity
    );
    frame
}

/// Validate a response frame against the request it answers
pub fn parse_read_response(request: &ReadRequest, data: &[u8]) -> Result<ReadResponse> {
    if data.len() < MIN_RESPONSE_LEN {
        return Err(LinkError::protocol(format!(
            "TCP frame too short: {} bytes",
            data.len()
        )));
    }

    let transaction_id = u16::from_be_bytes([data[0], data[1]]);
    let protocol_id = u16::from_be_bytes([data[2], data[3]]);
    let length = usize::from(u16::from_be_bytes([data[4], data[5]]));

    if protocol_id != MODBUS_PROTOCOL_ID {
        return Err(LinkError::protocol(format!(
            "Invalid protocol ID: expected 0, got {protocol_id}"
        )));
    }

    if transaction_id != request.transaction_id {
        return Err(LinkError::TransactionMismatch {
            expected: request.transaction_id,
            got: transaction_id,
        });
    }

    // length covers the unit id plus the PDU
    if data.len() != MBAP_HEADER_LEN - 1 + length {
        return Err(LinkError::protocol(format!(
            "Invalid TCP frame length: expected {}, got {}",
            MBAP_HEADER_LEN - 1 + length,
            data.len()
        )));
    }

    let pdu = &data[MBAP_HEADER_LEN..];
    let function = pdu[0];

    if function == request.function.exception_code() {
        return Err(LinkError::Exception {
            function: function & !EXCEPTION_FLAG,
            code: pdu[1],
        });
    }

    if function != request.function.code() {
        return Err(LinkError::protocol(format!(
            "Function code mismatch: expected {:02X}, got {:02X}",
            request.function.code(),
            function
        )));
    }

    let byte_count = usize::from(pdu[1]);
    let expected = request.expected_byte_count();
    if byte_count != expected || pdu.len() != 2 + byte_count {
        return Err(LinkError::protocol(format!(
            "Byte count mismatch: expected {}, declared {}, received {}",
            expected,
            byte_count,
            pdu.len() - 2
        )));
    }

    let payload = &pdu[2..];
    if request.function.is_bit_read() {
        let first = payload
            .first()
            .ok_or_else(|| LinkError::protocol("Empty bit response"))?;
        return Ok(ReadResponse::Bit(first & 0x01 != 0));
    }

    let words = payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    Ok(ReadResponse::Registers(words))
}
