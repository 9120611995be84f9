//! Register value decoding
//!
//! Turns the words of a read response into a typed value, then into the
//! calibrated `f64` handed downstream. Multi-register values are reassembled
//! through [`ByteOrder`] and reinterpreted bit-exactly.

use super::types::{BaseType, Calibration, DataType};
use crate::bytes::ByteOrder;
use crate::error::{LinkError, Result};
use tracing::{trace, warn};

/// A decoded value before calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    I64(i64),
    U64(u64),
    F64(f64),
}

impl RawValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            },
            Self::I16(v) => f64::from(v),
            Self::U16(v) => f64::from(v),
            Self::I32(v) => f64::from(v),
            Self::U32(v) => f64::from(v),
            Self::F32(v) => f64::from(v),
            Self::I64(v) => v as f64,
            Self::U64(v) => v as f64,
            Self::F64(v) => v,
        }
    }
}

/// Decode words whose count matches the declared type
pub fn decode_words(words: &[u16], data_type: DataType) -> Result<RawValue> {
    let expected = usize::from(data_type.base.register_count());
    if words.len() != expected {
        return Err(LinkError::protocol(format!(
            "{} expects {} registers, got {}",
            data_type.base.as_str(),
            expected,
            words.len()
        )));
    }

    let value = match data_type.base {
        BaseType::Bool => RawValue::Bool(words[0] != 0),
        BaseType::Int16 => RawValue::I16(words[0] as i16),
        BaseType::UInt16 | BaseType::Unrecognized => RawValue::U16(words[0]),
        BaseType::Int32 => RawValue::I32(data_type.order.combine_u32([words[0], words[1]]) as i32),
        BaseType::UInt32 => RawValue::U32(data_type.order.combine_u32([words[0], words[1]])),
        BaseType::Float32 => RawValue::F32(f32::from_bits(
            data_type.order.combine_u32([words[0], words[1]]),
        )),
        BaseType::Int64 => RawValue::I64(data_type.order.combine_u64(quad(words)) as i64),
        BaseType::UInt64 => RawValue::U64(data_type.order.combine_u64(quad(words))),
        BaseType::Double64 => RawValue::F64(f64::from_bits(
            data_type.order.combine_u64(quad(words)),
        )),
    };

    trace!(
        "Decoded {}: registers={:04X?}, byte_order={}, value={:?}",
        data_type.base.as_str(),
        words,
        data_type.order,
        value
    );
    Ok(value)
}

fn quad(words: &[u16]) -> [u16; 4] {
    [words[0], words[1], words[2], words[3]]
}

/// Decode and calibrate one register value
///
/// A word count the declared type cannot use yields the first word,
/// uncalibrated, and a data-quality warning. An empty response is an error.
pub fn decode_value(words: &[u16], data_type: DataType, calibration: &Calibration) -> Result<f64> {
    let first = *words
        .first()
        .ok_or_else(|| LinkError::protocol("No registers to decode"))?;

    if words.len() != usize::from(data_type.base.register_count()) {
        warn!(
            "Unsupported register count {} for {}, using raw first register {}",
            words.len(),
            data_type.base.as_str(),
            first
        );
        return Ok(f64::from(first));
    }

    let raw = decode_words(words, data_type)?;
    Ok(calibration.apply(raw.as_f64()))
}

/// Registers a device using `order` would hold for `value`
pub fn encode_words(value: RawValue, order: ByteOrder) -> Vec<u16> {
    match value {
        RawValue::Bool(b) => vec![u16::from(b)],
        RawValue::I16(v) => vec![v as u16],
        RawValue::U16(v) => vec![v],
        RawValue::I32(v) => order.split_u32(v as u32).to_vec(),
        RawValue::U32(v) => order.split_u32(v).to_vec(),
        RawValue::F32(v) => order.split_u32(v.to_bits()).to_vec(),
        RawValue::I64(v) => order.split_u64(v as u64).to_vec(),
        RawValue::U64(v) => order.split_u64(v).to_vec(),
        RawValue::F64(v) => order.split_u64(v.to_bits()).to_vec(),
    }
}
