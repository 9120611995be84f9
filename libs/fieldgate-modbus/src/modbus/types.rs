//! Modbus device and register descriptors
//!
//! Descriptor types are owned values: the configuration store hands out
//! clones and the scheduler keeps its own snapshot.

use crate::bytes::ByteOrder;
use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read function codes handled by the acquisition engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// FC01/FC02 return packed bits rather than 16-bit words
    pub fn is_bit_read(self) -> bool {
        matches!(self, Self::ReadCoils | Self::ReadDiscreteInputs)
    }

    /// Function code a device sets when answering with an exception
    pub fn exception_code(self) -> u8 {
        self.code() | 0x80
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = LinkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::ReadCoils),
            0x02 => Ok(Self::ReadDiscreteInputs),
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x04 => Ok(Self::ReadInputRegisters),
            other => Err(LinkError::config(format!(
                "Unsupported function code: {other}"
            ))),
        }
    }
}

impl From<FunctionCode> for u8 {
    fn from(fc: FunctionCode) -> Self {
        fc.code()
    }
}

/// Declared base type of a register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BaseType {
    Bool,
    Int16,
    #[default]
    UInt16,
    Int32,
    UInt32,
    Float32,
    Int64,
    UInt64,
    Double64,
    /// Type name not understood; decoded as an unsigned 16-bit word
    Unrecognized,
}

impl BaseType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bool" | "boolean" => Self::Bool,
            "int16" | "i16" => Self::Int16,
            "uint16" | "u16" | "" => Self::UInt16,
            "int32" | "i32" => Self::Int32,
            "uint32" | "u32" => Self::UInt32,
            "float32" | "float" | "f32" => Self::Float32,
            "int64" | "i64" => Self::Int64,
            "uint64" | "u64" => Self::UInt64,
            "double64" | "double" | "float64" | "f64" => Self::Double64,
            _ => Self::Unrecognized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Float32 => "float32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Double64 => "double64",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Number of 16-bit registers a value of this type occupies
    pub fn register_count(&self) -> u16 {
        match self {
            Self::Bool | Self::Int16 | Self::UInt16 | Self::Unrecognized => 1,
            Self::Int32 | Self::UInt32 | Self::Float32 => 2,
            Self::Int64 | Self::UInt64 | Self::Double64 => 4,
        }
    }
}

impl From<String> for BaseType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<BaseType> for String {
    fn from(t: BaseType) -> Self {
        t.as_str().to_string()
    }
}

/// Base type combined with its register layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataType {
    pub base: BaseType,
    pub order: ByteOrder,
}

impl DataType {
    pub fn new(base: BaseType, order: ByteOrder) -> Self {
        Self { base, order }
    }
}

/// Linear calibration applied after decoding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            offset: 0.0,
        }
    }
}

impl Calibration {
    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

/// A single register (or coil) to acquire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    /// Stable identifier used by downstream routing
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    pub address: u16,
    #[serde(default = "default_function_code")]
    pub function_code: FunctionCode,
    #[serde(default)]
    pub data_type: BaseType,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default, flatten)]
    pub calibration: Calibration,
    /// Per-register cadence override
    #[serde(default)]
    pub refresh_rate_ms: Option<u64>,
}

fn default_function_code() -> FunctionCode {
    FunctionCode::ReadHoldingRegisters
}

impl RegisterDescriptor {
    /// Layout the decoder applies; bit reads always decode as bool
    pub fn data_type(&self) -> DataType {
        if self.function_code.is_bit_read() {
            DataType::new(BaseType::Bool, self.byte_order)
        } else {
            DataType::new(self.data_type, self.byte_order)
        }
    }

    /// Registers (or coils) requested for this value
    pub fn register_count(&self) -> u16 {
        if self.function_code.is_bit_read() {
            1
        } else {
            self.data_type.register_count()
        }
    }

    /// Reject values that would run past the end of the address space
    pub fn validate_address_range(&self) -> Result<()> {
        let last = u32::from(self.address) + u32::from(self.register_count()) - 1;
        if last > u32::from(u16::MAX) {
            return Err(LinkError::config(format!(
                "Register {} at {} spans {} registers past 65535",
                self.id,
                self.address,
                self.register_count()
            )));
        }
        Ok(())
    }
}

/// Transport family a device is reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFamily {
    Network,
    Line,
}

/// Where a device lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum DeviceTarget {
    Tcp {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default = "default_unit_id")]
        unit_id: u8,
    },
    Serial {
        line: String,
        #[serde(default = "default_unit_id")]
        unit_id: u8,
    },
}

fn default_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

impl DeviceTarget {
    pub fn family(&self) -> TransportFamily {
        match self {
            Self::Tcp { .. } => TransportFamily::Network,
            Self::Serial { .. } => TransportFamily::Line,
        }
    }

    pub fn unit_id(&self) -> u8 {
        match self {
            Self::Tcp { unit_id, .. } | Self::Serial { unit_id, .. } => *unit_id,
        }
    }

    /// Pool key (`host:port`) or serial line name
    pub fn endpoint(&self) -> String {
        match self {
            Self::Tcp { host, port, .. } => format!("{host}:{port}"),
            Self::Serial { line, .. } => line.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Tcp { host, .. } => host.trim().is_empty(),
            Self::Serial { line, .. } => line.trim().is_empty(),
        }
    }
}

/// A field device and the registers acquired from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub target: DeviceTarget,
    #[serde(default = "default_refresh_rate_ms")]
    pub refresh_rate_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub registers: Vec<RegisterDescriptor>,
}

fn default_refresh_rate_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    1000
}

impl DeviceDescriptor {
    pub fn family(&self) -> TransportFamily {
        self.target.family()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Shortest cadence among the device and its register overrides
    pub fn effective_refresh(&self) -> Duration {
        let fastest = self
            .registers
            .iter()
            .filter_map(|r| r.refresh_rate_ms)
            .fold(self.refresh_rate_ms, u64::min);
        Duration::from_millis(fastest)
    }

    /// Cadence of one register of this device
    pub fn register_refresh(&self, register: &RegisterDescriptor) -> Duration {
        Duration::from_millis(register.refresh_rate_ms.unwrap_or(self.refresh_rate_ms))
    }

    /// A device without a target or without registers is never polled
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty() && !self.target.is_empty() && !self.registers.is_empty()
    }
}
