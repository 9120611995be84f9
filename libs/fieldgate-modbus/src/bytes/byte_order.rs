//! Word/byte ordering for multi-register values
//!
//! Field devices disagree on how a 32-bit or 64-bit value is laid out across
//! 16-bit registers. Four permutations are supported; they are applied to
//! the register words in device order (`W0` first on the wire).

use serde::{Deserialize, Serialize};

/// Register word/byte order
///
/// # Naming Convention
/// Uses ABCD notation for the 32-bit value `0x12345678` where A is the most
/// significant byte. The notation shows the byte sequence as it arrives in
/// registers `W0, W1`:
/// - `BigEndian (ABCD)`: W0=0x1234, W1=0x5678
/// - `LittleEndian (DCBA)`: W0=0x7856, W1=0x3412
/// - `BigEndianByteSwap (BADC)`: W0=0x3412, W1=0x7856
/// - `LittleEndianWordSwap (CDAB)`: W0=0x5678, W1=0x1234
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum ByteOrder {
    /// `BE`: words concatenated as received, no swapping
    #[default]
    #[serde(rename = "BE")]
    BigEndian,

    /// `LE`: full byte reversal of the received byte sequence
    #[serde(rename = "LE")]
    LittleEndian,

    /// `BE_BS`: word order kept, bytes swapped within each word
    #[serde(rename = "BE_BS")]
    BigEndianByteSwap,

    /// `LE_BS`: word order reversed, bytes within each word kept
    #[serde(rename = "LE_BS")]
    LittleEndianWordSwap,
}

impl ByteOrder {
    pub const ALL: [ByteOrder; 4] = [
        ByteOrder::BigEndian,
        ByteOrder::LittleEndian,
        ByteOrder::BigEndianByteSwap,
        ByteOrder::LittleEndianWordSwap,
    ];

    /// Parse a configuration string
    ///
    /// Accepts the short variant names (`BE`, `LE`, `BE_BS`, `LE_BS`) and the
    /// ABCD notation. Matching is case-insensitive and ignores `-`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        match normalized.as_str() {
            "BE" | "ABCD" | "BIG_ENDIAN" => Some(Self::BigEndian),
            "LE" | "DCBA" | "LITTLE_ENDIAN" => Some(Self::LittleEndian),
            "BE_BS" | "BADC" => Some(Self::BigEndianByteSwap),
            "LE_BS" | "CDAB" => Some(Self::LittleEndianWordSwap),
            _ => None,
        }
    }

    /// Parse a configuration string, falling back to big-endian for empty or
    /// unknown input.
    pub fn from_str_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or_default()
    }

    /// Short configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigEndian => "BE",
            Self::LittleEndian => "LE",
            Self::BigEndianByteSwap => "BE_BS",
            Self::LittleEndianWordSwap => "LE_BS",
        }
    }

    /// Reassemble two registers into the 32-bit pattern they encode
    pub fn combine_u32(&self, words: [u16; 2]) -> u32 {
        let [w0, w1] = words;
        match self {
            Self::BigEndian => (u32::from(w0) << 16) | u32::from(w1),
            Self::LittleEndian => ((u32::from(w0) << 16) | u32::from(w1)).swap_bytes(),
            Self::BigEndianByteSwap => {
                (u32::from(w0.swap_bytes()) << 16) | u32::from(w1.swap_bytes())
            },
            Self::LittleEndianWordSwap => (u32::from(w1) << 16) | u32::from(w0),
        }
    }

    /// Reassemble four registers into the 64-bit pattern they encode
    ///
    /// `BE_BS` keeps the per-word byte swap for 64-bit values as well, even
    /// though some vendors document a different layout.
    pub fn combine_u64(&self, words: [u16; 4]) -> u64 {
        let straight = |w: [u16; 4]| {
            w.iter()
                .fold(0u64, |acc, &word| (acc << 16) | u64::from(word))
        };
        match self {
            Self::BigEndian => straight(words),
            Self::LittleEndian => straight(words).swap_bytes(),
            Self::BigEndianByteSwap => straight(words.map(u16::swap_bytes)),
            Self::LittleEndianWordSwap => {
                let [w0, w1, w2, w3] = words;
                straight([w3, w2, w1, w0])
            },
        }
    }

    /// Split a 32-bit pattern into the registers a device using this order
    /// would hold
    pub fn split_u32(&self, value: u32) -> [u16; 2] {
        let hi_lo = |v: u32| [(v >> 16) as u16, v as u16];
        match self {
            Self::BigEndian => hi_lo(value),
            Self::LittleEndian => hi_lo(value.swap_bytes()),
            Self::BigEndianByteSwap => hi_lo(value).map(u16::swap_bytes),
            Self::LittleEndianWordSwap => {
                let [hi, lo] = hi_lo(value);
                [lo, hi]
            },
        }
    }

    /// Split a 64-bit pattern into the registers a device using this order
    /// would hold
    pub fn split_u64(&self, value: u64) -> [u16; 4] {
        let straight = |v: u64| {
            [
                (v >> 48) as u16,
                (v >> 32) as u16,
                (v >> 16) as u16,
                v as u16,
            ]
        };
        match self {
            Self::BigEndian => straight(value),
            Self::LittleEndian => straight(value.swap_bytes()),
            Self::BigEndianByteSwap => straight(value).map(u16::swap_bytes),
            Self::LittleEndianWordSwap => {
                let [w0, w1, w2, w3] = straight(value);
                [w3, w2, w1, w0]
            },
        }
    }
}

impl From<String> for ByteOrder {
    fn from(s: String) -> Self {
        Self::from_str_or_default(&s)
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_valid() {
        assert_eq!(ByteOrder::from_str("BE"), Some(ByteOrder::BigEndian));
        assert_eq!(ByteOrder::from_str("abcd"), Some(ByteOrder::BigEndian));
        assert_eq!(ByteOrder::from_str("le"), Some(ByteOrder::LittleEndian));
        assert_eq!(
            ByteOrder::from_str("BE_BS"),
            Some(ByteOrder::BigEndianByteSwap)
        );
        assert_eq!(
            ByteOrder::from_str("be-bs"),
            Some(ByteOrder::BigEndianByteSwap)
        );
        assert_eq!(
            ByteOrder::from_str("LE_BS"),
            Some(ByteOrder::LittleEndianWordSwap)
        );
        assert_eq!(
            ByteOrder::from_str("CDAB"),
            Some(ByteOrder::LittleEndianWordSwap)
        );
    }

    #[test]
    fn test_unknown_defaults_to_big_endian() {
        assert_eq!(ByteOrder::from_str("weird"), None);
        assert_eq!(ByteOrder::from_str_or_default(""), ByteOrder::BigEndian);
        assert_eq!(
            ByteOrder::from_str_or_default("weird"),
            ByteOrder::BigEndian
        );
    }

    #[test]
    fn test_combine_u32_permutations() {
        // 0x12345678 as laid out by each variant
        assert_eq!(
            ByteOrder::BigEndian.combine_u32([0x1234, 0x5678]),
            0x1234_5678
        );
        assert_eq!(
            ByteOrder::LittleEndian.combine_u32([0x7856, 0x3412]),
            0x1234_5678
        );
        assert_eq!(
            ByteOrder::BigEndianByteSwap.combine_u32([0x3412, 0x7856]),
            0x1234_5678
        );
        assert_eq!(
            ByteOrder::LittleEndianWordSwap.combine_u32([0x5678, 0x1234]),
            0x1234_5678
        );
    }

    #[test]
    fn test_combine_u64_permutations() {
        let words = [0x0102, 0x0304, 0x0506, 0x0708];
        assert_eq!(
            ByteOrder::BigEndian.combine_u64(words),
            0x0102_0304_0506_0708
        );
        assert_eq!(
            ByteOrder::LittleEndian.combine_u64(words),
            0x0807_0605_0403_0201
        );
        assert_eq!(
            ByteOrder::BigEndianByteSwap.combine_u64(words),
            0x0201_0403_0605_0807
        );
        assert_eq!(
            ByteOrder::LittleEndianWordSwap.combine_u64(words),
            0x0708_0506_0304_0102
        );
    }

    #[test]
    fn test_split_inverts_combine() {
        for order in ByteOrder::ALL {
            assert_eq!(order.combine_u32(order.split_u32(0xDEAD_BEEF)), 0xDEAD_BEEF);
            assert_eq!(
                order.combine_u64(order.split_u64(0x0123_4567_89AB_CDEF)),
                0x0123_4567_89AB_CDEF
            );
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ByteOrder::LittleEndianWordSwap).unwrap();
        assert_eq!(json, "\"LE_BS\"");
        let parsed: ByteOrder = serde_json::from_str("\"BE_BS\"").unwrap();
        assert_eq!(parsed, ByteOrder::BigEndianByteSwap);
        let lenient: ByteOrder = serde_json::from_str("\"cdab\"").unwrap();
        assert_eq!(lenient, ByteOrder::LittleEndianWordSwap);
        let unknown: ByteOrder = serde_json::from_str("\"\"").unwrap();
        assert_eq!(unknown, ByteOrder::BigEndian);
    }

    #[test]
    fn test_default() {
        assert_eq!(ByteOrder::default(), ByteOrder::BigEndian);
    }
}
