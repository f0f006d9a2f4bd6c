//! Byte and word order handling for register reassembly
//!
//! Two independent knobs control how raw register words become scalars:
//!
//! - **Byte order** ([`ByteOrder`]): how each 16-bit word is laid out as two
//!   bytes before anything else happens. Applies to every data type.
//! - **Word order** ([`WordOrder`]): which word of a 32-bit value comes first.
//!   Applies to 4-byte types only.
//!
//! Reassembly is a two-step pipeline: [`serialize_words`] lays the words out
//! per byte order, then [`assemble_u16`] / [`assemble_u32`] decode fixed-size
//! chunks. 2-byte chunks always decode most-significant-byte first, so the
//! byte order only matters in the first step.
//!
//! For the float `6.000121593475342` (`0x40C000FF`):
//!
//! | Byte order | Word order | Registers |
//! |------------|------------|-----------|
//! | MSB first | MSW first | `[0x40C0, 0x00FF]` |
//! | MSB first | LSW first | `[0x00FF, 0x40C0]` |
//! | LSB first | MSW first | `[0xC040, 0xFF00]` |
//! | LSB first | LSW first | `[0xFF00, 0xC040]` |

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};

use crate::error::ModbusError;

/// Order of the two bytes inside one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Most significant byte first (big-endian register)
    #[default]
    MsbFirst,
    /// Least significant byte first (little-endian register)
    LsbFirst,
}

impl ByteOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MsbFirst => "MSB first",
            Self::LsbFirst => "LSB first",
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ByteOrder {
    type Err = ModbusError;

    /// Accepts "msb", "be", "big" and "lsb", "le", "little" in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "msb" | "be" | "big" | "big_endian" => Ok(Self::MsbFirst),
            "lsb" | "le" | "little" | "little_endian" => Ok(Self::LsbFirst),
            _ => Err(ModbusError::invalid_data(format!("Unknown byte order: {}", s))),
        }
    }
}

/// Order of the two registers inside a 32-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WordOrder {
    /// Most significant word first
    #[default]
    MswFirst,
    /// Least significant word first (word swap)
    LswFirst,
}

impl WordOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MswFirst => "MSW first",
            Self::LswFirst => "LSW first",
        }
    }
}

impl fmt::Display for WordOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WordOrder {
    type Err = ModbusError;

    /// Accepts "msw", "be", "big" and "lsw", "le", "little" in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "msw" | "be" | "big" | "big_endian" => Ok(Self::MswFirst),
            "lsw" | "le" | "little" | "little_endian" => Ok(Self::LswFirst),
            _ => Err(ModbusError::invalid_data(format!("Unknown word order: {}", s))),
        }
    }
}

// ============================================================================
// Reassembly
// ============================================================================

/// Lay out each word as two bytes per `order`, in input order.
pub fn serialize_words(words: &[u16], order: ByteOrder) -> BytesMut {
    let mut buf = BytesMut::with_capacity(words.len() * 2);
    for &word in words {
        match order {
            ByteOrder::MsbFirst => buf.put_u16(word),
            ByteOrder::LsbFirst => buf.put_u16_le(word),
        }
    }
    buf
}

/// Decode a 2-byte chunk, most significant byte first.
#[inline]
pub fn assemble_u16(chunk: [u8; 2]) -> u16 {
    u16::from_be_bytes(chunk)
}

/// Decode a 4-byte chunk under `order`.
///
/// With the low word first, the bytes of each word are reversed and the
/// chunk is read little-endian.
#[inline]
pub fn assemble_u32(chunk: [u8; 4], order: WordOrder) -> u32 {
    match order {
        WordOrder::MswFirst => u32::from_be_bytes(chunk),
        WordOrder::LswFirst => u32::from_le_bytes([chunk[1], chunk[0], chunk[3], chunk[2]]),
    }
}

// ============================================================================
// Inverse (value -> registers)
// ============================================================================

/// Register a device would send for `value` under `byte_order`.
#[inline]
pub fn u16_to_word(value: u16, byte_order: ByteOrder) -> u16 {
    match byte_order {
        ByteOrder::MsbFirst => value,
        ByteOrder::LsbFirst => value.swap_bytes(),
    }
}

/// Registers a device would send for `value` under the given orders.
pub fn u32_to_words(value: u32, byte_order: ByteOrder, word_order: WordOrder) -> [u16; 2] {
    let high = (value >> 16) as u16;
    let low = value as u16;
    let [first, second] = match word_order {
        WordOrder::MswFirst => [high, low],
        WordOrder::LswFirst => [low, high],
    };
    [u16_to_word(first, byte_order), u16_to_word(second, byte_order)]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIX_ISH: u32 = 0x40C0_00FF;

    fn assemble_pair(words: [u16; 2], byte_order: ByteOrder, word_order: WordOrder) -> u32 {
        let buf = serialize_words(&words, byte_order);
        assemble_u32([buf[0], buf[1], buf[2], buf[3]], word_order)
    }

    #[test]
    fn test_serialize_words() {
        assert_eq!(
            &serialize_words(&[0x1234, 0xABCD], ByteOrder::MsbFirst)[..],
            &[0x12, 0x34, 0xAB, 0xCD]
        );
        assert_eq!(
            &serialize_words(&[0x1234, 0xABCD], ByteOrder::LsbFirst)[..],
            &[0x34, 0x12, 0xCD, 0xAB]
        );
    }

    #[test]
    fn test_endianness_matrix() {
        use ByteOrder::*;
        use WordOrder::*;

        assert_eq!(assemble_pair([0x40C0, 0x00FF], MsbFirst, MswFirst), SIX_ISH);
        assert_eq!(assemble_pair([0x00FF, 0x40C0], MsbFirst, LswFirst), SIX_ISH);
        assert_eq!(assemble_pair([0xC040, 0xFF00], LsbFirst, MswFirst), SIX_ISH);
        assert_eq!(assemble_pair([0xFF00, 0xC040], LsbFirst, LswFirst), SIX_ISH);
    }

    #[test]
    fn test_u32_to_words_matches_matrix() {
        use ByteOrder::*;
        use WordOrder::*;

        assert_eq!(u32_to_words(SIX_ISH, MsbFirst, MswFirst), [0x40C0, 0x00FF]);
        assert_eq!(u32_to_words(SIX_ISH, MsbFirst, LswFirst), [0x00FF, 0x40C0]);
        assert_eq!(u32_to_words(SIX_ISH, LsbFirst, MswFirst), [0xC040, 0xFF00]);
        assert_eq!(u32_to_words(SIX_ISH, LsbFirst, LswFirst), [0xFF00, 0xC040]);
    }

    #[test]
    fn test_u16_ignores_word_order() {
        let buf = serialize_words(&[u16_to_word(0xBEEF, ByteOrder::LsbFirst)], ByteOrder::LsbFirst);
        assert_eq!(assemble_u16([buf[0], buf[1]]), 0xBEEF);
    }

    #[test]
    fn test_parse_orders() {
        assert_eq!("LE".parse::<ByteOrder>().unwrap(), ByteOrder::LsbFirst);
        assert_eq!("msw".parse::<WordOrder>().unwrap(), WordOrder::MswFirst);
        assert!("middle".parse::<ByteOrder>().is_err());
        assert_eq!(ByteOrder::default(), ByteOrder::MsbFirst);
        assert_eq!(WordOrder::default(), WordOrder::MswFirst);
    }
}
