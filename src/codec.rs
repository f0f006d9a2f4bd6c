//! Register formatter
//!
//! Turns raw register words into display strings under a [`FormatSpec`].
//! The function is pure and total: ragged input is truncated, never rejected.
//!
//! ## Pipeline
//!
//! 1. Serialize every word to two bytes per [`ByteOrder`].
//! 2. Drop the trailing bytes that do not fill a whole value.
//! 3. Decode 2-byte values most-significant-byte first, 4-byte values per
//!    [`WordOrder`].
//! 4. Render each value in the requested [`Radix`] (floats always decimal).
//! 5. For 4-byte types, follow each value with an empty string so the output
//!    lines up with the two registers it came from.
//!
//! ## Supported Data Types
//!
//! | Type | Registers | Aliases |
//! |------|-----------|---------|
//! | uint16 | 1 | u16, H |
//! | int16 | 1 | i16, h |
//! | uint32 | 2 | u32, L |
//! | int32 | 2 | i32, l |
//! | float32 | 2 | f32, float, f |

use std::fmt;
use std::str::FromStr;

use crate::bytes::{assemble_u16, assemble_u32, serialize_words, ByteOrder, WordOrder};
use crate::error::ModbusError;
use crate::value::RegisterValue;

/// Scalar type the registers are interpreted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
}

impl DataType {
    /// Encoded width in bytes.
    #[inline]
    pub fn byte_width(self) -> usize {
        match self {
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
        }
    }

    #[inline]
    pub fn register_count(self) -> usize {
        self.byte_width() / 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Single-letter struct codes are case sensitive: H/h and L/l differ in sign.
        match s {
            "H" => return Ok(Self::Uint16),
            "h" => return Ok(Self::Int16),
            "L" => return Ok(Self::Uint32),
            "l" => return Ok(Self::Int32),
            "f" => return Ok(Self::Float32),
            _ => {}
        }
        match s.to_ascii_lowercase().as_str() {
            "uint16" | "u16" => Ok(Self::Uint16),
            "int16" | "i16" => Ok(Self::Int16),
            "uint32" | "u32" => Ok(Self::Uint32),
            "int32" | "i32" => Ok(Self::Int32),
            "float32" | "f32" | "float" => Ok(Self::Float32),
            _ => Err(ModbusError::invalid_data(format!("Unknown data type: {}", s))),
        }
    }
}

/// Numeral base for rendering integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Radix {
    Binary,
    Octal,
    #[default]
    Decimal,
    Hexadecimal,
}

impl Radix {
    #[inline]
    pub fn base(self) -> u32 {
        match self {
            Self::Binary => 2,
            Self::Octal => 8,
            Self::Decimal => 10,
            Self::Hexadecimal => 16,
        }
    }

    /// `0b`/`0o`/`0x`; decimal has none.
    #[inline]
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Binary => Some("0b"),
            Self::Octal => Some("0o"),
            Self::Decimal => None,
            Self::Hexadecimal => Some("0x"),
        }
    }

    /// Digits needed for any `bits`-wide value: `ceil(bits / log2(base))`.
    /// Only meaningful for the power-of-two bases.
    pub fn pad_width(self, bits: u32) -> usize {
        let per_digit = match self {
            Self::Binary => 1,
            Self::Octal => 3,
            Self::Hexadecimal => 4,
            Self::Decimal => return 0,
        };
        bits.div_ceil(per_digit) as usize
    }
}

impl TryFrom<u32> for Radix {
    type Error = ModbusError;

    fn try_from(base: u32) -> Result<Self, Self::Error> {
        match base {
            2 => Ok(Self::Binary),
            8 => Ok(Self::Octal),
            10 => Ok(Self::Decimal),
            16 => Ok(Self::Hexadecimal),
            other => Err(ModbusError::invalid_data(format!("Unsupported radix: {}", other))),
        }
    }
}

impl fmt::Display for Radix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base())
    }
}

/// How to interpret and render a run of registers.
///
/// ```rust
/// use modbus_visualizer::{format_registers, DataType, FormatSpec, Radix};
///
/// let spec = FormatSpec::new(DataType::Uint32).with_radix(Radix::Hexadecimal);
/// assert_eq!(format_registers(&[0x0201, 0xFFFE], &spec), vec!["0x0201FFFE", ""]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FormatSpec {
    pub data_type: DataType,
    pub byte_order: ByteOrder,
    /// Only consulted for 4-byte types
    pub word_order: WordOrder,
    pub radix: Radix,
}

impl FormatSpec {
    /// MSB/MSW first, decimal.
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            ..Self::default()
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_word_order(mut self, order: WordOrder) -> Self {
        self.word_order = order;
        self
    }

    pub fn with_radix(mut self, radix: Radix) -> Self {
        self.radix = radix;
        self
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Reassemble `words` into scalars. A trailing partial value is dropped.
pub fn decode_registers(words: &[u16], spec: &FormatSpec) -> Vec<RegisterValue> {
    let buf = serialize_words(words, spec.byte_order);

    match spec.data_type.byte_width() {
        2 => buf
            .chunks_exact(2)
            .map(|c| {
                let raw = assemble_u16([c[0], c[1]]);
                match spec.data_type {
                    DataType::Int16 => RegisterValue::I16(raw as i16),
                    _ => RegisterValue::U16(raw),
                }
            })
            .collect(),
        _ => buf
            .chunks_exact(4)
            .map(|c| {
                let raw = assemble_u32([c[0], c[1], c[2], c[3]], spec.word_order);
                match spec.data_type {
                    DataType::Int32 => RegisterValue::I32(raw as i32),
                    DataType::Float32 => RegisterValue::F32(f32::from_bits(raw)),
                    _ => RegisterValue::U32(raw),
                }
            })
            .collect(),
    }
}

/// Render register words as display strings.
///
/// 4-byte types yield two entries per value, the second one empty.
pub fn format_registers(words: &[u16], spec: &FormatSpec) -> Vec<String> {
    let values = decode_registers(words, spec);
    let slots = spec.data_type.register_count();

    let mut out = Vec::with_capacity(values.len() * slots);
    for value in values {
        out.push(value.render(spec.radix));
        out.extend(std::iter::repeat_n(String::new(), slots - 1));
    }
    out
}

/// Render coil / discrete-input words (0 or 1) as `"True"` / `"False"`.
pub fn format_bits(bits: &[u16]) -> Vec<String> {
    bits.iter()
        .map(|&b| if b != 0 { "True" } else { "False" }.to_string())
        .collect()
}
