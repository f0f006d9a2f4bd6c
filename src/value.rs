//! Decoded register values and their text rendering
//!
//! | Type | Registers | Radix rendering |
//! |------|-----------|-----------------|
//! | U16/I16 | 1 | sign + prefix + zero-padded magnitude |
//! | U32/I32 | 2 | sign + prefix + zero-padded magnitude |
//! | F32 | 2 | always decimal |
//!
//! Non-decimal radices render negative numbers as a minus sign followed by
//! the magnitude (`-0x0002`), not as a two's-complement bit pattern.

use std::fmt;

use crate::codec::Radix;

/// One scalar reassembled from register words.
///
/// ```rust
/// use modbus_visualizer::{Radix, RegisterValue};
///
/// assert_eq!(RegisterValue::U32(33_685_502).render(Radix::Hexadecimal), "0x0201FFFE");
/// assert_eq!(RegisterValue::I16(-2).render(Radix::Hexadecimal), "-0x0002");
/// assert_eq!(RegisterValue::F32(6.0).render(Radix::Binary), "6.0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
}

impl RegisterValue {
    /// Width of the encoded value in bits.
    #[inline]
    pub fn bit_width(&self) -> u32 {
        match self {
            Self::U16(_) | Self::I16(_) => 16,
            Self::U32(_) | Self::I32(_) | Self::F32(_) => 32,
        }
    }

    /// Number of registers the value occupies.
    #[inline]
    pub fn register_count(&self) -> usize {
        (self.bit_width() / 16) as usize
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::U16(_) => "uint16",
            Self::I16(_) => "int16",
            Self::U32(_) => "uint32",
            Self::I32(_) => "int32",
            Self::F32(_) => "float32",
        }
    }

    #[inline]
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::U16(v) => f64::from(v),
            Self::I16(v) => f64::from(v),
            Self::U32(v) => f64::from(v),
            Self::I32(v) => f64::from(v),
            Self::F32(v) => f64::from(v),
        }
    }

    /// Render in `radix`. Floats ignore the radix.
    pub fn render(&self, radix: Radix) -> String {
        let bits = self.bit_width();
        match *self {
            Self::U16(v) => render_integer(i64::from(v), radix, bits),
            Self::I16(v) => render_integer(i64::from(v), radix, bits),
            Self::U32(v) => render_integer(i64::from(v), radix, bits),
            Self::I32(v) => render_integer(i64::from(v), radix, bits),
            Self::F32(v) => format_float(f64::from(v)),
        }
    }
}

/// Signed magnitude rendering, zero-padded to the digits a full-width value
/// needs in this radix.
fn render_integer(value: i64, radix: Radix, bits: u32) -> String {
    let Some(prefix) = radix.prefix() else {
        return value.to_string();
    };
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    let width = radix.pad_width(bits);
    let digits = match radix {
        Radix::Binary => format!("{:0width$b}", magnitude, width = width),
        Radix::Octal => format!("{:0width$o}", magnitude, width = width),
        Radix::Hexadecimal => format!("{:0width$X}", magnitude, width = width),
        Radix::Decimal => magnitude.to_string(),
    };
    format!("{}{}{}", sign, prefix, digits)
}

/// Shortest round-trip decimal text for a float.
///
/// Positional notation for decimal exponents in `-4..16`, otherwise
/// scientific with a signed two-digit exponent (`1e+20`, `1.5e-07`). Whole
/// numbers keep a trailing `.0`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "-3.0019569396972656e0".
    let sci = format!("{:e}", value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exponent) {
        if exponent >= 0 {
            let int_len = exponent as usize + 1;
            if digits.len() <= int_len {
                format!("{}{}{}.0", sign, digits, "0".repeat(int_len - digits.len()))
            } else {
                format!("{}{}.{}", sign, &digits[..int_len], &digits[int_len..])
            }
        } else {
            let zeros = "0".repeat((-exponent - 1) as usize);
            format!("{}0.{}{}", sign, zeros, digits)
        }
    } else {
        let (head, tail) = digits.split_at(1);
        let frac = if tail.is_empty() {
            String::new()
        } else {
            format!(".{}", tail)
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{}{}{}e{}{:02}", sign, head, frac, exp_sign, exponent.unsigned_abs())
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(Radix::Decimal))
    }
}

impl From<u16> for RegisterValue {
    fn from(v: u16) -> Self {
        Self::U16(v)
    }
}

impl From<i16> for RegisterValue {
    fn from(v: i16) -> Self {
        Self::I16(v)
    }
}

impl From<u32> for RegisterValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<i32> for RegisterValue {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<f32> for RegisterValue {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

// ============================================================================
// Tests
// ============================================================================
