//! Numeric leaves
//!
//! Lengths, offsets, enumerator values, and constants are stored as variable-length numbers. A
//! value below `0x8000` is stored inline in the leading `u16`; otherwise that `u16` is a leaf
//! tag that says how the value that follows is encoded.

use super::Leaf;
use crate::parser::{Parse, Parser, ParserError};
use std::fmt::{Debug, Display};

/// A numeric value embedded in a type or symbol record.
#[derive(Copy, Clone)]
#[repr(transparent)]
pub struct Number<'a> {
    bytes: &'a [u8],
}

/// The integer payload of a [`Number`], with its encoded width and signedness.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NumberBits {
    /// The value, zero-extended from `width` bits.
    pub bits: u128,
    /// Encoded width of the value, in bits.
    pub width: u32,
    /// Whether the encoding is a signed integer type.
    pub signed: bool,
}

impl NumberBits {
    /// Sign-extends (if signed) or zero-extends the value to 128 bits.
    pub fn extended(&self, sign_extend: bool) -> u128 {
        if sign_extend
            && self.width > 0
            && self.width < 128
            && (self.bits >> (self.width - 1)) & 1 != 0
        {
            self.bits | (!0u128 << self.width)
        } else {
            self.bits
        }
    }
}

impl<'a> Number<'a> {
    /// The encoded bytes, including the leading leaf.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The leaf tag, or the immediate value itself.
    pub fn kind(&self) -> Leaf {
        Leaf(u16::from_le_bytes([self.bytes[0], self.bytes[1]]))
    }

    /// Decodes integer encodings. Returns `None` for reals, strings, and other non-integers.
    pub fn bits(&self) -> Option<NumberBits> {
        let mut p = Parser::new(self.bytes);
        let leaf = Leaf(p.u16().ok()?);
        let (bits, width, signed) = match leaf {
            lf if lf.is_immediate_numeric() => (lf.0 as u128, 16, false),
            Leaf::LF_CHAR => (p.u8().ok()? as u128, 8, true),
            Leaf::LF_SHORT => (p.u16().ok()? as u128, 16, true),
            Leaf::LF_USHORT => (p.u16().ok()? as u128, 16, false),
            Leaf::LF_LONG => (p.u32().ok()? as u128, 32, true),
            Leaf::LF_ULONG => (p.u32().ok()? as u128, 32, false),
            Leaf::LF_QUADWORD => (p.u64().ok()? as u128, 64, true),
            Leaf::LF_UQUADWORD => (p.u64().ok()? as u128, 64, false),
            Leaf::LF_OCTWORD | Leaf::LF_UOCTWORD => {
                let b = p.bytes(16).ok()?;
                let mut a = [0u8; 16];
                a.copy_from_slice(b);
                (u128::from_le_bytes(a), 128, leaf == Leaf::LF_OCTWORD)
            }
            _ => return None,
        };
        Some(NumberBits {
            bits,
            width,
            signed,
        })
    }

    /// Decodes the value as a signed 128-bit integer, honoring the encoding's signedness.
    pub fn as_i128(&self) -> Option<i128> {
        let b = self.bits()?;
        Some(b.extended(b.signed) as i128)
    }
}

impl<'a> Parse<'a> for Number<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let start = p.peek_rest();

        let more_len = match Leaf(p.u16()?) {
            lf if lf.is_immediate_numeric() => 0,
            Leaf::LF_CHAR => 1,
            Leaf::LF_SHORT | Leaf::LF_USHORT | Leaf::LF_REAL16 => 2,
            Leaf::LF_LONG | Leaf::LF_ULONG | Leaf::LF_REAL32 => 4,
            Leaf::LF_REAL48 => 6,
            Leaf::LF_QUADWORD | Leaf::LF_UQUADWORD | Leaf::LF_REAL64 | Leaf::LF_DATE => 8,
            Leaf::LF_COMPLEX32 => 8,
            Leaf::LF_REAL80 => 10,
            Leaf::LF_OCTWORD | Leaf::LF_UOCTWORD | Leaf::LF_REAL128 | Leaf::LF_DECIMAL => 16,
            Leaf::LF_COMPLEX64 => 16,
            Leaf::LF_COMPLEX80 => 20,
            Leaf::LF_COMPLEX128 => 32,
            Leaf::LF_VARSTRING => p.u16()? as usize,
            Leaf::LF_UTF8STRING => {
                p.skip_strz()?;
                0
            }
            lf => {
                tracing::warn!(leaf = ?lf, "unrecognized numeric leaf");
                return Err(ParserError::new());
            }
        };

        p.skip(more_len)?;
        Ok(Self {
            bytes: &start[..start.len() - p.len()],
        })
    }
}

/// A [`Number`] that is not an integer or does not fit the requested type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NumberConversionError;

impl std::error::Error for NumberConversionError {}

impl Display for NumberConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("numeric leaf does not fit the requested integer type")
    }
}

macro_rules! try_from_number {
    ($t:ty) => {
        impl<'a> TryFrom<Number<'a>> for $t {
            type Error = NumberConversionError;

            fn try_from(value: Number<'a>) -> Result<Self, Self::Error> {
                let b = value.bits().ok_or(NumberConversionError)?;
                let converted = if b.signed {
                    <$t>::try_from(b.extended(true) as i128)
                } else {
                    <$t>::try_from(b.bits)
                };
                converted.map_err(|_| NumberConversionError)
            }
        }
    };
}

try_from_number!(i32);
try_from_number!(i64);
try_from_number!(u32);
try_from_number!(u64);

impl<'a> Debug for Number<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl<'a> Display for Number<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bits() {
            Some(b) if b.signed => write!(f, "{}", b.extended(true) as i128),
            Some(b) => write!(f, "{}", b.bits),
            None => write!(
                f,
                "{:?}({})",
                self.kind(),
                pretty_hex::simple_hex(&&self.bytes[2..])
            ),
        }
    }
}
