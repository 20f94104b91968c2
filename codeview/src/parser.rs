//! Byte-oriented decoding of CodeView records

use crate::types::number::Number;
use crate::types::TypeIndex;
use bstr::BStr;
use std::mem::{size_of, take};
use zerocopy::byteorder::{I16, I32, I64, LE, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// Reads little-endian values and structures from the front of a byte slice.
#[derive(Clone)]
pub struct Parser<'a> {
    /// The bytes that have not been consumed yet.
    pub bytes: &'a [u8],
}

impl<'a> Parser<'a> {
    /// Starts a parser over `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Returns the unconsumed bytes without advancing.
    pub fn peek_rest(&self) -> &'a [u8] {
        self.bytes
    }

    /// Consumes and returns all remaining bytes.
    pub fn take_rest(&mut self) -> &'a [u8] {
        take(&mut self.bytes)
    }

    /// True if nothing is left to parse.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Takes the next `n` bytes.
    #[inline(always)]
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ParserError> {
        if self.bytes.len() < n {
            return Err(ParserError::new());
        }
        let (lo, hi) = self.bytes.split_at(n);
        self.bytes = hi;
        Ok(lo)
    }

    /// Skips `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), ParserError> {
        self.bytes(n).map(|_| ())
    }

    /// Borrows a fixed-layout structure from the input.
    #[inline(always)]
    pub fn get<T: FromBytes + Unaligned + KnownLayout + Immutable>(
        &mut self,
    ) -> Result<&'a T, ParserError> {
        match T::ref_from_prefix(self.bytes) {
            Ok((value, rest)) => {
                self.bytes = rest;
                Ok(value)
            }
            Err(_) => Err(ParserError::new()),
        }
    }

    /// Copies a fixed-layout structure out of the input.
    #[inline(always)]
    pub fn copy<T: FromBytes + Unaligned>(&mut self) -> Result<T, ParserError> {
        let item = self.bytes(size_of::<T>())?;
        T::read_from_bytes(item).map_err(|_| ParserError::new())
    }

    /// Parses anything that implements [`Parse`].
    #[inline(always)]
    pub fn parse<T: Parse<'a>>(&mut self) -> Result<T, ParserError> {
        T::from_parser(self)
    }

    /// Borrows `len` consecutive fixed-layout items.
    pub fn slice<T: FromBytes + Unaligned + Immutable>(
        &mut self,
        len: usize,
    ) -> Result<&'a [T], ParserError> {
        match <[T]>::ref_from_prefix_with_elems(self.bytes, len) {
            Ok((lo, hi)) => {
                self.bytes = hi;
                Ok(lo)
            }
            Err(_) => Err(ParserError::new()),
        }
    }

    /// Reads one byte.
    pub fn u8(&mut self) -> Result<u8, ParserError> {
        Ok(self.bytes(1)?[0])
    }

    /// Reads one signed byte.
    pub fn i8(&mut self) -> Result<i8, ParserError> {
        Ok(self.u8()? as i8)
    }

    /// Reads a little-endian `u16`.
    pub fn u16(&mut self) -> Result<u16, ParserError> {
        Ok(self.copy::<U16<LE>>()?.get())
    }

    /// Reads a little-endian `i16`.
    pub fn i16(&mut self) -> Result<i16, ParserError> {
        Ok(self.copy::<I16<LE>>()?.get())
    }

    /// Reads a little-endian `u32`.
    pub fn u32(&mut self) -> Result<u32, ParserError> {
        Ok(self.copy::<U32<LE>>()?.get())
    }

    /// Reads a little-endian `i32`.
    pub fn i32(&mut self) -> Result<i32, ParserError> {
        Ok(self.copy::<I32<LE>>()?.get())
    }

    /// Reads a little-endian `u64`.
    pub fn u64(&mut self) -> Result<u64, ParserError> {
        Ok(self.copy::<U64<LE>>()?.get())
    }

    /// Reads a little-endian `i64`.
    pub fn i64(&mut self) -> Result<i64, ParserError> {
        Ok(self.copy::<I64<LE>>()?.get())
    }

    /// Skips a NUL-terminated string.
    pub fn skip_strz(&mut self) -> Result<(), ParserError> {
        self.strz().map(|_| ())
    }

    /// Reads a NUL-terminated string. The encoding is not checked.
    pub fn strz(&mut self) -> Result<&'a BStr, ParserError> {
        let Some(nul) = self.bytes.iter().position(|&b| b == 0) else {
            return Err(ParserError::new());
        };
        let s = &self.bytes[..nul];
        self.bytes = &self.bytes[nul + 1..];
        Ok(BStr::new(s))
    }

    /// Reads a 32-bit type index.
    pub fn type_index(&mut self) -> Result<TypeIndex, ParserError> {
        Ok(TypeIndex(self.u32()?))
    }

    /// Reads a numeric leaf.
    pub fn number(&mut self) -> Result<Number<'a>, ParserError> {
        self.parse()
    }
}

/// Zero-sized error for malformed records.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ParserError;

impl ParserError {
    /// Creates the error. Debug builds log an event here, which makes a handy breakpoint.
    #[cfg_attr(debug_assertions, inline(never))]
    #[cfg_attr(not(debug_assertions), inline(always))]
    pub fn new() -> Self {
        #[cfg(debug_assertions)]
        {
            tracing::debug!("ParserError");
        }
        Self
    }
}

impl Default for ParserError {
    fn default() -> Self {
        Self::new()
    }
}

impl std::error::Error for ParserError {}

impl std::fmt::Display for ParserError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str("CodeView record is malformed")
    }
}

/// Types that can be decoded from a [`Parser`].
pub trait Parse<'a>
where
    Self: Sized,
{
    /// Decodes `Self`, leaving any trailing bytes in `p`.
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError>;

    /// Decodes `Self` from the front of `bytes`.
    fn parse(bytes: &'a [u8]) -> Result<Self, ParserError> {
        Self::from_parser(&mut Parser::new(bytes))
    }
}
