//! Walking a buffer of type records

use super::{Leaf, TypeData};
use crate::parser::{Parser, ParserError};

/// Iterates the records in a buffer of concatenated type records.
#[derive(Clone)]
pub struct TypesIter<'a> {
    buffer: &'a [u8],
}

impl<'a> TypesIter<'a> {
    /// Starts iterating at the beginning of `buffer`.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// The bytes not yet consumed.
    pub fn rest(&self) -> &'a [u8] {
        self.buffer
    }
}

impl<'a> Iterator for TypesIter<'a> {
    type Item = TypeRecord<'a>;

    /// Decodes the next record. A record that cannot be decoded ends the iteration and leaves
    /// `rest()` pointing at it.
    fn next(&mut self) -> Option<TypeRecord<'a>> {
        if self.buffer.is_empty() {
            return None;
        }

        let mut p = Parser::new(self.buffer);
        let record_len = p.u16().ok()?;
        if record_len < 2 {
            return None;
        }
        let kind = Leaf(p.u16().ok()?);
        let data = p.bytes(record_len as usize - 2).ok()?;
        self.buffer = p.take_rest();
        Some(TypeRecord { kind, data })
    }
}

/// One record of a type stream.
#[derive(Clone, Debug)]
pub struct TypeRecord<'a> {
    /// Determines how `data` is decoded.
    pub kind: Leaf,
    /// The payload, excluding the length and kind prefix.
    pub data: &'a [u8],
}

impl<'a> TypeRecord<'a> {
    /// Decodes the payload.
    pub fn parse(&self) -> Result<TypeData<'a>, ParserError> {
        TypeData::parse(self.kind, &mut Parser::new(self.data))
    }
}
