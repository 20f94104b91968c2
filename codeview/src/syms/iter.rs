use super::*;
use tracing::error;

/// Iterates the records of a symbol stream.
#[derive(Clone)]
pub struct SymIter<'a> {
    data: &'a [u8],
}

impl<'a> SymIter<'a> {
    #[allow(missing_docs)]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Consumes the 4-byte CodeView signature at the start of a module symbol stream.
    pub fn get_signature(&mut self) -> Result<u32, ParserError> {
        let mut p = Parser::new(self.data);
        let sig = p.u32()?;
        self.data = p.take_rest();
        Ok(sig)
    }

    /// The bytes not yet consumed.
    pub fn rest(&self) -> &'a [u8] {
        self.data
    }

    /// Decodes the single record at the front of `data`.
    pub fn one(data: &'a [u8]) -> Option<Sym<'a>> {
        Self::new(data).next()
    }

    /// Pairs each record with its byte offset. `base` is the offset of the first record within
    /// its stream.
    pub fn with_offsets(self, base: u32) -> SymIterWithOffsets<'a> {
        let start_len = self.data.len();
        SymIterWithOffsets {
            inner: self,
            base,
            start_len,
        }
    }
}

impl<'a> Iterator for SymIter<'a> {
    type Item = Sym<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let mut p = Parser::new(self.data);
        let record_len = p.u16().ok()?;
        if record_len < 2 {
            error!(
                invalid_record_len = record_len,
                bytes_left = self.data.len(),
                "symbol record has an invalid length"
            );
            return None;
        }

        let kind = SymKind(p.u16().ok()?);
        let Ok(data) = p.bytes(record_len as usize - 2) else {
            error!(
                record_len,
                bytes_left = self.data.len(),
                "symbol record is truncated"
            );
            return None;
        };

        self.data = p.take_rest();
        Some(Sym { kind, data })
    }
}

/// See [`SymIter::with_offsets`].
#[derive(Clone)]
pub struct SymIterWithOffsets<'a> {
    inner: SymIter<'a>,
    base: u32,
    start_len: usize,
}

impl<'a> Iterator for SymIterWithOffsets<'a> {
    type Item = (u32, Sym<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.base + (self.start_len - self.inner.data.len()) as u32;
        let sym = self.inner.next()?;
        Some((offset, sym))
    }
}

#[test]
fn test_sym_iter() {
    #[rustfmt::skip]
    let data: &[u8] = &[
        // record 0, at 0x04
        /* 0x0000 */ 4, 0, 0, 0,                // signature
        /* 0x0004 */ 6, 0,                      // len
        /* 0x0006 */ 0x4c, 0x11,                // S_BUILDINFO
        /* 0x0008 */ 0x34, 0x12, 0, 0,          // item

        // record 1, at 0x0c
        /* 0x000c */ 2, 0,                      // len
        /* 0x000e */ 0x06, 0x00,                // S_END

        // record 2, invalid length
        /* 0x0010 */ 1, 0,
        /* 0x0012 */ 0xaa, 0xaa,
    ];

    let mut i = SymIter::new(data);
    assert_eq!(i.get_signature().unwrap(), 4);

    let mut i = i.with_offsets(4);
    let (off, s0) = i.next().unwrap();
    assert_eq!(off, 4);
    assert_eq!(s0.kind, SymKind::S_BUILDINFO);
    let SymData::BuildInfo(b) = s0.parse().unwrap() else { panic!("expected S_BUILDINFO") };
    assert_eq!(b.item, 0x1234);

    let (off, s1) = i.next().unwrap();
    assert_eq!(off, 0x0c);
    assert_eq!(s1.kind, SymKind::S_END);

    assert!(i.next().is_none());
}
