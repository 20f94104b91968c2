//! Global Symbol Stream
//!
//! The Global Symbol Stream contains a sequence of variable-length symbol records. This stream does
//! not have a header of any kind; all of the stream data consists of CodeView symbol records.
//!
//! The GSS does not have a fixed stream number. The stream number is found in the DBI Stream
//! Header.
//!
//! Records are addressed by byte offset. Name lookups use an index that is built by the first
//! lookup, with one pass over the stream.

use anyhow::bail;
use bstr::{BStr, BString};
use ms_codeview::syms::{Sym, SymIter, SymKind};
use ms_pdb_msf::BlockMappedStream;
use std::cell::OnceCell;
use std::collections::HashMap;
use tracing::debug;

/// Contains the Global Symbol Stream (GSS).
pub struct GlobalSymbols<'a> {
    stream: Option<BlockMappedStream<'a>>,
    name_index: OnceCell<HashMap<BString, Vec<u32>>>,
}

impl<'a> GlobalSymbols<'a> {
    /// Wraps the stream. This does not validate the contents.
    pub fn new(stream: BlockMappedStream<'a>) -> Self {
        Self {
            stream: Some(stream),
            name_index: OnceCell::new(),
        }
    }

    /// A global symbol stream with no records. Used when the PDB does not have one.
    pub fn empty() -> Self {
        Self {
            stream: None,
            name_index: OnceCell::new(),
        }
    }

    /// Gets the symbol record at a given byte offset.
    ///
    /// This function validates `record_offset`. If it is out of range, this function will return
    /// `Err` instead of panicking.
    pub fn record_at(&self, record_offset: u32) -> anyhow::Result<Sym<'_>> {
        let Some(stream) = &self.stream else {
            bail!(
                "Invalid record offset into GSS: {record_offset}. The PDB has no global symbols."
            );
        };

        let mut len_buf = [0u8; 2];
        stream.read_into(record_offset, &mut len_buf)?;
        let record_len = u16::from_le_bytes(len_buf) as u32;
        let record_bytes = stream.read_bytes(record_offset, record_len + 2)?;

        let Some(sym) = SymIter::one(record_bytes) else {
            bail!(
                "Invalid record offset into GSS: {record_offset}. Failed to decode symbol data at that offset."
            );
        };

        Ok(sym)
    }

    /// Iterates the records of the stream, together with their byte offsets.
    pub fn iter(&self) -> anyhow::Result<impl Iterator<Item = (u32, Sym<'_>)>> {
        let bytes: &[u8] = match &self.stream {
            Some(stream) => stream.read_bytes_to_end(0)?,
            None => &[],
        };
        Ok(SymIter::new(bytes).with_offsets(0))
    }

    /// Finds the records with the given name, in stream order. Only kinds that can be looked up
    /// by name are indexed: data, thread data, constants, and procedure references.
    pub fn find_records_by_name(&self, name: &str) -> &[u32] {
        let index = self.name_index.get_or_init(|| self.build_name_index());
        index
            .get(BStr::new(name))
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    fn build_name_index(&self) -> HashMap<BString, Vec<u32>> {
        let mut index: HashMap<BString, Vec<u32>> = HashMap::new();

        let iter = match self.iter() {
            Ok(iter) => iter,
            Err(e) => {
                debug!("cannot read global symbols: {e:?}");
                return index;
            }
        };

        for (offset, sym) in iter {
            if !is_named_global(sym.kind) {
                continue;
            }
            let Ok(data) = sym.parse() else {
                continue;
            };
            if let Some(name) = data.name() {
                index.entry(name.to_owned()).or_default().push(offset);
            }
        }

        debug!(num_names = index.len(), "built global symbol name index");
        index
    }
}

fn is_named_global(kind: SymKind) -> bool {
    matches!(
        kind,
        SymKind::S_GDATA32
            | SymKind::S_LDATA32
            | SymKind::S_GTHREAD32
            | SymKind::S_LTHREAD32
            | SymKind::S_CONSTANT
            | SymKind::S_PROCREF
            | SymKind::S_LPROCREF
    )
}
