//! Module Info Streams
//!
//! Each module (compiland) may have a Module Stream. It contains:
//!
//! * a 4-byte CodeView signature
//! * symbol records (`sym_byte_size - 4` bytes)
//! * C11 line data, which is obsolete and is skipped
//! * C13 line data
//! * global refs, which are not used here

use crate::dbi::ModuleInfo;
use anyhow::bail;
use bstr::BString;
use ms_codeview::syms::{Sym, SymIter};
use ms_pdb_msf::BlockMappedStream;
use tracing::warn;

/// The expected value of the signature at the start of a module symbol stream.
pub const CV_SIGNATURE_C13: u32 = 4;

/// The parts of a Module Info record that outlive the DBI stream borrow.
#[derive(Clone, Debug)]
pub struct ModuleDescriptor {
    /// Zero-based module index.
    pub index: u16,
    /// The module name; usually the object file path.
    pub module_name: BString,
    /// The object file or static library that contributed this module.
    pub obj_file: BString,
    /// The Module Stream, if the module has one.
    pub stream: Option<u32>,
    /// Size of the symbol substream, including the signature.
    pub sym_byte_size: u32,
    /// Size of the obsolete C11 line substream.
    pub c11_byte_size: u32,
    /// Size of the C13 line substream.
    pub c13_byte_size: u32,
}

impl ModuleDescriptor {
    /// Copies the fields out of a Module Info record.
    pub fn new(index: u16, info: &ModuleInfo<'_>) -> Self {
        Self {
            index,
            module_name: info.module_name().to_owned(),
            obj_file: info.obj_file().to_owned(),
            stream: info.stream(),
            sym_byte_size: info.sym_size(),
            c11_byte_size: info.c11_size(),
            c13_byte_size: info.c13_size(),
        }
    }
}

/// Provides access to the contents of one Module Stream.
pub struct ModuleStream<'a> {
    stream: BlockMappedStream<'a>,
    sym_byte_size: u32,
    c11_byte_size: u32,
    c13_byte_size: u32,
}

impl<'a> ModuleStream<'a> {
    /// Validates the substream sizes against the stream length.
    pub fn new(module: &ModuleDescriptor, stream: BlockMappedStream<'a>) -> anyhow::Result<Self> {
        let total = module.sym_byte_size as u64
            + module.c11_byte_size as u64
            + module.c13_byte_size as u64;
        if total > stream.len() as u64 {
            bail!(
                "Module {} has substream sizes that exceed the size of its stream ({total} > {})",
                module.index,
                stream.len()
            );
        }

        if module.sym_byte_size >= 4 {
            let mut sig = [0u8; 4];
            stream.read_into(0, &mut sig)?;
            let sig = u32::from_le_bytes(sig);
            if sig != CV_SIGNATURE_C13 {
                warn!(
                    module = module.index,
                    sig,
                    "module symbol stream has an unexpected signature"
                );
            }
        }

        Ok(Self {
            stream,
            sym_byte_size: module.sym_byte_size,
            c11_byte_size: module.c11_byte_size,
            c13_byte_size: module.c13_byte_size,
        })
    }

    /// The symbol records, without the leading signature.
    pub fn symbols_bytes(&self) -> anyhow::Result<&[u8]> {
        if self.sym_byte_size < 4 {
            return Ok(&[]);
        }
        Ok(self.stream.read_bytes(4, self.sym_byte_size - 4)?)
    }

    /// Iterates the symbol records with their offsets. Offsets count from the start of the
    /// stream, so they include the signature; this is how other records refer to them.
    pub fn iter_syms(&self) -> anyhow::Result<impl Iterator<Item = (u32, Sym<'_>)>> {
        Ok(SymIter::new(self.symbols_bytes()?).with_offsets(4))
    }

    /// Decodes the symbol record at `offset`.
    pub fn symbol_at(&self, offset: u32) -> anyhow::Result<Sym<'_>> {
        let bytes = self.symbols_bytes()?;
        let Some(rest) = offset.checked_sub(4).and_then(|o| bytes.get(o as usize..)) else {
            bail!("Symbol offset {offset} is out of range for this module");
        };
        let Some(sym) = SymIter::one(rest) else {
            bail!("Failed to decode the symbol record at offset {offset}");
        };
        Ok(sym)
    }

    /// The C13 Line Data substream.
    pub fn c13_line_data_bytes(&self) -> anyhow::Result<&[u8]> {
        Ok(self
            .stream
            .read_bytes(self.sym_byte_size + self.c11_byte_size, self.c13_byte_size)?)
    }
}
