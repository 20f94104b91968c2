//! The parsed streams of a PDB, and the address maps built from them.
//!
//! `PdbIndex` reads the small streams (PDBI, DBI, `/names`, section headers) eagerly when the
//! file is opened. The TPI, IPI, and global symbols are wrapped but not scanned. Module streams
//! are opened on first use and stay open for the life of the index.

use crate::dbi::{DbiStream, SectionContribEntry};
use crate::dbi::optional_dbg::{OptionalDebugStream, SectionHeader, parse_section_headers};
use crate::globals::GlobalSymbols;
use crate::modi::{ModuleDescriptor, ModuleStream};
use crate::names::{EMPTY_NAMES_STREAM_DATA, NAMES_STREAM_NAME, NamesStream};
use crate::options::SymbolFileOptions;
use crate::pdbi::PdbiStream;
use crate::stream_index::Stream;
use crate::tpi::{TypeStream, TypeStreamKind};
use anyhow::bail;
use elsa::FrozenMap;
use ms_codeview::syms::{SymData, SymKind};
use ms_pdb_msf::Msf;
use std::cell::OnceCell;
use tracing::{debug, trace, warn};

/// A range of virtual addresses that was contributed by one module.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct VaRange {
    start: u64,
    end: u64,
    modi: u16,
}

/// Provides access to the streams of a PDB.
pub struct PdbIndex<'a> {
    msf: Msf<'a>,
    options: SymbolFileOptions,
    pdbi: PdbiStream,
    dbi: DbiStream,
    tpi: TypeStream<'a>,
    ipi: TypeStream<'a>,
    names: NamesStream<Vec<u8>>,
    globals: GlobalSymbols<'a>,
    section_headers: Vec<SectionHeader>,
    modules: Vec<ModuleDescriptor>,

    module_streams: FrozenMap<u16, Box<ModuleStream<'a>>>,

    /// Section contributions converted to virtual addresses, sorted by start address.
    va_ranges: OnceCell<Vec<VaRange>>,
}

impl<'a> PdbIndex<'a> {
    /// Parses the MSF container in `image` and reads the streams that every query needs.
    pub fn open(image: &'a [u8], options: SymbolFileOptions) -> anyhow::Result<Self> {
        let msf = Msf::parse(image)?;

        let pdbi = PdbiStream::parse(&msf.read_stream_to_vec(Stream::PDB.into())?)?;

        let dbi_data = if msf.is_stream_valid(Stream::DBI.into()) {
            msf.read_stream_to_vec(Stream::DBI.into())?
        } else {
            Vec::new()
        };
        let dbi = DbiStream::parse(dbi_data)?;

        let tpi = match msf.open_optional_stream(Stream::TPI.into())? {
            Some(s) => TypeStream::parse(TypeStreamKind::TPI, s)?,
            None => TypeStream::empty(TypeStreamKind::TPI),
        };
        let ipi = match msf.open_optional_stream(Stream::IPI.into())? {
            Some(s) => TypeStream::parse(TypeStreamKind::IPI, s)?,
            None => TypeStream::empty(TypeStreamKind::IPI),
        };

        let names = match pdbi.named_streams().get(NAMES_STREAM_NAME) {
            Some(s) => NamesStream::parse(msf.read_stream_to_vec(s)?)?,
            None => {
                debug!("PDB has no /names stream");
                NamesStream::parse(EMPTY_NAMES_STREAM_DATA.to_vec())?
            }
        };

        let globals = match dbi.global_symbol_stream() {
            Some(s) => match msf.open_optional_stream(s)? {
                Some(stream) => GlobalSymbols::new(stream),
                None => GlobalSymbols::empty(),
            },
            None => GlobalSymbols::empty(),
        };

        let section_headers = match dbi
            .optional_debug_header()?
            .stream(OptionalDebugStream::SECTION_HEADER_DATA)
        {
            Some(s) if msf.is_stream_valid(s) => {
                parse_section_headers(&msf.read_stream_to_vec(s)?)?
            }
            _ => {
                warn!("PDB has no section headers; addresses cannot be computed");
                Vec::new()
            }
        };

        let mut modules = Vec::new();
        for (i, module) in dbi.iter_modules().enumerate() {
            let Ok(i) = u16::try_from(i) else {
                bail!("The DBI stream has too many modules");
            };
            modules.push(ModuleDescriptor::new(i, &module));
        }

        debug!(
            num_modules = modules.len(),
            num_sections = section_headers.len(),
            num_types = tpi.num_types(),
            num_items = ipi.num_types(),
            "opened PDB"
        );

        Ok(Self {
            msf,
            options,
            pdbi,
            dbi,
            tpi,
            ipi,
            names,
            globals,
            section_headers,
            modules,
            module_streams: FrozenMap::new(),
            va_ranges: OnceCell::new(),
        })
    }

    /// The options that the index was opened with.
    pub fn options(&self) -> &SymbolFileOptions {
        &self.options
    }

    /// The PDB Information Stream.
    pub fn pdbi(&self) -> &PdbiStream {
        &self.pdbi
    }

    /// The DBI Stream.
    pub fn dbi(&self) -> &DbiStream {
        &self.dbi
    }

    /// The Type Stream.
    pub fn tpi(&self) -> &TypeStream<'a> {
        &self.tpi
    }

    /// The Id Stream.
    pub fn ipi(&self) -> &TypeStream<'a> {
        &self.ipi
    }

    /// The `/names` stream. This is an empty string table if the PDB has none.
    pub fn names(&self) -> &NamesStream<Vec<u8>> {
        &self.names
    }

    /// The Global Symbol Stream.
    pub fn globals(&self) -> &GlobalSymbols<'a> {
        &self.globals
    }

    /// The section headers of the executable.
    pub fn section_headers(&self) -> &[SectionHeader] {
        &self.section_headers
    }

    /// All modules listed in the DBI, including the linker module.
    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Gets one module descriptor.
    pub fn module(&self, modi: u16) -> Option<&ModuleDescriptor> {
        self.modules.get(modi as usize)
    }

    /// Converts a section:offset pair to a virtual address, including the load address.
    /// Returns `None` if the section does not exist. Sections are numbered from 1.
    pub fn make_virtual_address(&self, segment: u16, offset: u32) -> Option<u64> {
        let header = self.section_headers.get((segment as usize).checked_sub(1)?)?;
        Some(
            self.options
                .load_address
                .wrapping_add(header.virtual_address.get() as u64)
                .wrapping_add(offset as u64),
        )
    }

    /// Finds the module whose section contributions contain `va`.
    pub fn module_index_for_va(&self, va: u64) -> Option<u16> {
        let ranges = self.va_ranges.get_or_init(|| self.build_va_ranges());
        let n = ranges.partition_point(|r| r.start <= va);
        let r = ranges.get(n.checked_sub(1)?)?;
        if va < r.end { Some(r.modi) } else { None }
    }

    fn build_va_ranges(&self) -> Vec<VaRange> {
        let contribs: Vec<SectionContribEntry> = match self.dbi.section_contributions() {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to read section contributions: {e:#}");
                Vec::new()
            }
        };

        let mut ranges: Vec<VaRange> = contribs
            .iter()
            .filter_map(|c| {
                let size = u64::try_from(c.size.get()).ok().filter(|&s| s != 0)?;
                let offset = u32::try_from(c.offset.get()).ok()?;
                let start = self.make_virtual_address(c.section.get(), offset)?;
                let end = start.checked_add(size)?;
                Some(VaRange {
                    start,
                    end,
                    modi: c.module_index.get(),
                })
            })
            .collect();
        ranges.sort_unstable_by_key(|r| r.start);

        debug!(num_ranges = ranges.len(), "built address to module map");
        ranges
    }

    /// Opens the stream of module `modi`. Returns `Ok(None)` if the module has no stream.
    pub fn module_stream(&self, modi: u16) -> anyhow::Result<Option<&ModuleStream<'a>>> {
        if let Some(ms) = self.module_streams.get(&modi) {
            return Ok(Some(ms));
        }

        let Some(desc) = self.modules.get(modi as usize) else {
            bail!("Module index {modi} is out of range");
        };
        let Some(stream) = desc.stream else {
            return Ok(None);
        };

        let ms = ModuleStream::new(desc, self.msf.open_stream(stream)?)?;
        trace!(modi, stream, "opened module stream");
        Ok(Some(self.module_streams.insert(modi, Box::new(ms))))
    }

    /// Finds the innermost procedure in module `modi` whose code contains `va`. Returns the
    /// offset of the `S_GPROC32` / `S_LPROC32` record.
    pub fn find_procedure_at(&self, modi: u16, va: u64) -> anyhow::Result<Option<u32>> {
        let Some(ms) = self.module_stream(modi)? else {
            return Ok(None);
        };

        // Nested procedures follow their parent, so the last match is the innermost one.
        let mut found = None;
        for (offset, sym) in ms.iter_syms()? {
            if !is_proc_kind(sym.kind) {
                continue;
            }
            let Ok(SymData::Proc(proc)) = sym.parse() else {
                continue;
            };
            let os = &proc.fixed.offset_segment;
            let Some(start) = self.make_virtual_address(os.segment(), os.offset()) else {
                continue;
            };
            let len = proc.fixed.proc_len.get() as u64;
            if va.wrapping_sub(start) < len {
                found = Some(offset);
            }
        }
        Ok(found)
    }
}

/// True for the procedure records that define a function.
pub(crate) fn is_proc_kind(kind: SymKind) -> bool {
    matches!(
        kind,
        SymKind::S_GPROC32 | SymKind::S_LPROC32 | SymKind::S_GPROC32_ID | SymKind::S_LPROC32_ID
    )
}
