//! Provides access to the DBI Stream (Debug Information).
//!
//! The DBI Stream is a central data structure of the PDB. It contains many vital fields, and
//! points to other streams that contain other important information. The DBI is stream 3.
//!
//! Briefly, the DBI contains these substreams:
//!
//! * Modules: This lists the modules (compilands / translation units) that compose an executable.
//!   Each Module Info structure contains many important fields, including the stream number for
//!   a Module Stream.
//!
//! * Section Contributions Substream
//!
//! * Section Map Substream
//!
//! * Sources Substream
//!
//! * Type Server Map Substream
//!
//! * Edit-and-Continue Substream
//!
//! * Optional Debug Header Substream
//!
//! * <https://llvm.org/docs/PDB/DbiStream.html>
//! * <https://github.com/microsoft/microsoft-pdb/blob/805655a28bd8198004be2ac27e6e0290121a5e89/langapi/include/pdb.h#L860>

use crate::stream_index::{StreamIndexIsNilError, StreamIndexU16};
use anyhow::bail;
use ms_codeview::parser::Parser;
use std::mem::size_of;
use std::ops::Range;
use tracing::{error, warn};
use zerocopy::{FromBytes, I32, Immutable, IntoBytes, KnownLayout, LE, U16, U32, Unaligned};

pub mod modules;
pub mod optional_dbg;
pub mod section_contrib;

pub use modules::*;
#[doc(inline)]
pub use section_contrib::*;

/// The header of the DBI (Debug Information) stream.
#[repr(C)]
#[derive(IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned, Debug, Clone)]
#[allow(missing_docs)]
pub struct DbiStreamHeader {
    /// Always -1
    pub signature: I32<LE>,

    /// One of the `DBI_STREAM_VERSION_*` values; typically, `DBI_STREAM_VERSION_V110`.
    pub version: U32<LE>,

    /// The number of times this PDB has been modified. Matches the age in the PDBI.
    pub age: U32<LE>,

    /// The index of the Global Symbol Index, which contains a name-to-symbol lookup table for
    /// global symbols. The symbol records themselves are stored in the Global Symbol Stream.
    pub global_symbol_index_stream: StreamIndexU16,

    pub build_number: U16<LE>,

    /// The index of the stream that contains the Public Symbol Index.
    pub public_symbol_index_stream: StreamIndexU16,

    /// The version of the MSPDB DLL which produced this DBI stream.
    pub pdb_dll_version: U16<LE>,

    /// The stream that contains the Global Symbol Stream. This contains symbol records, which can
    /// be decoded using [`ms_codeview::syms::SymIter`].
    pub global_symbol_stream: StreamIndexU16,

    pub pdb_dll_rbld: U16<LE>,

    // Substreams
    pub mod_info_size: I32<LE>,
    pub section_contribution_size: I32<LE>,
    pub section_map_size: I32<LE>,
    pub source_info_size: I32<LE>,
    pub type_server_map_size: I32<LE>,
    /// This field is _not_ a substream size.
    pub mfc_type_server_index: U32<LE>,
    pub optional_dbg_header_size: I32<LE>,
    pub edit_and_continue_size: I32<LE>,

    pub flags: U16<LE>,
    pub machine: U16<LE>,
    pub padding: U32<LE>,
}

impl DbiStreamHeader {
    /// Gets the stream index for the Global Symbol Stream.
    pub fn sym_record_stream(&self) -> Result<u32, StreamIndexIsNilError> {
        self.global_symbol_stream.get_err()
    }
}

static_assertions::const_assert_eq!(size_of::<DbiStreamHeader>(), DBI_STREAM_HEADER_LEN);
const DBI_STREAM_HEADER_LEN: usize = 64;

/// MSVC version 7.0
pub const DBI_STREAM_VERSION_V70: u32 = 19990903;
/// MSVC version 11.0
pub const DBI_STREAM_VERSION_V110: u32 = 20091201;

/// Holds the DBI stream.
///
/// This type contains the _entire_ DBI stream, not just the header.
#[derive(Clone)]
pub struct DbiStream {
    /// The contents of the stream.
    pub stream_data: Vec<u8>,

    /// The byte ranges of the substreams.
    pub substreams: DbiSubstreamRanges,
}

// The DBI stream contains a fixed number of "substreams". The DBI header specifies the
// length of each substream.  The position of each substream is found by computing the
// sum of all previous substreams (and the header).
macro_rules! dbi_substreams {
    (
        $(
            $name:ident,
            $size_field:ident ;
        )*
    ) => {
        /// Contains the byte ranges of the substreams within the DBI stream.
        #[derive(Clone, Debug, Default)]
        pub struct DbiSubstreamRanges {
            $(
                #[doc = concat!("The range of the ", stringify!($name), " substream.")]
                pub $name: Range<usize>,
            )*
        }

        impl DbiStream {
            $(
                #[doc = concat!("The unparsed contents of the ", stringify!($name), " substream.")]
                pub fn $name(&self) -> &[u8] {
                    &self.stream_data[self.substreams.$name.clone()]
                }
            )*
        }

        impl DbiSubstreamRanges {
            pub(crate) fn from_sizes(sizes: &DbiStreamHeader, stream_len: usize) -> anyhow::Result<Self> {
                let mut pos: usize = DBI_STREAM_HEADER_LEN;
                if pos > stream_len {
                    bail!("DBI stream is too short; pos = {}, stream_len = {}", pos, stream_len);
                }

                $(
                    let size: i32 = sizes.$size_field.get();
                    if size < 0 {
                        bail!("Substream {} length in DBI header is invalid (is negative)", stringify!($size_field));
                    }

                    let len = size as usize;
                    let available = stream_len - pos;
                    if len > available {
                        bail!("Substream {} length in DBI header is invalid. It extends beyond the end of the stream.", stringify!($size_field));
                    }
                    let start = pos;
                    pos += len;

                    let $name = start..pos;
                )*

                if pos < stream_len {
                    warn!(pos, stream_len, "DBI stream has data after the last substream");
                } else if pos > stream_len {
                    error!(
                        pos,
                        stream_len,
                        "The sum of the DBI substream lengths exceeds the stream length"
                    );
                }

                Ok(Self {
                    $( $name, )*
                })
            }
        }
    }
}

dbi_substreams! {
    // The order of these determines the order of the substream data in the stream.
    modules_bytes, mod_info_size;
    section_contributions_bytes, section_contribution_size;
    section_map_bytes, section_map_size;
    source_info, source_info_size;
    type_server_map, type_server_map_size;
    edit_and_continue, edit_and_continue_size;
    optional_debug_header_bytes, optional_dbg_header_size;
}

impl DbiStream {
    /// Returns the DBI stream header, or `None` for an empty DBI stream.
    pub fn header(&self) -> Option<&DbiStreamHeader> {
        DbiStreamHeader::ref_from_prefix(&self.stream_data)
            .ok()
            .map(|(h, _)| h)
    }

    /// Read the DBI Stream header and validate it.
    pub fn parse(stream_data: Vec<u8>) -> anyhow::Result<Self> {
        if stream_data.is_empty() {
            return Ok(Self {
                substreams: Default::default(),
                stream_data,
            });
        }

        let mut p = Parser::new(&stream_data);
        let dbi_header: &DbiStreamHeader = p.get()?;

        if dbi_header.signature.get() != -1 {
            warn!(
                signature = dbi_header.signature.get(),
                "DBI stream has an unexpected signature"
            );
        }

        let substreams = DbiSubstreamRanges::from_sizes(dbi_header, stream_data.len())?;

        Ok(Self {
            stream_data,
            substreams,
        })
    }

    /// Iterates the Module records in the Module Information Substream.
    pub fn iter_modules(&self) -> IterModuleInfo<'_> {
        IterModuleInfo::new(self.modules_bytes())
    }

    /// Parses the Section Contributions Substream.
    pub fn section_contributions(&self) -> anyhow::Result<Vec<SectionContribEntry>> {
        section_contrib::parse_section_contributions(self.section_contributions_bytes())
    }

    /// Parses the Optional Debug Header Substream.
    pub fn optional_debug_header(&self) -> anyhow::Result<optional_dbg::OptionalDebugHeader<'_>> {
        optional_dbg::OptionalDebugHeader::parse(self.optional_debug_header_bytes())
    }

    /// The stream index of the Global Symbol Stream, if the PDB has one.
    pub fn global_symbol_stream(&self) -> Option<u32> {
        self.header()?.global_symbol_stream.get()
    }

    /// The DBI age, or 0 for an empty DBI stream.
    pub fn age(&self) -> u32 {
        self.header().map(|h| h.age.get()).unwrap_or(0)
    }
}
