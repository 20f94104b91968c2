//! Decodes the Optional Debug Header Substream.
//!
//! This substream contains an array of stream indexes. The order of the array is significant;
//! each has a specific purpose. They are enumerated by the [`OptionalDebugStream`] type.
//!
//! # References
//! * <https://llvm.org/docs/PDB/DbiStream.html#id10>
//! * [`DBGTYPE` in `pdb.h`](https://github.com/microsoft/microsoft-pdb/blob/805655a28bd8198004be2ac27e6e0290121a5e89/langapi/include/pdb.h#L438)

use super::*;
use bstr::BStr;

/// Provides access to the Optional Debug Header.
pub struct OptionalDebugHeader<'a> {
    /// Raw access to the stream indexes
    pub stream_indexes: &'a [StreamIndexU16],
}

impl<'a> OptionalDebugHeader<'a> {
    /// Parses the Optional Debug Header Substream.
    pub fn parse(bytes: &'a [u8]) -> anyhow::Result<Self> {
        let Ok(stream_indexes) = <[StreamIndexU16]>::ref_from_bytes(bytes) else {
            bail!(
                "The OptionalDebugHeader has an invalid size. The size is required to be a multiple of 2. Size: {}",
                bytes.len()
            );
        };

        Ok(Self { stream_indexes })
    }

    /// Gets a stream index, given an index into the Optional Debug Header.
    pub fn stream_by_index(&self, i: usize) -> Option<u32> {
        self.stream_indexes.get(i)?.get()
    }

    /// Gets a stream index, given an identifier for a stream within the Optional Debug Header.
    pub fn stream(&self, s: OptionalDebugStream) -> Option<u32> {
        self.stream_by_index(s.0 as usize)
    }

    /// The number of stream indexes in the Optional Debug Header Substream.
    pub fn num_streams(&self) -> usize {
        self.stream_indexes.len()
    }
}

/// Identifies one of the Optional Debug Streams.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Ord, PartialOrd)]
pub struct OptionalDebugStream(pub u32);

#[allow(missing_docs)]
impl OptionalDebugStream {
    pub const FPO_DATA: Self = Self(0);
    pub const EXCEPTION_DATA: Self = Self(1);
    pub const FIXUP_DATA: Self = Self(2);
    pub const OMAP_TO_SRC_DATA: Self = Self(3);
    pub const OMAP_FROM_SRC_DATA: Self = Self(4);
    pub const SECTION_HEADER_DATA: Self = Self(5);
    pub const TOKEN_TO_RECORD_ID_MAP: Self = Self(6);
    pub const XDATA: Self = Self(7);
    pub const PDATA: Self = Self(8);
    pub const NEW_FPO_DATA: Self = Self(9);
    pub const ORIGINAL_SECTION_HEADER_DATA: Self = Self(10);
}

/// A COFF section header (`IMAGE_SECTION_HEADER`), as stored in the Section Header Data stream.
#[derive(Clone, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
#[allow(missing_docs)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: U32<LE>,
    pub virtual_address: U32<LE>,
    pub size_of_raw_data: U32<LE>,
    pub pointer_to_raw_data: U32<LE>,
    pub pointer_to_relocations: U32<LE>,
    pub pointer_to_linenumbers: U32<LE>,
    pub number_of_relocations: U16<LE>,
    pub number_of_linenumbers: U16<LE>,
    pub characteristics: U32<LE>,
}

static_assertions::const_assert_eq!(size_of::<SectionHeader>(), 40);

impl SectionHeader {
    /// The section name, without trailing NUL padding.
    pub fn name(&self) -> &BStr {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        BStr::new(&self.name[..len])
    }
}

/// Parses the contents of the Section Header Data stream.
pub fn parse_section_headers(bytes: &[u8]) -> anyhow::Result<Vec<SectionHeader>> {
    let Ok(headers) = <[SectionHeader]>::ref_from_bytes(bytes) else {
        bail!(
            "The section header stream has an invalid size. It is not a multiple of 40. Size: {}",
            bytes.len()
        );
    };
    Ok(headers.to_vec())
}
