//! DBI Section Contribution Substream
//!
//! The Section Contributions Substream describes the COFF sections that contributed to a linked
//! binary. Each contribution is a range of a section that came from one module, which makes this
//! table the way to map an address back to the module that defines it.
//!
//! # References
//! * [`SC2` in `dbicommon.h`](https://github.com/microsoft/microsoft-pdb/blob/805655a28bd8198004be2ac27e6e0290121a5e89/PDB/include/dbicommon.h#L107)

use super::*;

/// Describes one section contribution.
#[allow(missing_docs)]
#[derive(Unaligned, IntoBytes, FromBytes, Immutable, KnownLayout, Clone, Debug)]
#[repr(C)]
pub struct SectionContribEntry {
    /// The 1-based section index
    pub section: U16<LE>,
    /// Alignment padding
    pub padding1: [u8; 2],
    pub offset: I32<LE>,
    pub size: I32<LE>,
    pub characteristics: U32<LE>,
    /// The zero-based module index of the module containing this section contribution.
    pub module_index: U16<LE>,
    /// Alignment padding
    pub padding2: [u8; 2],
    pub data_crc: U32<LE>,
    pub reloc_crc: U32<LE>,
}

/// Describes one section contribution, in the V2 format.
#[allow(missing_docs)]
#[derive(Unaligned, IntoBytes, FromBytes, Immutable, KnownLayout, Clone, Debug)]
#[repr(C)]
pub struct SectionContribEntry2 {
    pub base: SectionContribEntry,
    pub coff_section: U32<LE>,
}

impl SectionContribEntry {
    /// Tests whether `offset` falls within this section contribution.
    pub fn contains_offset(&self, offset: i32) -> bool {
        let self_offset = self.offset.get();
        if offset < self_offset {
            return false;
        }

        let overshoot = offset - self_offset;
        if overshoot >= self.size.get() {
            return false;
        }

        true
    }
}

/// Version 6.0 of the Section Contributions Substream.
pub const SECTION_CONTRIBUTIONS_SUBSTREAM_VER60: u32 = 0xeffe0000 + 19970605;

/// Version 2 of the Section Contributions Substream. Each entry carries a COFF section number.
pub const SECTION_CONTRIBUTIONS_SUBSTREAM_V2: u32 = 0xeffe0000 + 20140516;

/// Parses the Section Contributions Substream.
///
/// It is legal for a Section Contributions Substream to be entirely empty.
pub fn parse_section_contributions(bytes: &[u8]) -> anyhow::Result<Vec<SectionContribEntry>> {
    let mut p = Parser::new(bytes);
    if p.is_empty() {
        return Ok(Vec::new());
    }

    let version = p.u32()?;
    let records_bytes = p.take_rest();

    match version {
        SECTION_CONTRIBUTIONS_SUBSTREAM_VER60 => {
            let Ok(contribs) = <[SectionContribEntry]>::ref_from_bytes(records_bytes) else {
                bail!(
                    "The Section Contributions stream has an invalid size. It is not a multiple of the section contribution record size.  Size: 0x{:x}",
                    bytes.len()
                );
            };
            Ok(contribs.to_vec())
        }

        SECTION_CONTRIBUTIONS_SUBSTREAM_V2 => {
            let Ok(contribs) = <[SectionContribEntry2]>::ref_from_bytes(records_bytes) else {
                bail!(
                    "The Section Contributions stream has an invalid size. It is not a multiple of the section contribution record size.  Size: 0x{:x}",
                    bytes.len()
                );
            };
            Ok(contribs.iter().map(|c| c.base.clone()).collect())
        }

        _ => {
            bail!(
                "The Section Contributions Substream has a version number that is not supported. Version: 0x{:08x}",
                version
            );
        }
    }
}
