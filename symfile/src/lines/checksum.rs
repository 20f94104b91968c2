//! Code for the `FILE_CHECKSUMS` subsection.

use super::*;
use anyhow::bail;

/// The hash algorithm used for the checksum.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    IntoBytes,
    FromBytes,
    Unaligned,
    KnownLayout,
    Immutable,
)]
#[repr(transparent)]
pub struct ChecksumKind(pub u8);

impl ChecksumKind {
    /// No checksum at all
    pub const NONE: ChecksumKind = ChecksumKind(0);
    /// MD-5 checksum. See `/ZH:MD5` for MSVC.
    pub const MD5: ChecksumKind = ChecksumKind(1);
    /// SHA-1 checksum. See `/ZH:SHA1` for MSVC
    pub const SHA_1: ChecksumKind = ChecksumKind(2);
    /// SHA-256 checksum.  See `/ZH:SHA_256` for MSVC.
    pub const SHA_256: ChecksumKind = ChecksumKind(3);
}

impl std::fmt::Debug for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        static NAMES: [&str; 4] = ["NONE", "MD5", "SHA_1", "SHA_256"];

        if let Some(name) = NAMES.get(self.0 as usize) {
            f.write_str(name)
        } else {
            write!(f, "??({})", self.0)
        }
    }
}

/// The fixed-size header of a `FileChecksum` record.
#[derive(IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct FileChecksumHeader {
    /// Offset of the file name in `/names`.
    pub name: U32<LE>,
    /// Number of checksum bytes that follow this header.
    pub checksum_size: u8,
    /// The hash algorithm.
    pub checksum_kind: ChecksumKind,
}

/// One record in the `FILE_CHECKSUMS` subsection.
pub struct FileChecksum<'a> {
    #[allow(missing_docs)]
    pub header: &'a FileChecksumHeader,
    #[allow(missing_docs)]
    pub checksum_data: &'a [u8],
}

impl<'a> FileChecksum<'a> {
    /// The name of the file, as an offset into `/names`.
    pub fn name(&self) -> crate::names::NameIndex {
        crate::names::NameIndex(self.header.name.get())
    }
}

/// The File Checksums Subsection
///
/// The file checksums subsection contains records for the source files referenced by Line Data.
pub struct FileChecksumsSubsection<'a> {
    #[allow(missing_docs)]
    pub bytes: &'a [u8],
}

impl<'a> FileChecksumsSubsection<'a> {
    #[allow(missing_docs)]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Iterates the `FileChecksum` records within this subsection.
    pub fn iter(&self) -> FileChecksumIter<'a> {
        FileChecksumIter { bytes: self.bytes }
    }

    /// Given a file index, which is a byte offset into the `FileChecksums` section, gets a
    /// `FileChecksum` value.
    pub fn get_file(&self, file_index: u32) -> anyhow::Result<FileChecksum<'a>> {
        if let Some(b) = self.bytes.get(file_index as usize..) {
            if let Some(c) = FileChecksumIter::new(b).next() {
                Ok(c)
            } else {
                bail!("failed to decode FileChecksum record");
            }
        } else {
            bail!("file index is out of range of file checksums subsection");
        }
    }
}

/// Iterates `FileChecksum` records. Each record is padded to a multiple of 4 bytes.
pub struct FileChecksumIter<'a> {
    bytes: &'a [u8],
}

impl<'a> FileChecksumIter<'a> {
    /// Starts iteration
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl<'a> Iterator for FileChecksumIter<'a> {
    type Item = FileChecksum<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() {
            return None;
        }

        let mut p = Parser::new(self.bytes);
        let Ok(header) = p.get::<FileChecksumHeader>() else {
            warn!("failed to decode FileChecksum header");
            return None;
        };
        let Ok(checksum_data) = p.bytes(header.checksum_size as usize) else {
            warn!("FileChecksum record is truncated");
            return None;
        };

        let record_len = size_of::<FileChecksumHeader>() + checksum_data.len();
        let alignment_len = (4 - (record_len & 3)) & 3;
        let _ = p.skip(alignment_len);
        self.bytes = p.take_rest();

        Some(FileChecksum {
            header,
            checksum_data,
        })
    }
}
