//! Reads Multi-Stream Files (MSF). MSF is the underlying container format used by Program
//! Database (PDB) files.
//!
//! MSF files contain a set of numbered _streams_. Each stream is like a file; a stream is a
//! sequence of bytes.
//!
//! The bytes stored within a single stream are usually not stored sequentially on disk. The
//! organization of the file and the mapping from stream locations to MSF file locations is
//! similar to a traditional file system; managing that mapping is the main purpose of the MSF
//! file format.
//!
//! This crate works on a complete in-memory (or memory-mapped) image of the file. Streams are
//! opened as [`BlockMappedStream`] values, which hand out borrowed slices of the image whenever
//! the requested bytes are stored contiguously, and fall back to cached copies when they are not.
//!
//! # References
//! * <https://llvm.org/docs/PDB/index.html>
//! * <https://llvm.org/docs/PDB/MsfFile.html>
//! * <https://github.com/microsoft/microsoft-pdb>

#![forbid(unused_must_use)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::needless_lifetimes)]

mod block_stream;
mod open;
mod pages;

#[cfg(any(test, feature = "test-support"))]
pub mod test_image;


pub use block_stream::{BlockMappedStream, StreamError};

use anyhow::bail;
use pow2::{IntOnlyPow2, Pow2};
use std::mem::size_of;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U32, Unaligned};

use self::pages::num_pages_for_stream_size;

/// Identifies a page number in the MSF file.
type Page = u32;

const FPM_NUMBER_1: u32 = 1;
const FPM_NUMBER_2: u32 = 2;

/// The value of `magic` for "big" MSF files.
pub const MSF_BIG_MAGIC: [u8; 32] = *b"Microsoft C/C++ MSF 7.00\r\n\x1a\x44\x53\x00\x00\x00";

/// This identifies MSF files before the transition to "big" MSF files.
pub const MSF_SMALL_MAGIC: [u8; 0x2c] =
    *b"Microsoft C/C++ program database 2.00\r\n\x1a\x4a\x47\0\0";

/// The header of the PDB/MSF file. This is at file offset 0.
#[derive(IntoBytes, FromBytes, Unaligned, KnownLayout, Immutable)]
#[repr(C)]
pub struct MsfHeader {
    /// Identifies this file as a PDB.
    pub magic: [u8; 32],

    /// The size of each page, in bytes.
    pub page_size: U32<LE>,

    /// Page number of the active FPM. This can only be 1 or 2.
    pub active_fpm: U32<LE>,

    /// The number of pages in this MSF file.
    pub num_pages: U32<LE>,

    /// Size of the Stream Directory, in bytes.
    pub stream_dir_size: U32<LE>,

    /// Only used by the "Small MSF" encoding. Expected to be zero.
    pub stream_dir_small_page_map: U32<LE>,
    // For "Big MSF", an array of u32 page numbers immediately follows the header. These pages
    // contain the page numbers of the Stream Directory.
}

/// The length of the MSF File Header.
pub const MSF_HEADER_LEN: usize = size_of::<MsfHeader>();

/// The byte offset of the stream directory page map.
const STREAM_DIR_PAGE_MAP_FILE_OFFSET: usize = MSF_HEADER_LEN;
static_assertions::const_assert_eq!(MSF_HEADER_LEN, 52);

/// The minimum page size.
pub const MIN_PAGE_SIZE: PageSize = PageSize::from_exponent(9);

/// The default page size.
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize::from_exponent(12);

/// The largest supported page size.
pub const MAX_PAGE_SIZE: PageSize = PageSize::from_exponent(16);

/// This size is used to mark a stream as "invalid". An invalid stream is different from a
/// stream with a length of zero bytes.
pub const NIL_STREAM_SIZE: u32 = 0xffff_ffff;

/// Specifies a page size used in an MSF file. This value is always a power of 2.
pub type PageSize = Pow2;

/// The stream index of the Stream Directory stream. This is reserved and cannot be used by
/// applications.
pub const STREAM_DIR_STREAM: u32 = 0;

/// Converts a page number to a file offset.
fn page_to_offset(page: u32, page_size: PageSize) -> u64 {
    (page as u64) << page_size.exponent()
}

/// Gets the byte offset within a page, for a given offset within a stream.
pub fn offset_within_page(offset: u32, page_size: PageSize) -> u32 {
    let page_low_mask = (1u32 << page_size.exponent()) - 1u32;
    offset & page_low_mask
}

/// Provides read access to the streams of an MSF file image.
pub struct Msf<'a> {
    /// The whole file.
    image: &'a [u8],

    page_size: PageSize,

    /// Page number of the active FPM, 1 or 2.
    active_fpm: u32,

    num_pages: u32,

    /// The size of each stream. Stream 0 is always reported as zero-length.
    stream_sizes: Vec<u32>,

    /// The pages of all streams, concatenated.
    stream_pages: Vec<Page>,

    /// `stream_pages[stream_page_starts[s]..stream_page_starts[s + 1]]` are the pages of
    /// stream `s`. The length of this vector is `num_streams + 1`.
    stream_page_starts: Vec<u32>,
}

impl<'a> Msf<'a> {
    /// The page size of the file.
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// Page number of the active Free Page Map.
    pub fn active_fpm(&self) -> u32 {
        self.active_fpm
    }

    /// The number of pages in the file, as recorded in the header.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// The number of streams, including stream 0.
    pub fn num_streams(&self) -> u32 {
        self.stream_sizes.len() as u32
    }

    /// The complete image that this MSF was parsed from.
    pub fn image(&self) -> &'a [u8] {
        self.image
    }

    /// Returns the size of a stream, or 0 if the stream is nil or does not exist.
    pub fn stream_size(&self, stream: u32) -> u32 {
        match self.stream_sizes.get(stream as usize) {
            Some(&NIL_STREAM_SIZE) | None => 0,
            Some(&size) => size,
        }
    }

    /// Returns `true` if `stream` exists and is not nil.
    pub fn is_stream_valid(&self, stream: u32) -> bool {
        matches!(self.stream_sizes.get(stream as usize), Some(&size) if size != NIL_STREAM_SIZE)
    }

    /// Returns the size and the page list of a stream.
    pub fn stream_size_and_pages(&self, stream: u32) -> anyhow::Result<(u32, &[Page])> {
        let Some(&size) = self.stream_sizes.get(stream as usize) else {
            bail!("Stream index {stream} is out of range");
        };

        if size == NIL_STREAM_SIZE {
            bail!("Stream {stream} is a nil stream");
        }

        let start = self.stream_page_starts[stream as usize] as usize;
        let end = self.stream_page_starts[stream as usize + 1] as usize;
        Ok((size, &self.stream_pages[start..end]))
    }

    /// Opens a stream for reading.
    pub fn open_stream(&self, stream: u32) -> anyhow::Result<BlockMappedStream<'a>> {
        let (size, pages) = self.stream_size_and_pages(stream)?;
        BlockMappedStream::new(self.image, self.page_size, pages.to_vec(), size)
    }

    /// Opens a stream, or returns `None` if the stream is nil or does not exist.
    pub fn open_optional_stream(
        &self,
        stream: u32,
    ) -> anyhow::Result<Option<BlockMappedStream<'a>>> {
        if self.is_stream_valid(stream) {
            Ok(Some(self.open_stream(stream)?))
        } else {
            Ok(None)
        }
    }

    /// Reads an entire stream into a vector.
    pub fn read_stream_to_vec(&self, stream: u32) -> anyhow::Result<Vec<u8>> {
        let s = self.open_stream(stream)?;
        let mut buffer = vec![0u8; s.len() as usize];
        s.read_into(0, &mut buffer)?;
        Ok(buffer)
    }
}
