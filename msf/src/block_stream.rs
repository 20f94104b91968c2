//! Random-access reads of a stream stored in the pages of an MSF image.

use super::*;
use crate::pages::StreamPageMapper;
use elsa::FrozenMap;
use std::cell::Cell;
use std::fmt;
use tracing::trace;

/// Errors reported when reading from a [`BlockMappedStream`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StreamError {
    /// The requested range extends past the end of the stream.
    InsufficientBuffer {
        /// Offset of the request within the stream.
        offset: u32,
        /// Size of the request.
        size: u32,
        /// Length of the stream.
        stream_len: u32,
    },

    /// A page of the stream lies outside of the MSF image.
    InvalidPage {
        /// The page number.
        page: u32,
    },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InsufficientBuffer {
                offset,
                size,
                stream_len,
            } => write!(
                f,
                "The stream is too small for the request (offset 0x{offset:x}, size 0x{size:x}, \
                 stream length 0x{stream_len:x})"
            ),
            Self::InvalidPage { page } => {
                write!(f, "Stream page {page} is beyond the end of the file")
            }
        }
    }
}

impl std::error::Error for StreamError {}

/// A stream of an MSF file, viewed as a flat range of bytes.
///
/// [`BlockMappedStream::read_bytes`] returns a slice that borrows directly from the MSF image
/// when every page spanned by the request is stored contiguously. Otherwise, the bytes are
/// gathered into a buffer that is owned by this object and cached by `(offset, size)`, so that
/// repeating a request returns the same buffer without copying again.
pub struct BlockMappedStream<'a> {
    image: &'a [u8],
    page_size: PageSize,
    pages: Vec<Page>,
    len: u32,

    /// Buffers that hold the contents of non-contiguous requests, keyed by `(offset, size)`.
    copies: FrozenMap<(u32, u32), Box<[u8]>>,

    /// Total number of bytes copied out of the image.
    bytes_copied: Cell<u64>,
}

impl<'a> BlockMappedStream<'a> {
    /// Creates a stream view. The number of pages must match the stream length.
    pub fn new(
        image: &'a [u8],
        page_size: PageSize,
        pages: Vec<Page>,
        len: u32,
    ) -> anyhow::Result<Self> {
        if len == NIL_STREAM_SIZE {
            bail!("Cannot map a nil stream");
        }

        let num_pages = num_pages_for_stream_size(len, page_size);
        if num_pages as usize != pages.len() {
            bail!(
                "Stream has length {len}, which requires {num_pages} pages, but {} pages were provided",
                pages.len()
            );
        }

        Ok(Self {
            image,
            page_size,
            pages,
            len,
            copies: FrozenMap::new(),
            bytes_copied: Cell::new(0),
        })
    }

    /// The length of the stream, in bytes.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns `true` if the stream has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The pages that store this stream.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Total number of bytes that have been copied out of the image by this stream.
    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied.get()
    }

    /// Number of non-contiguous requests whose contents are cached.
    pub fn num_cached_runs(&self) -> usize {
        self.copies.len()
    }

    fn check_bounds(&self, offset: u32, size: u32) -> Result<(), StreamError> {
        match offset.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(StreamError::InsufficientBuffer {
                offset,
                size,
                stream_len: self.len,
            }),
        }
    }

    /// Returns `size` bytes of the stream, starting at `offset`.
    ///
    /// A request for zero bytes always succeeds (within bounds) and returns an empty slice.
    pub fn read_bytes(&self, offset: u32, size: u32) -> Result<&[u8], StreamError> {
        self.check_bounds(offset, size)?;

        if size == 0 {
            return Ok(&[]);
        }

        if let Some(run) = self.contiguous_run(offset, size)? {
            return Ok(run);
        }

        if let Some(cached) = self.copies.get(&(offset, size)) {
            return Ok(cached);
        }

        trace!(offset, size, "copying non-contiguous stream range");
        let mut buffer = vec![0u8; size as usize].into_boxed_slice();
        self.copy_out(offset, &mut buffer)?;
        Ok(self.copies.insert((offset, size), buffer))
    }

    /// Returns the remainder of the stream, starting at `offset`.
    pub fn read_bytes_to_end(&self, offset: u32) -> Result<&[u8], StreamError> {
        let size = self.len.checked_sub(offset).ok_or(StreamError::InsufficientBuffer {
            offset,
            size: 0,
            stream_len: self.len,
        })?;
        self.read_bytes(offset, size)
    }

    /// Reads a fixed-size structure at `offset`.
    pub fn read_struct<T>(&self, offset: u32) -> Result<&T, StreamError>
    where
        T: FromBytes + KnownLayout + Immutable + Unaligned,
    {
        let size = size_of::<T>() as u32;
        let bytes = self.read_bytes(offset, size)?;
        T::ref_from_bytes(bytes).map_err(|_| StreamError::InsufficientBuffer {
            offset,
            size,
            stream_len: self.len,
        })
    }

    /// Copies bytes of the stream, starting at `offset`, into `buffer`.
    pub fn read_into(&self, offset: u32, buffer: &mut [u8]) -> Result<(), StreamError> {
        let size = u32::try_from(buffer.len()).map_err(|_| StreamError::InsufficientBuffer {
            offset,
            size: u32::MAX,
            stream_len: self.len,
        })?;
        self.check_bounds(offset, size)?;
        self.copy_out(offset, buffer)
    }

    /// If all pages that hold `offset..offset + size` are numbered consecutively, returns the
    /// bytes directly from the image.
    fn contiguous_run(&self, offset: u32, size: u32) -> Result<Option<&'a [u8]>, StreamError> {
        let shift = self.page_size.exponent();
        let first = (offset >> shift) as usize;
        let last = ((offset + size - 1) >> shift) as usize;

        let base = self.pages[first];
        for (i, &page) in self.pages[first..=last].iter().enumerate().skip(1) {
            if Some(page) != base.checked_add(i as u32) {
                return Ok(None);
            }
        }

        let start = page_to_offset(base, self.page_size)
            + offset_within_page(offset, self.page_size) as u64;
        let end = start + size as u64;
        match self.image.get(start as usize..end as usize) {
            Some(bytes) => Ok(Some(bytes)),
            None => Err(StreamError::InvalidPage { page: base }),
        }
    }

    /// Gathers the bytes at `offset` into `buffer`. The caller has checked bounds.
    fn copy_out(&self, offset: u32, buffer: &mut [u8]) -> Result<(), StreamError> {
        let mapper = StreamPageMapper::new(&self.pages, self.page_size, self.len);

        let mut pos = offset;
        let mut rest: &mut [u8] = buffer;
        while !rest.is_empty() {
            let Some((file_offset, transfer_len)) = mapper.map(pos, rest.len() as u32) else {
                return Err(StreamError::InsufficientBuffer {
                    offset,
                    size: rest.len() as u32,
                    stream_len: self.len,
                });
            };

            let start = file_offset as usize;
            let Some(src) = self.image.get(start..start + transfer_len as usize) else {
                return Err(StreamError::InvalidPage {
                    page: (file_offset >> self.page_size.exponent()) as u32,
                });
            };

            let (dst, next) = rest.split_at_mut(transfer_len as usize);
            dst.copy_from_slice(src);
            rest = next;
            pos += transfer_len;
            self.bytes_copied
                .set(self.bytes_copied.get() + transfer_len as u64);
        }

        Ok(())
    }
}

impl<'a> fmt::Debug for BlockMappedStream<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BlockMappedStream")
            .field("len", &self.len)
            .field("num_pages", &self.pages.len())
            .field("bytes_copied", &self.bytes_copied.get())
            .finish()
    }
}
