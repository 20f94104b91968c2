//! Page management code

use super::*;
use bitvec::prelude::{BitVec, Lsb0};
use tracing::trace;

/// Given the size of a stream in bytes, returns the number of pages needed to store it.
///
/// This function correctly handles the case where the stream size is [`NIL_STREAM_SIZE`].
/// In this case, it returns 0.
pub(crate) fn num_pages_for_stream_size(stream_size: u32, page_size: PageSize) -> u32 {
    if stream_size == NIL_STREAM_SIZE {
        0
    } else {
        stream_size.div_round_up(page_size)
    }
}

/// Maps ranges of bytes within a stream to contiguous ranges of bytes in the containing MSF file.
pub(crate) struct StreamPageMapper<'a> {
    pages: &'a [Page],
    page_size: PageSize,
    stream_size: u32,
}

impl<'a> StreamPageMapper<'a> {
    pub(crate) fn new(pages: &'a [Page], page_size: PageSize, stream_size: u32) -> Self {
        assert_eq!(
            num_pages_for_stream_size(stream_size, page_size) as usize,
            pages.len()
        );

        Self {
            pages,
            page_size,
            stream_size,
        }
    }

    /// Maps a byte offset and a length within a stream to a contiguous run of bytes within the MSF file.
    ///
    /// Returns `(file_offset, transfer_len)` where `file_offset` is the byte offset within the MSF
    /// file and `transfer_len` is the length of the longest contiguous sub-range of the requested
    /// range.
    ///
    /// If this returns `None` then no bytes can be mapped. This occurs when `pos >= stream_size`.
    ///
    /// Invariants:
    ///
    /// * if returned `Some`, then `transfer_len <= bytes_wanted`
    /// * if returned `Some`, then `transfer_len > 0`
    pub(crate) fn map(&self, pos: u32, bytes_wanted: u32) -> Option<(u64, u32)> {
        if self.stream_size == NIL_STREAM_SIZE {
            return None;
        }

        if pos >= self.stream_size {
            return None;
        }

        let bytes_available = self.stream_size - pos;
        let max_transfer_size = bytes_available.min(bytes_wanted);

        if max_transfer_size == 0 {
            return None;
        }

        let transfer_size: u32;

        let first_page_index = pos >> self.page_size.exponent();
        let first_page_pointer = self.pages[first_page_index as usize];
        let first_page_file_offset = page_to_offset(first_page_pointer, self.page_size);

        let offset_within_first_page = offset_within_page(pos, self.page_size);
        let file_offset = first_page_file_offset + offset_within_first_page as u64;

        // Does the beginning of the range cross a page boundary?
        let bytes_available_first_page = u32::from(self.page_size) - offset_within_first_page;
        if max_transfer_size > bytes_available_first_page {
            // Keep advancing through the page list as long as pages are sequential.
            let mut p = pos + bytes_available_first_page;
            debug_assert!(self.page_size.is_aligned(p));

            let mut last_page_ptr = first_page_pointer;

            loop {
                debug_assert!(p - pos <= max_transfer_size);
                let want_bytes = max_transfer_size - (p - pos);
                if want_bytes == 0 {
                    break;
                }

                let p_page = p >> self.page_size.exponent();
                let p_ptr = self.pages[p_page as usize];

                if Some(p_ptr) != last_page_ptr.checked_add(1) {
                    break;
                }

                p += want_bytes.min(u32::from(self.page_size));
                last_page_ptr = p_ptr;
            }

            transfer_size = p - pos;
        } else {
            transfer_size = max_transfer_size;
        }

        debug_assert!(transfer_size > 0);
        debug_assert!(transfer_size <= bytes_wanted);

        Some((file_offset, transfer_size))
    }
}

/// Tracks which pages of an MSF file have been claimed by the Stream Directory or by a stream.
///
/// Page 0 and the FPM pages of every interval are claimed when this is created.
pub(crate) struct PageClaims {
    busy: BitVec<u32, Lsb0>,
    page_size: PageSize,
}

impl PageClaims {
    pub(crate) fn new(num_pages: u32, page_size: PageSize) -> Self {
        let mut busy: BitVec<u32, Lsb0> = BitVec::with_capacity(num_pages as usize);
        busy.resize(num_pages as usize, false);
        if let Some(mut b) = busy.get_mut(0) {
            b.set(true);
        }

        let mut interval_page: usize = 0;
        while interval_page < busy.len() {
            for fpm_page in [
                interval_page + FPM_NUMBER_1 as usize,
                interval_page + FPM_NUMBER_2 as usize,
            ] {
                if let Some(mut b) = busy.get_mut(fpm_page) {
                    b.set(true);
                }
            }
            interval_page += usize::from(page_size);
        }

        Self { busy, page_size }
    }

    /// Claims a page for the Stream Directory. Directory pages must be in range, must not be
    /// special pages, and must not be shared.
    pub(crate) fn claim_dir_page(&mut self, page: Page) -> anyhow::Result<()> {
        if is_special_page_big_msf(self.page_size, page) {
            bail!(
                "Stream dir contains invalid page number: {page}. \
                 Page points to Page 0 or to an FPM page."
            );
        }

        let Some(mut b) = self.busy.get_mut(page as usize) else {
            bail!("Page {page} is invalid; it is out of range (exceeds num_pages)");
        };

        if *b {
            bail!("Page {page} is used more than once in the Stream Directory.");
        }
        b.set(true);
        Ok(())
    }

    /// Claims a page for a stream. Pages that are out of range or are Page 0 are rejected.
    ///
    /// Some linkers place stream pages on FPM pages or share pages between streams. We tolerate
    /// that for reading, and only report it.
    pub(crate) fn claim_stream_page(&mut self, stream: u32, page: Page) -> anyhow::Result<()> {
        if page == 0 {
            bail!("Stream {stream} contains a pointer to Page 0, which is invalid.");
        }

        let Some(mut b) = self.busy.get_mut(page as usize) else {
            bail!(
                "Stream {stream} contains page {page}, which is out of range (exceeds num_pages)"
            );
        };

        if *b {
            trace!(stream, page, "page is already claimed");
        }
        b.set(true);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn num_busy(&self) -> usize {
        self.busy.count_ones()
    }
}

/// Computes the low-bits-on mask for the page mask.
fn low_page_mask(page_size: PageSize) -> u32 {
    (1u32 << page_size.exponent()).wrapping_sub(1u32)
}

/// Tests whether `page` contributes to either FPM1 or FPM2.
fn is_fpm_page_big_msf(page_size: PageSize, page: u32) -> bool {
    let page_within_interval = page & low_page_mask(page_size);
    matches!(page_within_interval, FPM_NUMBER_1 | FPM_NUMBER_2)
}

/// Tests whether `page` is one of the special pages (Page 0, FPM1, or FPM2)
pub(crate) fn is_special_page_big_msf(page_size: PageSize, page: u32) -> bool {
    page == 0 || is_fpm_page_big_msf(page_size, page)
}

#[test]
fn test_page_mapper_nil() {
    const PAGE_SIZE: PageSize = PageSize::from_exponent(12);

    let mapper = StreamPageMapper::new(&[], PAGE_SIZE, NIL_STREAM_SIZE);
    assert_eq!(mapper.map(0, 0), None);
    assert_eq!(mapper.map(0x1000, 0x1000), None);
}

#[test]
fn test_page_mapper_basic() {
    const PAGE_SIZE: PageSize = PageSize::from_exponent(12);

    let mapper = StreamPageMapper::new(&[5, 6, 7, 300, 301], PAGE_SIZE, 0x4abc);

    assert_eq!(mapper.map(0, 0), None, "empty read within stream boundary");
    assert_eq!(mapper.map(0x1000_0000, 0x1000), None, "outside stream boundary");

    assert_eq!(mapper.map(0, 0x10), Some((0x5000, 0x10)));
    assert_eq!(mapper.map(0, 0x1000), Some((0x5000, 0x1000)));
    assert_eq!(mapper.map(0, 0x1eee), Some((0x5000, 0x1eee)));

    assert_eq!(
        mapper.map(0, 0x3eee),
        Some((0x5000, 0x3000)),
        "clipped at the end of the contiguous run"
    );

    assert_eq!(mapper.map(0xccc, 0x10), Some((0x5ccc, 0x10)));
    assert_eq!(mapper.map(0xccc, 0x1000), Some((0x5ccc, 0x1000)));
    assert_eq!(mapper.map(0xccc, 0x1000_0000), Some((0x5ccc, 0x2334)));

    assert_eq!(
        mapper.map(0x3000, 0x1000_0000),
        Some((300 << 12, 0x1abc)),
        "second run is clipped at the end of the stream"
    );
}

#[test]
fn test_special_pages() {
    const PAGE_SIZE: PageSize = PageSize::from_exponent(9);

    assert!(is_special_page_big_msf(PAGE_SIZE, 0));
    assert!(is_special_page_big_msf(PAGE_SIZE, 1));
    assert!(is_special_page_big_msf(PAGE_SIZE, 2));
    assert!(!is_special_page_big_msf(PAGE_SIZE, 3));
    assert!(!is_special_page_big_msf(PAGE_SIZE, 512));
    assert!(is_special_page_big_msf(PAGE_SIZE, 513));
    assert!(is_special_page_big_msf(PAGE_SIZE, 514));
}

#[test]
fn test_page_claims() {
    const PAGE_SIZE: PageSize = PageSize::from_exponent(9);

    let mut claims = PageClaims::new(8, PAGE_SIZE);
    assert_eq!(claims.num_busy(), 3);

    claims.claim_dir_page(3).unwrap();
    assert!(claims.claim_dir_page(3).is_err(), "shared directory page");
    assert!(claims.claim_dir_page(1).is_err(), "FPM page");
    assert!(claims.claim_dir_page(8).is_err(), "out of range");

    claims.claim_stream_page(1, 4).unwrap();
    claims.claim_stream_page(2, 4).unwrap();
    assert!(claims.claim_stream_page(1, 0).is_err());
    assert_eq!(claims.num_busy(), 5);
}
