//! Code for parsing the MSF File Header and the Stream Directory.

use super::*;
use crate::pages::{PageClaims, is_special_page_big_msf};
use tracing::{debug, trace_span, warn};

impl<'a> Msf<'a> {
    /// Reads the header of a PDB file and provides access to the streams contained within it.
    ///
    /// This function reads the MSF File Header, which is the header for the entire file.
    /// It also reads the Stream Directory, so it knows how to find each of the streams
    /// and the pages of the streams. Only the "Big MSF" encoding is supported.
    pub fn parse(image: &'a [u8]) -> anyhow::Result<Self> {
        let _span = trace_span!("Msf::parse").entered();

        if image.starts_with(&MSF_SMALL_MAGIC) {
            bail!("This PDB file uses the obsolete 'Small MSF' encoding, which is not supported.");
        }

        if image.get(16..24) == Some(b"PDB v1.0".as_slice()) {
            bail!("This file is a Portable PDB, which is not supported.");
        }

        if !image.starts_with(&MSF_BIG_MAGIC) {
            bail!("PDB file does not have the correct header (magic is wrong).");
        }

        let Ok((msf_header, _)) = MsfHeader::ref_from_prefix(image) else {
            bail!("The PDB header is invalid. The file is too small.");
        };

        let page_size = msf_header.page_size.get();
        let active_fpm = msf_header.active_fpm.get();
        let num_pages = msf_header.num_pages.get();
        let stream_dir_size = msf_header.stream_dir_size.get();

        if !matches!(active_fpm, FPM_NUMBER_1 | FPM_NUMBER_2) {
            bail!("The PDB header is invalid. The active FPM is invalid.");
        }

        let Ok(page_size_pow2) = PageSize::try_from(page_size) else {
            bail!("The PDB header is invalid. The page size ({page_size}) is not a power of 2.");
        };

        if page_size_pow2 < MIN_PAGE_SIZE || page_size_pow2 > MAX_PAGE_SIZE {
            bail!("The PDB header is invalid. The page size ({page_size}) is out of range.");
        }

        if num_pages == 0 {
            bail!("PDB specifies invalid value for num_pages (zero).");
        }

        let expected_len = page_to_offset(num_pages, page_size_pow2);
        if (image.len() as u64) < expected_len {
            warn!(
                image_len = image.len(),
                expected_len, "MSF image is shorter than num_pages * page_size"
            );
        }

        debug!(page_size, num_pages, stream_dir_size, "MSF header");

        let mut claims = PageClaims::new(num_pages, page_size_pow2);

        // "Big MSF" uses a 3-level hierarchy for the Stream Directory:
        //
        // stream_dir_map        <-- u32 page numbers, stored in page 0 after MsfHeader
        // stream_dir_pages      <-- u32 page numbers of the Stream Directory
        // stream_dir_bytes      <-- the Stream Directory itself

        if stream_dir_size % 4 != 0 {
            bail!("MSF Stream Directory has an invalid size; it is not a multiple of 4.");
        }

        if stream_dir_size == 0 {
            bail!("Stream directory is invalid (zero-length)");
        }

        let stream_dir_num_pages = stream_dir_size.div_round_up(page_size_pow2);
        let stream_dir_l1_num_pages =
            num_pages_for_stream_size(4 * stream_dir_num_pages, page_size_pow2) as usize;

        let page0 = &image[..image.len().min(page_size as usize)];
        let Ok((page_map_l1_ptrs, _)) = <[U32<LE>]>::ref_from_prefix_with_elems(
            &page0[STREAM_DIR_PAGE_MAP_FILE_OFFSET..],
            stream_dir_l1_num_pages,
        ) else {
            bail!("Stream dir size is invalid (exceeds design limits)");
        };

        // Collect the page numbers of the Stream Directory.
        let mut stream_dir_pages: Vec<Page> = Vec::with_capacity(stream_dir_num_pages as usize);
        'l1_loop: for l1_ptr in page_map_l1_ptrs.iter() {
            let l1_page = l1_ptr.get();
            claims.claim_dir_page(l1_page)?;
            let l1_bytes = page_bytes(image, page_size_pow2, l1_page)?;

            // The slice length is a multiple of the page size, so this cannot fail.
            let Ok(l2_pages) = <[U32<LE>]>::ref_from_bytes(l1_bytes) else {
                bail!("Stream dir page map is misaligned");
            };

            for l2_page in l2_pages.iter() {
                if stream_dir_pages.len() == stream_dir_num_pages as usize {
                    break 'l1_loop;
                }
                let l2_page = l2_page.get();
                claims.claim_dir_page(l2_page)?;
                stream_dir_pages.push(l2_page);
            }
        }

        // Read the Stream Directory.
        let mut stream_dir: Vec<u32> = Vec::with_capacity(stream_dir_size as usize / 4);
        let mut dir_bytes_wanted = stream_dir_size as usize;
        for &page in stream_dir_pages.iter() {
            let bytes = page_bytes(image, page_size_pow2, page)?;
            let chunk = &bytes[..dir_bytes_wanted.min(bytes.len())];
            dir_bytes_wanted -= chunk.len();
            stream_dir.extend(
                chunk
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }

        let num_streams = stream_dir[0] as usize;

        // Stream 0 is special and must exist.
        if num_streams == 0 {
            bail!("MSF file is invalid, because num_streams = 0.");
        }

        let Some(stream_sizes_src) = stream_dir.get(1..1 + num_streams) else {
            bail!("Stream directory is invalid (num_streams is not consistent with size)");
        };
        let mut stream_sizes = stream_sizes_src.to_vec();

        let mut stream_pages_iter = &stream_dir[1 + num_streams..];

        let mut stream_pages: Vec<Page> =
            Vec::with_capacity(stream_dir.len() - num_streams - 1);
        let mut stream_page_starts: Vec<u32> = Vec::with_capacity(num_streams + 1);

        for (stream, &stream_size) in stream_sizes_src.iter().enumerate() {
            stream_page_starts.push(stream_pages.len() as u32);

            let num_stream_pages = num_pages_for_stream_size(stream_size, page_size_pow2) as usize;
            if num_stream_pages > stream_pages_iter.len() {
                bail!(
                    "Stream directory is invalid.  Stream {stream} has size {stream_size}, \
                     which exceeds the size of the stream directory."
                );
            }
            let (this_stream_pages, next) = stream_pages_iter.split_at(num_stream_pages);
            stream_pages_iter = next;

            // Stream 0 (the old Stream Directory) is never read, so its pages are not checked.
            if stream != STREAM_DIR_STREAM as usize {
                for &page in this_stream_pages.iter() {
                    if page >= num_pages {
                        bail!(
                            "Stream {stream} contains page {page}, which exceeds num_pages ({num_pages})"
                        );
                    }
                    if is_special_page_big_msf(page_size_pow2, page) {
                        warn!(stream, page, "stream page points to Page 0 or to an FPM page");
                    }
                    claims.claim_stream_page(stream as u32, page)?;
                }
            }

            stream_pages.extend_from_slice(this_stream_pages);
        }
        stream_page_starts.push(stream_pages.len() as u32);

        if !stream_pages_iter.is_empty() {
            warn!(
                unused_entries = stream_pages_iter.len(),
                "stream directory contained unused entries"
            );
        }

        // Nothing should ever read Stream 0.
        stream_sizes[STREAM_DIR_STREAM as usize] = 0;
        let stream0_end = stream_page_starts[1] as usize;
        stream_pages.drain(..stream0_end);
        for start in stream_page_starts.iter_mut().skip(1) {
            *start -= stream0_end as u32;
        }

        Ok(Self {
            image,
            page_size: page_size_pow2,
            active_fpm,
            num_pages,
            stream_sizes,
            stream_pages,
            stream_page_starts,
        })
    }
}

/// Returns the bytes of a single page of the image.
fn page_bytes(image: &[u8], page_size: PageSize, page: Page) -> anyhow::Result<&[u8]> {
    let start = page_to_offset(page, page_size) as usize;
    let end = start + usize::from(page_size);
    let Some(bytes) = image.get(start..end) else {
        bail!("Page {page} is beyond the end of the file");
    };
    Ok(bytes)
}
