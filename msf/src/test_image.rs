//! Builds small MSF images in memory. Used by tests of this crate and of crates that read PDBs.

use super::*;
use crate::pages::is_special_page_big_msf;
use std::collections::HashSet;

enum Placement {
    Contiguous,
    Scattered,
    Explicit(Vec<Page>),
}

struct TestStream {
    data: Option<Vec<u8>>,
    placement: Placement,
}

/// Builds a "Big MSF" image. Stream 0 is created empty.
pub struct MsfImageBuilder {
    page_size: PageSize,
    streams: Vec<TestStream>,
}

struct PageAlloc {
    page_size: PageSize,
    next: Page,
    used: HashSet<Page>,
}

impl PageAlloc {
    fn alloc(&mut self) -> Page {
        loop {
            let p = self.next;
            self.next += 1;
            if !is_special_page_big_msf(self.page_size, p) && self.used.insert(p) {
                return p;
            }
        }
    }
}

impl MsfImageBuilder {
    /// Starts a new image with the given page size.
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            streams: vec![TestStream {
                data: Some(Vec::new()),
                placement: Placement::Contiguous,
            }],
        }
    }

    fn push(&mut self, data: Option<Vec<u8>>, placement: Placement) -> u32 {
        self.streams.push(TestStream { data, placement });
        (self.streams.len() - 1) as u32
    }

    /// Adds a stream whose pages are numbered consecutively.
    pub fn add_stream(&mut self, data: &[u8]) -> u32 {
        self.push(Some(data.to_vec()), Placement::Contiguous)
    }

    /// Adds a stream where no two pages are adjacent.
    pub fn add_scattered_stream(&mut self, data: &[u8]) -> u32 {
        self.push(Some(data.to_vec()), Placement::Scattered)
    }

    /// Adds a stream stored in exactly the given pages.
    pub fn add_stream_with_pages(&mut self, data: &[u8], pages: Vec<Page>) -> u32 {
        self.push(Some(data.to_vec()), Placement::Explicit(pages))
    }

    /// Adds a nil stream.
    pub fn add_nil_stream(&mut self) -> u32 {
        self.push(None, Placement::Contiguous)
    }

    /// Ensures that streams `0..=stream` exist, creating nil streams as needed.
    pub fn reserve_streams(&mut self, stream: u32) {
        while self.streams.len() <= stream as usize {
            self.add_nil_stream();
        }
    }

    /// Replaces the contents of an existing stream, keeping contiguous placement.
    pub fn set_stream(&mut self, stream: u32, data: &[u8]) {
        self.reserve_streams(stream);
        self.streams[stream as usize] = TestStream {
            data: Some(data.to_vec()),
            placement: Placement::Contiguous,
        };
    }

    /// Produces the image.
    pub fn build(&self) -> Vec<u8> {
        let ps = usize::from(self.page_size);

        let mut alloc = PageAlloc {
            page_size: self.page_size,
            next: 3,
            used: HashSet::new(),
        };
        for s in self.streams.iter() {
            if let Placement::Explicit(pages) = &s.placement {
                alloc.used.extend(pages.iter().copied());
            }
        }

        let mut stream_pages: Vec<Vec<Page>> = Vec::with_capacity(self.streams.len());
        for s in self.streams.iter() {
            let n = s.data.as_ref().map_or(0, |d| d.len().div_ceil(ps));
            let pages = match &s.placement {
                Placement::Explicit(pages) => {
                    assert_eq!(pages.len(), n);
                    pages.clone()
                }
                Placement::Contiguous => (0..n).map(|_| alloc.alloc()).collect(),
                Placement::Scattered => (0..n)
                    .map(|_| {
                        let p = alloc.alloc();
                        alloc.alloc();
                        p
                    })
                    .collect(),
            };
            stream_pages.push(pages);
        }

        let mut dir: Vec<u32> = vec![self.streams.len() as u32];
        for s in self.streams.iter() {
            dir.push(s.data.as_ref().map_or(NIL_STREAM_SIZE, |d| d.len() as u32));
        }
        for pages in stream_pages.iter() {
            dir.extend_from_slice(pages);
        }
        let dir_bytes: Vec<u8> = dir.iter().flat_map(|w| w.to_le_bytes()).collect();

        let dir_pages: Vec<Page> = (0..dir_bytes.len().div_ceil(ps))
            .map(|_| alloc.alloc())
            .collect();
        assert!(dir_pages.len() * 4 <= ps);
        let map_page = alloc.alloc();

        let num_pages = alloc.used.iter().copied().max().unwrap_or(2).max(2) + 1;
        let mut image = vec![0u8; num_pages as usize * ps];

        let put = |image: &mut Vec<u8>, page: Page, bytes: &[u8]| {
            let start = page as usize * ps;
            image[start..start + bytes.len()].copy_from_slice(bytes);
        };

        let header = MsfHeader {
            magic: MSF_BIG_MAGIC,
            page_size: U32::new(ps as u32),
            active_fpm: U32::new(1),
            num_pages: U32::new(num_pages),
            stream_dir_size: U32::new(dir_bytes.len() as u32),
            stream_dir_small_page_map: U32::new(0),
        };
        image[..MSF_HEADER_LEN].copy_from_slice(header.as_bytes());
        image[MSF_HEADER_LEN..MSF_HEADER_LEN + 4].copy_from_slice(&map_page.to_le_bytes());

        let map_bytes: Vec<u8> = dir_pages.iter().flat_map(|p| p.to_le_bytes()).collect();
        put(&mut image, map_page, &map_bytes);

        for (chunk, &page) in dir_bytes.chunks(ps).zip(dir_pages.iter()) {
            put(&mut image, page, chunk);
        }

        for (s, pages) in self.streams.iter().zip(stream_pages.iter()) {
            if let Some(data) = &s.data {
                for (chunk, &page) in data.chunks(ps).zip(pages.iter()) {
                    put(&mut image, page, chunk);
                }
            }
        }

        image
    }
}
