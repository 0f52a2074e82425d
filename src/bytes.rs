//! Variable-length byte arena backed by anonymous memory maps.
//!
//! Small allocations are bumped out of the current page and never straddle a
//! page boundary. Allocations at or above `page_size / 16` that do not fit get
//! a dedicated mapping of their own.

use memmap2::MmapMut;
use tracing::{debug, trace};

use crate::arena::os_page_size;
use crate::error::{SchemeError, SchemeResult};

const LARGE_THRESHOLD_DIVISOR: usize = 16;

/// Where a span lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Region {
    Page(u32),
    Large(u32),
}

/// Handle to a run of bytes allocated from a `ByteArena`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteSpan {
    region: Region,
    offset: u32,
    len: u32,
}

fn map_region(len: usize) -> SchemeResult<MmapMut> {
    MmapMut::map_anon(len).map_err(SchemeError::PageMap)
}

pub struct ByteArena {
    pages: Vec<MmapMut>,
    /// Dedicated mappings for large allocations, newest last.
    large: Vec<MmapMut>,
    page_size: usize,
    large_threshold: usize,
    offset: usize,
    remaining: usize,
    total_bytes: usize,
}

impl ByteArena {
    pub fn new(page_size: usize) -> SchemeResult<Self> {
        let os_page = os_page_size();
        if page_size == 0 || page_size % os_page != 0 || page_size > u32::MAX as usize {
            return Err(SchemeError::ArenaGeometry {
                element_size: 1,
                page_size,
                os_page_size: os_page,
            });
        }

        let first = map_region(page_size)?;
        debug!(page_size, "Byte arena created");

        Ok(ByteArena {
            pages: vec![first],
            large: Vec::new(),
            page_size,
            large_threshold: page_size / LARGE_THRESHOLD_DIVISOR,
            offset: 0,
            remaining: page_size,
            total_bytes: 0,
        })
    }

    /// Reserve `size` zeroed bytes.
    pub fn allocate(&mut self, size: usize) -> SchemeResult<ByteSpan> {
        let len = u32::try_from(size)
            .map_err(|_| SchemeError::NumericRange(format!("allocation of {} bytes", size)))?;

        if size <= self.remaining {
            let span = ByteSpan {
                region: Region::Page((self.pages.len() - 1) as u32),
                offset: self.offset as u32,
                len,
            };
            self.offset += size;
            self.remaining -= size;
            self.total_bytes += size;
            return Ok(span);
        }

        if size >= self.large_threshold {
            let region = map_region(size)?;
            self.large.push(region);
            trace!(size, regions = self.large.len(), "Large byte region mapped");
            return Ok(ByteSpan {
                region: Region::Large((self.large.len() - 1) as u32),
                offset: 0,
                len,
            });
        }

        // Roll to a fresh page; whatever was left in the old one is abandoned.
        let page = map_region(self.page_size)?;
        self.pages.push(page);
        trace!(
            pages = self.pages.len(),
            wasted = self.remaining,
            "Byte arena rolled to a new page"
        );
        self.offset = size;
        self.remaining = self.page_size - size;
        self.total_bytes += size;
        Ok(ByteSpan {
            region: Region::Page((self.pages.len() - 1) as u32),
            offset: 0,
            len,
        })
    }

    /// Allocate a copy of `data`.
    pub fn allocate_copy(&mut self, data: &[u8]) -> SchemeResult<ByteSpan> {
        let span = self.allocate(data.len())?;
        self.bytes_mut(span).copy_from_slice(data);
        Ok(span)
    }

    pub fn bytes(&self, span: ByteSpan) -> &[u8] {
        let start = span.offset as usize;
        let end = start + span.len as usize;
        match span.region {
            Region::Page(i) => &self.pages[i as usize][start..end],
            Region::Large(i) => &self.large[i as usize][start..end],
        }
    }

    pub fn bytes_mut(&mut self, span: ByteSpan) -> &mut [u8] {
        let start = span.offset as usize;
        let end = start + span.len as usize;
        match span.region {
            Region::Page(i) => &mut self.pages[i as usize][start..end],
            Region::Large(i) => &mut self.large[i as usize][start..end],
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn large_count(&self) -> usize {
        self.large.len()
    }

    /// Bytes handed out from pages (large regions excluded).
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn large_threshold(&self) -> usize {
        self.large_threshold
    }
}

impl Drop for ByteArena {
    fn drop(&mut self) {
        trace!(
            pages = self.pages.len(),
            large = self.large.len(),
            "Unmapping byte arena"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_allocations_share_a_page() {
        let mut arena = ByteArena::new(os_page_size()).unwrap();
        let a = arena.allocate_copy(b"hello").unwrap();
        let b = arena.allocate_copy(b"world!").unwrap();
        assert_eq!(arena.bytes(a), b"hello");
        assert_eq!(arena.bytes(b), b"world!");
        assert_eq!(arena.page_count(), 1);
        assert_eq!(arena.total_bytes(), 11);
    }

    #[test]
    fn test_small_allocation_never_straddles_pages() {
        let page = os_page_size();
        let mut arena = ByteArena::new(page).unwrap();
        let chunk = arena.large_threshold() - 1;
        let mut spans = Vec::new();
        for i in 0..20u8 {
            let span = arena.allocate(chunk).unwrap();
            arena.bytes_mut(span).fill(i);
            spans.push(span);
        }
        assert!(arena.page_count() > 1);
        assert_eq!(arena.large_count(), 0);
        for (i, span) in spans.iter().enumerate() {
            assert!(span.offset as usize + span.len as usize <= page);
            assert!(arena.bytes(*span).iter().all(|&b| b == i as u8));
        }
    }

    #[test]
    fn test_large_allocation_gets_own_region() {
        let page = os_page_size();
        let mut arena = ByteArena::new(page).unwrap();
        let big = vec![7u8; page * 2];
        let span = arena.allocate_copy(&big).unwrap();
        assert!(matches!(span.region, Region::Large(0)));
        assert_eq!(arena.large_count(), 1);
        assert_eq!(arena.page_count(), 1);
        assert_eq!(arena.bytes(span), &big[..]);
    }

    #[test]
    fn test_threshold_sized_request_maps_when_page_is_short() {
        let page = os_page_size();
        let mut arena = ByteArena::new(page).unwrap();
        let threshold = arena.large_threshold();
        arena.allocate(page - threshold + 1).unwrap();

        let exact = arena.allocate(threshold).unwrap();
        assert!(matches!(exact.region, Region::Large(0)));
        assert_eq!(arena.page_count(), 1);
        assert_eq!(arena.large_count(), 1);

        // The short tail of the page is still usable for smaller requests.
        let small = arena.allocate(threshold - 1).unwrap();
        assert_eq!(small.region, Region::Page(0));
        assert_eq!(arena.page_count(), 1);
    }

    #[test]
    fn test_rejects_unaligned_page() {
        assert!(ByteArena::new(os_page_size() + 1).is_err());
    }
}
