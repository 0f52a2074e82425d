//! Fixed-element-size page arena.
//!
//! Elements live in equal-size pages that are appended as the arena grows and
//! are never released before the arena itself. An element is addressed by a
//! global index starting at 0; the page and in-page slot follow from the
//! index alone, so every page must hold an integral number of elements.

use std::io;
use std::mem;
use std::sync::OnceLock;

use tracing::{debug, trace};

use crate::error::{SchemeError, SchemeResult};

/// Page-table slots added each time the table fills up.
const PAGE_TABLE_GROWTH: usize = 16;

/// The OS page size, queried once.
#[allow(unsafe_code)]
pub fn os_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no preconditions and only reads process state.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            4096
        }
    })
}

fn out_of_memory(err: std::collections::TryReserveError) -> SchemeError {
    SchemeError::PageMap(io::Error::new(io::ErrorKind::OutOfMemory, err))
}

/// An empty page with room for exactly `elements` entries.
fn reserve_page<T>(elements: usize) -> SchemeResult<Vec<T>> {
    let mut page = Vec::new();
    page.try_reserve_exact(elements).map_err(out_of_memory)?;
    Ok(page)
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Round `requested` up to the nearest size that is a multiple of both
/// `element_size` and the OS page size.
pub fn aligned_page_size(requested: usize, element_size: usize) -> usize {
    let os = os_page_size();
    let element_size = element_size.max(1);
    let unit = element_size / gcd(element_size, os) * os;
    requested.max(1).div_ceil(unit) * unit
}

/// Bump allocator over a growable list of equal-size pages.
pub struct PageArena<T> {
    pages: Vec<Vec<T>>,
    page_size: usize,
    elements_per_page: usize,
    /// Elements handed out so far; also the next index.
    total: u64,
    /// Free slots left in the last page.
    remaining: usize,
}

impl<T> PageArena<T> {
    /// Create an arena whose pages are `page_size` bytes.
    ///
    /// Fails unless `page_size` is a non-zero multiple of both the element
    /// size and the OS page size.
    pub fn new(page_size: usize) -> SchemeResult<Self> {
        let element_size = mem::size_of::<T>();
        let os_page = os_page_size();
        if element_size == 0
            || page_size == 0
            || page_size % element_size != 0
            || page_size % os_page != 0
        {
            return Err(SchemeError::ArenaGeometry {
                element_size,
                page_size,
                os_page_size: os_page,
            });
        }

        let elements_per_page = page_size / element_size;
        let mut pages = Vec::new();
        pages
            .try_reserve_exact(PAGE_TABLE_GROWTH)
            .map_err(out_of_memory)?;
        pages.push(reserve_page(elements_per_page)?);

        debug!(
            element_size,
            page_size, elements_per_page, "Page arena created"
        );

        Ok(PageArena {
            pages,
            page_size,
            elements_per_page,
            total: 0,
            remaining: elements_per_page,
        })
    }

    /// Allocate one element initialised to `value`.
    /// Returns its global index and a reference to the stored element.
    pub fn allocate(&mut self, value: T) -> SchemeResult<(u64, &mut T)> {
        if self.remaining == 0 {
            self.grow()?;
        }
        self.remaining -= 1;
        let index = self.total;
        self.total += 1;

        let last = self.pages.len() - 1;
        let page = &mut self.pages[last];
        page.push(value);
        let slot = page.len() - 1;
        Ok((index, &mut page[slot]))
    }

    fn grow(&mut self) -> SchemeResult<()> {
        if self.pages.len() == self.pages.capacity() {
            self.pages
                .try_reserve_exact(PAGE_TABLE_GROWTH)
                .map_err(out_of_memory)?;
        }
        let page = reserve_page(self.elements_per_page)?;
        self.pages.push(page);
        self.remaining = self.elements_per_page;
        trace!(
            pages = self.pages.len(),
            page_size = self.page_size,
            "Page arena grew"
        );
        Ok(())
    }

    /// Page number and in-page slot for a global index.
    #[inline]
    fn locate(&self, index: u64) -> (usize, usize) {
        let byte = index as usize * mem::size_of::<T>();
        let page = byte / self.page_size;
        let slot = (byte % self.page_size) / mem::size_of::<T>();
        (page, slot)
    }

    pub fn get(&self, index: u64) -> SchemeResult<&T> {
        if index >= self.total {
            return Err(SchemeError::IndexOutOfRange {
                index,
                len: self.total,
            });
        }
        let (page, slot) = self.locate(index);
        Ok(&self.pages[page][slot])
    }

    pub fn get_mut(&mut self, index: u64) -> SchemeResult<&mut T> {
        if index >= self.total {
            return Err(SchemeError::IndexOutOfRange {
                index,
                len: self.total,
            });
        }
        let (page, slot) = self.locate(index);
        Ok(&mut self.pages[page][slot])
    }

    /// Number of elements allocated.
    pub fn count(&self) -> u64 {
        self.total
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Iterate over all elements in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.pages.iter().flatten().enumerate().map(|(i, e)| (i as u64, e))
    }
}

impl<T> Drop for PageArena<T> {
    fn drop(&mut self) {
        trace!(
            pages = self.pages.len(),
            elements = self.total,
            "Releasing page arena"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Slot {
        a: u64,
        b: u64,
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let os = os_page_size();
        assert!(PageArena::<Slot>::new(os + 16).is_err());
        assert!(PageArena::<()>::new(os).is_err());
        assert!(PageArena::<Slot>::new(os).is_ok());
    }

    fn per_page() -> u64 {
        (os_page_size() / mem::size_of::<Slot>()) as u64
    }

    #[test]
    fn test_round_trip_and_aliasing() {
        let mut arena = PageArena::new(os_page_size()).unwrap();
        let n = per_page() * 3 + 5;
        for i in 0..n {
            let (index, slot) = arena.allocate(Slot { a: i, b: 0 }).unwrap();
            assert_eq!(index, i);
            slot.b = i * 2;
        }
        for i in 0..n {
            assert_eq!(*arena.get(i).unwrap(), Slot { a: i, b: i * 2 });
        }
        arena.get_mut(7).unwrap().a = 700;
        assert_eq!(arena.get(7).unwrap().a, 700);
        assert_eq!(arena.page_count(), 4);
    }

    #[test]
    fn test_page_boundary_crossing() {
        let mut arena = PageArena::new(os_page_size()).unwrap();
        let per_page = per_page();
        for i in 0..=per_page {
            arena.allocate(Slot { a: i, b: i }).unwrap();
        }
        assert_eq!(arena.page_count(), 2);
        assert_eq!(arena.locate(per_page), (1, 0));
        assert_eq!(arena.get(0).unwrap().a, 0);
        assert_eq!(arena.get(per_page - 1).unwrap().a, per_page - 1);
        assert_eq!(arena.get(per_page).unwrap().a, per_page);
    }

    #[test]
    fn test_get_beyond_allocated_fails() {
        let mut arena = PageArena::new(os_page_size()).unwrap();
        arena.allocate(Slot { a: 1, b: 1 }).unwrap();
        assert!(matches!(
            arena.get(1),
            Err(SchemeError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_unsatisfiable_page_is_an_error() {
        let os = os_page_size();
        let huge = (isize::MAX as usize / os) * os;
        assert!(matches!(
            PageArena::<u64>::new(huge),
            Err(SchemeError::PageMap(_))
        ));
    }

    #[test]
    fn test_aligned_page_size() {
        let os = os_page_size();
        let size = aligned_page_size(1 << 14, 48);
        assert_eq!(size % 48, 0);
        assert_eq!(size % os, 0);
        assert!(size >= 1 << 14);
        assert_eq!(aligned_page_size(os, 16), os);
    }
}
