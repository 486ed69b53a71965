//! A working allocator, over the Rust global allocator.

use std::{
    alloc::{self, Layout},
    ptr::{self, NonNull},
    sync::atomic::{AtomicUsize, Ordering},
};

use lowutil_core::Allocator;

/// Heap
///
/// Serves blocks from the Rust global allocator, prefixing each with a header recording its size, and tracks the
/// number of live blocks and bytes.
///
/// An optional limit on the number of live bytes makes requests fail once reached, to exercise failure paths with a
/// working allocator.
#[derive(Debug)]
pub struct Heap {
    limit: usize,
    live_blocks: AtomicUsize,
    live_bytes: AtomicUsize,
    scalar_allocations: AtomicUsize,
}

impl Heap {
    const HEADER: usize = 16;

    /// Creates an unlimited instance.
    pub const fn new() -> Self { Self::with_limit(usize::MAX) }

    /// Creates an instance limited to `limit` live bytes.
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            live_blocks: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
            scalar_allocations: AtomicUsize::new(0),
        }
    }

    /// Returns the number of blocks currently allocated.
    pub fn live(&self) -> usize { self.live_blocks.load(Ordering::Relaxed) }

    /// Returns the number of bytes currently allocated, headers excluded.
    pub fn live_bytes(&self) -> usize { self.live_bytes.load(Ordering::Relaxed) }

    /// Returns the number of scalar allocations requested.
    pub fn scalar_allocations(&self) -> usize { self.scalar_allocations.load(Ordering::Relaxed) }

    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size.checked_add(Self::HEADER)?, Self::HEADER).ok()
    }

    //  Reserves `size` bytes against the limit.
    fn reserve(&self, size: usize) -> bool {
        let mut current = self.live_bytes.load(Ordering::Relaxed);

        loop {
            let next = match current.checked_add(size) {
                Some(next) if next <= self.limit => next,
                _ => return false,
            };

            match self.live_bytes.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn unreserve(&self, size: usize) { self.live_bytes.fetch_sub(size, Ordering::Relaxed); }

    //  Safety:
    //  -   Assumes `block` was allocated by this heap.
    unsafe fn header_of(block: NonNull<u8>) -> *mut usize { block.as_ptr().sub(Self::HEADER) as *mut usize }
}

impl Default for Heap {
    fn default() -> Self { Self::new() }
}

impl Allocator for Heap {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let layout = Self::layout(size)?;

        if !self.reserve(size) {
            return None;
        }

        //  Safety:
        //  -   `layout` has a non-zero size, the header.
        let raw = match NonNull::new(unsafe { alloc::alloc(layout) }) {
            Some(raw) => raw,
            None => {
                self.unreserve(size);
                return None;
            }
        };

        //  Safety:
        //  -   `raw` is valid for `HEADER + size` bytes, and aligned for `usize`.
        unsafe { ptr::write(raw.as_ptr() as *mut usize, size) };

        self.live_blocks.fetch_add(1, Ordering::Relaxed);

        //  Safety:
        //  -   `HEADER` is within the allocated block.
        Some(unsafe { NonNull::new_unchecked(raw.as_ptr().add(Self::HEADER)) })
    }

    fn allocate_scalar(&self, size: usize) -> Option<NonNull<u8>> {
        self.scalar_allocations.fetch_add(1, Ordering::Relaxed);
        self.allocate(size)
    }

    unsafe fn reallocate(&self, block: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        let block = match block {
            Some(block) => block,
            None => return self.allocate(size),
        };

        let header = Self::header_of(block);
        let old_size = *header;

        let layout = Self::layout(size)?;

        if size > old_size && !self.reserve(size - old_size) {
            return None;
        }

        //  The layout was valid on allocation.
        let old_layout = Layout::from_size_align_unchecked(old_size + Self::HEADER, Self::HEADER);

        let raw = alloc::realloc(header as *mut u8, old_layout, layout.size());

        let raw = match NonNull::new(raw) {
            Some(raw) => raw,
            None => {
                if size > old_size {
                    self.unreserve(size - old_size);
                }
                return None;
            }
        };

        if size < old_size {
            self.unreserve(old_size - size);
        }

        ptr::write(raw.as_ptr() as *mut usize, size);

        Some(NonNull::new_unchecked(raw.as_ptr().add(Self::HEADER)))
    }

    unsafe fn release(&self, block: NonNull<u8>) {
        let header = Self::header_of(block);
        let size = *header;

        //  The layout was valid on allocation.
        let layout = Layout::from_size_align_unchecked(size + Self::HEADER, Self::HEADER);

        alloc::dealloc(header as *mut u8, layout);

        self.unreserve(size);
        self.live_blocks.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn heap_tracks_live_blocks() {
    let heap = Heap::new();

    let a = heap.allocate(10).expect("Allocated");
    let b = heap.allocate(0).expect("Allocated");

    assert_ne!(a, b);
    assert_eq!(2, heap.live());
    assert_eq!(10, heap.live_bytes());

    unsafe { heap.release(a) };
    unsafe { heap.release(b) };

    assert_eq!(0, heap.live());
    assert_eq!(0, heap.live_bytes());
}

#[test]
fn heap_limit() {
    let heap = Heap::with_limit(100);

    let a = heap.allocate(60).expect("Allocated");

    assert_eq!(None, heap.allocate(60));
    assert_eq!(None, unsafe { heap.reallocate(Some(a), 120) });

    let a = unsafe { heap.reallocate(Some(a), 20) }.expect("Shrunk");
    let b = heap.allocate(60).expect("Allocated");

    unsafe { heap.release(a) };
    unsafe { heap.release(b) };

    assert_eq!(0, heap.live_bytes());
}

}
