//! An allocator wrapper counting invocations.

use std::{
    ffi::CStr,
    os::raw::c_char,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use lowutil_core::Allocator;

/// Counting
///
/// Forwards each routine to the inner allocator, counting invocations per routine, whether they succeed or not.
#[derive(Debug, Default)]
pub struct Counting<A> {
    inner: A,
    allocations: AtomicUsize,
    scalar_allocations: AtomicUsize,
    zeroed_allocations: AtomicUsize,
    reallocations: AtomicUsize,
    duplications: AtomicUsize,
    releases: AtomicUsize,
}

impl<A> Counting<A> {
    /// Creates an instance, wrapping `inner`.
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            allocations: AtomicUsize::new(0),
            scalar_allocations: AtomicUsize::new(0),
            zeroed_allocations: AtomicUsize::new(0),
            reallocations: AtomicUsize::new(0),
            duplications: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    /// Returns a reference to the inner allocator.
    pub fn inner(&self) -> &A { &self.inner }

    /// Returns the number of invocations of `allocate`.
    pub fn allocations(&self) -> usize { self.allocations.load(Ordering::Relaxed) }

    /// Returns the number of invocations of `allocate_scalar`.
    pub fn scalar_allocations(&self) -> usize { self.scalar_allocations.load(Ordering::Relaxed) }

    /// Returns the number of invocations of `allocate_zeroed`.
    pub fn zeroed_allocations(&self) -> usize { self.zeroed_allocations.load(Ordering::Relaxed) }

    /// Returns the number of invocations of `reallocate`.
    pub fn reallocations(&self) -> usize { self.reallocations.load(Ordering::Relaxed) }

    /// Returns the number of invocations of `duplicate_string`.
    pub fn duplications(&self) -> usize { self.duplications.load(Ordering::Relaxed) }

    /// Returns the number of invocations of `release`.
    pub fn releases(&self) -> usize { self.releases.load(Ordering::Relaxed) }

    /// Returns the total number of invocations, all routines included.
    pub fn total(&self) -> usize {
        self.allocations() + self.scalar_allocations() + self.zeroed_allocations() + self.reallocations() +
            self.duplications() + self.releases()
    }
}

impl<A> Allocator for Counting<A>
    where
        A: Allocator
{
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.inner.allocate(size)
    }

    fn allocate_scalar(&self, size: usize) -> Option<NonNull<u8>> {
        self.scalar_allocations.fetch_add(1, Ordering::Relaxed);
        self.inner.allocate_scalar(size)
    }

    fn allocate_zeroed(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        self.zeroed_allocations.fetch_add(1, Ordering::Relaxed);
        self.inner.allocate_zeroed(count, size)
    }

    unsafe fn reallocate(&self, block: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        self.reallocations.fetch_add(1, Ordering::Relaxed);
        self.inner.reallocate(block, size)
    }

    fn duplicate_string(&self, text: &CStr) -> Option<NonNull<c_char>> {
        self.duplications.fetch_add(1, Ordering::Relaxed);
        self.inner.duplicate_string(text)
    }

    unsafe fn release(&self, block: NonNull<u8>) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.inner.release(block)
    }
}
