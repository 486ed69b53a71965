//! An allocator which never satisfies any request.

use std::{
    ffi::CStr,
    os::raw::c_char,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use lowutil_core::Allocator;

/// Failing
///
/// Every allocation request fails; releasing is a logic error, since no block was ever handed out.
#[derive(Debug, Default)]
pub struct Failing {
    attempts: AtomicUsize,
}

impl Failing {
    /// Creates an instance.
    pub const fn new() -> Self { Self { attempts: AtomicUsize::new(0) } }

    /// Returns the number of allocation requests received.
    pub fn attempts(&self) -> usize { self.attempts.load(Ordering::Relaxed) }

    fn attempt<T>(&self) -> Option<NonNull<T>> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        None
    }
}

impl Allocator for Failing {
    fn allocate(&self, _: usize) -> Option<NonNull<u8>> { self.attempt() }

    fn allocate_scalar(&self, _: usize) -> Option<NonNull<u8>> { self.attempt() }

    fn allocate_zeroed(&self, _: usize, _: usize) -> Option<NonNull<u8>> { self.attempt() }

    unsafe fn reallocate(&self, _: Option<NonNull<u8>>, _: usize) -> Option<NonNull<u8>> { self.attempt() }

    fn duplicate_string(&self, _: &CStr) -> Option<NonNull<c_char>> { self.attempt() }

    unsafe fn release(&self, block: NonNull<u8>) {
        panic!("Failing never allocated {:?}", block);
    }
}
