//! Implementation of the platform allocator and failure handler.

use std::{
    ffi::CStr,
    io::Write,
    os::raw::c_char,
    process,
    ptr::NonNull,
};

use lowutil_core::{AllocationFailure, Allocator, FailureHandler};

/// Implementation of the Allocator trait, over the C library `malloc` family.
///
/// Requests for 0 bytes are served as requests for 1 byte, so that every successful request yields a unique block.
#[derive(Clone, Copy, Debug, Default)]
pub struct System;

impl System {
    /// Creates an instance.
    pub const fn new() -> Self { Self }
}

impl Allocator for System {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        //  Safety:
        //  -   `malloc` has no precondition.
        NonNull::new(unsafe { libc::malloc(size.max(1)) } as *mut u8)
    }

    fn allocate_zeroed(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let (count, size) = if count == 0 || size == 0 { (1, 1) } else { (count, size) };

        //  Safety:
        //  -   `calloc` has no precondition, and checks for overflow.
        NonNull::new(unsafe { libc::calloc(count, size) } as *mut u8)
    }

    unsafe fn reallocate(&self, block: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        let block = block.map_or(std::ptr::null_mut(), |block| block.as_ptr() as *mut libc::c_void);

        //  Safety:
        //  -   `block` is null, or was returned by `malloc`, `calloc`, `realloc` or `strdup`.
        //  -   `size` is not 0, hence `realloc` does not release `block` on its own.
        NonNull::new(libc::realloc(block, size.max(1)) as *mut u8)
    }

    fn duplicate_string(&self, text: &CStr) -> Option<NonNull<c_char>> {
        //  Safety:
        //  -   `text` is NUL-terminated.
        NonNull::new(unsafe { libc::strdup(text.as_ptr()) })
    }

    unsafe fn release(&self, block: NonNull<u8>) {
        //  Safety:
        //  -   `block` was returned by `malloc`, `calloc`, `realloc` or `strdup`.
        libc::free(block.as_ptr() as *mut libc::c_void)
    }
}

/// Implementation of the FailureHandler trait, printing the failure on the standard error and aborting.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbortOnFailure;

impl AbortOnFailure {
    /// Creates an instance.
    pub const fn new() -> Self { Self }
}

impl FailureHandler for AbortOnFailure {
    #[cold]
    fn on_failure(&self, failure: &AllocationFailure) -> ! {
        let message = failure.message();

        //  Standard error is unbuffered: nothing to allocate, and nothing to do if the write fails anyway.
        let _ = writeln!(std::io::stderr(), "{}", message);

        process::abort()
    }
}
