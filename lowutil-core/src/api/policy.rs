//! Allocation Policy.
//!
//! An instance of the Allocation Policy bundles the routines serving memory requests:
//!
//! -   An `Allocator`, to which all requests are forwarded.
//! -   A `FailureHandler`, invoked whenever a never-failing request cannot be satisfied.
//!
//! Each memory request comes in two flavors:
//!
//! -   Never-failing, such as `allocate`: the result is always a valid block, or the process does not survive.
//! -   Fallible, such as `try_allocate`: the result is `None` on failure, and the caller is expected to recover.
//!
//! Typically, applications construct a single policy at start-up and pass it by reference to every call site.

use core::{
    ffi::{c_char, CStr},
    panic::Location,
    ptr::NonNull,
};

use crate::{AllocationFailure, Allocator, FailureHandler, Operation};

/// Allocation Policy.
///
/// The policy is immutable once constructed: concurrent use from multiple threads is as safe as the underlying
/// `Allocator` and `FailureHandler` are.
pub struct AllocationPolicy<A, F> {
    allocator: A,
    handler: F,
}

impl<A, F> AllocationPolicy<A, F> {
    /// Creates a policy.
    ///
    /// The policy created will serve memory from `allocator`, and report exhaustion to `handler`.
    pub const fn new(allocator: A, handler: F) -> Self { Self { allocator, handler } }

    /// Returns a reference to the allocator.
    pub fn allocator(&self) -> &A { &self.allocator }

    /// Returns a reference to the failure handler.
    pub fn handler(&self) -> &F { &self.handler }
}

impl<A, F> AllocationPolicy<A, F>
    where
        A: Allocator,
        F: FailureHandler,
{
    /// Allocates a block of at least `size` bytes, which may contain pointers.
    #[track_caller]
    pub fn allocate(&self, size: usize) -> NonNull<u8> {
        let location = Location::caller();

        self.try_allocate(size)
            .unwrap_or_else(|| self.fail(Operation::Allocate, 1, size, location))
    }

    /// Allocates a block of at least `size` bytes, which will never contain pointers.
    #[track_caller]
    pub fn allocate_scalar(&self, size: usize) -> NonNull<u8> {
        let location = Location::caller();

        self.try_allocate_scalar(size)
            .unwrap_or_else(|| self.fail(Operation::AllocateScalar, 1, size, location))
    }

    /// Allocates a zeroed block of `count * size` bytes.
    #[track_caller]
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> NonNull<u8> {
        let location = Location::caller();

        self.try_allocate_zeroed(count, size)
            .unwrap_or_else(|| self.fail(Operation::AllocateZeroed, count, size, location))
    }

    /// Resizes `block` to at least `size` bytes, possibly moving it.
    ///
    /// #   Safety
    ///
    /// -   Assumes `block`, if any, was obtained from this policy and not released since.
    #[track_caller]
    pub unsafe fn reallocate(&self, block: Option<NonNull<u8>>, size: usize) -> NonNull<u8> {
        let location = Location::caller();

        self.try_reallocate(block, size)
            .unwrap_or_else(|| self.fail(Operation::Reallocate, 1, size, location))
    }

    /// Allocates a copy of `text`.
    #[track_caller]
    pub fn duplicate_string(&self, text: &CStr) -> NonNull<c_char> {
        let location = Location::caller();

        self.try_duplicate_string(text)
            .unwrap_or_else(|| self.fail(Operation::DuplicateString, 1, text.to_bytes_with_nul().len(), location))
    }

    /// Attempts to allocate a block of at least `size` bytes, which may contain pointers.
    pub fn try_allocate(&self, size: usize) -> Option<NonNull<u8>> { self.allocator.allocate(size) }

    /// Attempts to allocate a block of at least `size` bytes, which will never contain pointers.
    pub fn try_allocate_scalar(&self, size: usize) -> Option<NonNull<u8>> { self.allocator.allocate_scalar(size) }

    /// Attempts to allocate a zeroed block of `count * size` bytes.
    pub fn try_allocate_zeroed(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        self.allocator.allocate_zeroed(count, size)
    }

    /// Attempts to resize `block` to at least `size` bytes, possibly moving it.
    ///
    /// On failure, `block` is left untouched.
    ///
    /// #   Safety
    ///
    /// -   Assumes `block`, if any, was obtained from this policy and not released since.
    pub unsafe fn try_reallocate(&self, block: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        self.allocator.reallocate(block, size)
    }

    /// Attempts to allocate a copy of `text`.
    pub fn try_duplicate_string(&self, text: &CStr) -> Option<NonNull<c_char>> {
        self.allocator.duplicate_string(text)
    }

    /// Releases `block`; releasing `None` is a no-op.
    ///
    /// #   Safety
    ///
    /// -   Assumes `block`, if any, was obtained from this policy and not released since.
    /// -   Assumes the memory pointed to by `block` is no longer in use.
    pub unsafe fn release(&self, block: Option<NonNull<u8>>) {
        if let Some(block) = block {
            self.allocator.release(block);
        }
    }

    #[cold]
    #[inline(never)]
    fn fail(&self, operation: Operation, count: usize, size: usize, location: &'static Location<'static>) -> ! {
        let failure = AllocationFailure::new(operation, count, size, location);

        self.handler.on_failure(&failure)
    }
}

impl<A, F> Default for AllocationPolicy<A, F>
    where
        A: Default,
        F: Default,
{
    fn default() -> Self { Self::new(A::default(), F::default()) }
}
