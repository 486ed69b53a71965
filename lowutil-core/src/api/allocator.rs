//! Allocator
//!
//! The Allocator trait is the set of memory routines backing a policy. By abstracting the underlying routines, it
//! becomes possible to serve all memory requests of an application from the platform allocator, a pool, or a
//! conservative garbage collector, without touching a single call site.
//!
//! Blocks are opaque: the allocator is not told the size of a block on release, mirroring `free`.

use core::{
    ffi::{c_char, CStr},
    ptr::{self, NonNull},
};

/// Abstraction of the memory routines of a backing allocator.
///
/// `allocate`, `reallocate` and `release` are required; the other routines have default implementations in terms of
/// those, which an implementation may override when the backing allocator offers a better primitive.
///
/// None of the routines may panic to signal exhaustion: they return `None`, and it is up to the policy to decide
/// whether this is fatal.
pub trait Allocator {
    /// Allocates a fresh block of at least `size` bytes, suitably aligned for any fundamental type.
    ///
    /// The block may contain pointers to other blocks.
    ///
    /// May return `None` if the request cannot be satisfied. A request for 0 bytes must still return a unique block,
    /// or `None`.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Allocates a fresh block of at least `size` bytes, which will never contain any pointer.
    ///
    /// The hint allows a conservative garbage collector to skip scanning the block, or a pool to segregate it. The
    /// hint must not affect the usable size or the alignment of the block.
    fn allocate_scalar(&self, size: usize) -> Option<NonNull<u8>> { self.allocate(size) }

    /// Allocates a fresh block of `count * size` bytes, all zeroed.
    ///
    /// Returns `None` if `count * size` overflows.
    fn allocate_zeroed(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let total = count.checked_mul(size)?;
        let block = self.allocate(total)?;

        //  Safety:
        //  -   `block` is valid for at least `total` bytes.
        unsafe { ptr::write_bytes(block.as_ptr(), 0, total) };

        Some(block)
    }

    /// Resizes `block` to at least `size` bytes, possibly moving it.
    ///
    /// If `block` is `None`, behaves as `allocate`. If `None` is returned, the original block is left untouched and
    /// still owned by the caller.
    ///
    /// #   Safety
    ///
    /// -   Assumes `block`, if any, was returned by this instance and not released since.
    unsafe fn reallocate(&self, block: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>>;

    /// Allocates a copy of `text`, terminating NUL included.
    ///
    /// The copy is a scalar block.
    fn duplicate_string(&self, text: &CStr) -> Option<NonNull<c_char>> {
        let bytes = text.to_bytes_with_nul();
        let block = self.allocate_scalar(bytes.len())?;

        //  Safety:
        //  -   `block` is valid for at least `bytes.len()` bytes, and freshly allocated hence not overlapping.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), block.as_ptr(), bytes.len()) };

        Some(block.cast())
    }

    /// Releases `block`.
    ///
    /// #   Safety
    ///
    /// -   Assumes `block` was returned by this instance and not released since.
    /// -   Assumes the memory pointed to by `block` is no longer in use.
    unsafe fn release(&self, block: NonNull<u8>);
}

impl<'a, A> Allocator for &'a A
    where
        A: Allocator + ?Sized
{
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> { (**self).allocate(size) }

    fn allocate_scalar(&self, size: usize) -> Option<NonNull<u8>> { (**self).allocate_scalar(size) }

    fn allocate_zeroed(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate_zeroed(count, size)
    }

    unsafe fn reallocate(&self, block: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        (**self).reallocate(block, size)
    }

    fn duplicate_string(&self, text: &CStr) -> Option<NonNull<c_char>> { (**self).duplicate_string(text) }

    unsafe fn release(&self, block: NonNull<u8>) { (**self).release(block) }
}
