//! The process-wide policy store.
//!
//! Each policy is written at most once: either explicitly, by its initializer, or implicitly, with the platform
//! default, by the first request made through the free functions of this module.

use std::{
    ffi::CStr,
    os::raw::c_char,
    ptr::NonNull,
    sync::OnceLock,
};

use thiserror::Error;

use lowutil_core::{AllocationPolicy, Allocator, FailureHandler};

use crate::platform::{AbortOnFailure, System};

#[cfg(feature = "threads")]
pub use self::threads::*;

/// An allocator which may be shared across threads.
pub type SharedAllocator = dyn Allocator + Sync;

/// A failure handler which may be shared across threads.
pub type SharedFailureHandler = dyn FailureHandler + Sync;

/// The allocation policy held in the store.
pub type GlobalAllocationPolicy = AllocationPolicy<&'static SharedAllocator, &'static SharedFailureHandler>;

/// Failure to initialize a policy of the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InitializationError {
    /// The policy was already initialized, explicitly or by its first use; the active policy is left untouched.
    #[error("{0} policy already initialized, or already in use")]
    AlreadyInitialized(&'static str),
}

/// Installs the allocation policy of the process.
///
/// Must be called at most once, before any memory is requested through this crate, from any thread.
pub fn initialize_allocation_policy(
    allocator: &'static SharedAllocator,
    handler: &'static SharedFailureHandler,
)
    -> Result<(), InitializationError>
{
    initialize(&ALLOCATION_POLICY, "allocation", || AllocationPolicy::new(allocator, handler))
}

/// Returns the allocation policy of the process.
///
/// If none was installed yet, installs the platform default: `System` and `AbortOnFailure`.
pub fn allocation_policy() -> &'static GlobalAllocationPolicy {
    ALLOCATION_POLICY.get_or_init(|| AllocationPolicy::new(&SYSTEM, &ABORT_ON_FAILURE))
}

/// Allocates a block of at least `size` bytes, which may contain pointers.
///
/// On failure, invokes the failure handler of the process, which does not return.
#[track_caller]
pub fn allocate(size: usize) -> NonNull<u8> { allocation_policy().allocate(size) }

/// Allocates a block of at least `size` bytes, which will never contain pointers.
///
/// On failure, invokes the failure handler of the process, which does not return.
#[track_caller]
pub fn allocate_scalar(size: usize) -> NonNull<u8> { allocation_policy().allocate_scalar(size) }

/// Allocates a zeroed block of `count * size` bytes.
///
/// On failure, overflow included, invokes the failure handler of the process, which does not return.
#[track_caller]
pub fn allocate_zeroed(count: usize, size: usize) -> NonNull<u8> { allocation_policy().allocate_zeroed(count, size) }

/// Resizes `block` to at least `size` bytes, possibly moving it; `None` allocates a new block.
///
/// On failure, invokes the failure handler of the process, which does not return.
///
/// #   Safety
///
/// -   Assumes `block`, if any, was allocated through this crate, and not released yet.
#[track_caller]
pub unsafe fn reallocate(block: Option<NonNull<u8>>, size: usize) -> NonNull<u8> {
    allocation_policy().reallocate(block, size)
}

/// Copies `text`, NUL terminator included, into a newly allocated scalar block.
///
/// On failure, invokes the failure handler of the process, which does not return.
#[track_caller]
pub fn duplicate_string(text: &CStr) -> NonNull<c_char> { allocation_policy().duplicate_string(text) }

/// Allocates a block of at least `size` bytes, which may contain pointers, or returns `None`.
pub fn try_allocate(size: usize) -> Option<NonNull<u8>> { allocation_policy().try_allocate(size) }

/// Allocates a block of at least `size` bytes, which will never contain pointers, or returns `None`.
pub fn try_allocate_scalar(size: usize) -> Option<NonNull<u8>> { allocation_policy().try_allocate_scalar(size) }

/// Allocates a zeroed block of `count * size` bytes, or returns `None`.
pub fn try_allocate_zeroed(count: usize, size: usize) -> Option<NonNull<u8>> {
    allocation_policy().try_allocate_zeroed(count, size)
}

/// Resizes `block` to at least `size` bytes, possibly moving it, or returns `None`, leaving `block` untouched.
///
/// #   Safety
///
/// -   Assumes `block`, if any, was allocated through this crate, and not released yet.
pub unsafe fn try_reallocate(block: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
    allocation_policy().try_reallocate(block, size)
}

/// Copies `text`, NUL terminator included, into a newly allocated scalar block, or returns `None`.
pub fn try_duplicate_string(text: &CStr) -> Option<NonNull<c_char>> { allocation_policy().try_duplicate_string(text) }

/// Releases `block`; `None` is a no-op.
///
/// #   Safety
///
/// -   Assumes `block`, if any, was allocated through this crate, and not released yet.
pub unsafe fn release(block: Option<NonNull<u8>>) { allocation_policy().release(block) }

//
//  Implementation
//

static SYSTEM: System = System::new();
static ABORT_ON_FAILURE: AbortOnFailure = AbortOnFailure::new();

static ALLOCATION_POLICY: OnceLock<GlobalAllocationPolicy> = OnceLock::new();

fn initialize<T>(cell: &'static OnceLock<T>, name: &'static str, policy: impl FnOnce() -> T)
    -> Result<(), InitializationError>
{
    let mut installed = false;

    cell.get_or_init(|| {
        installed = true;
        policy()
    });

    if installed {
        Ok(())
    } else {
        Err(InitializationError::AlreadyInitialized(name))
    }
}

#[cfg(feature = "threads")]
mod threads {

use std::os::raw::{c_int, c_void};

use lowutil_core::{StartRoutine, ThreadError, ThreadLifecycle, ThreadPolicy};

use crate::platform::PosixThreads;

use super::{initialize, InitializationError};

/// A thread lifecycle, over POSIX types, which may be shared across threads.
pub type SharedThreadLifecycle =
    dyn ThreadLifecycle<Thread = libc::pthread_t, Attributes = libc::pthread_attr_t, SignalSet = libc::sigset_t>
        + Sync;

/// The thread policy held in the store.
pub type GlobalThreadPolicy = ThreadPolicy<&'static SharedThreadLifecycle>;

/// Installs the thread policy of the process.
///
/// Must be called at most once, before any thread is created through this crate, from any thread.
pub fn initialize_thread_policy(lifecycle: &'static SharedThreadLifecycle) -> Result<(), InitializationError> {
    initialize(&THREAD_POLICY, "thread", || ThreadPolicy::new(lifecycle))
}

/// Returns the thread policy of the process.
///
/// If none was installed yet, installs the platform default: `PosixThreads`.
pub fn thread_policy() -> &'static GlobalThreadPolicy {
    THREAD_POLICY.get_or_init(|| ThreadPolicy::new(&POSIX_THREADS))
}

/// Creates a thread running `start(argument)`, and returns its handle.
///
/// #   Safety
///
/// -   Assumes `argument` is valid for whatever use `start` makes of it, for as long as the thread runs.
pub unsafe fn create_thread(attributes: Option<&libc::pthread_attr_t>, start: StartRoutine, argument: *mut c_void)
    -> Result<libc::pthread_t, ThreadError>
{
    thread_policy().create(attributes, start, argument)
}

/// Waits for `thread` to terminate, and returns its result.
///
/// #   Safety
///
/// -   Assumes `thread` is joinable.
pub unsafe fn join_thread(thread: libc::pthread_t) -> Result<*mut c_void, ThreadError> {
    thread_policy().join(thread)
}

/// Requests the cancellation of `thread`.
///
/// #   Safety
///
/// -   Assumes `thread` has not been joined or detached yet.
pub unsafe fn cancel_thread(thread: libc::pthread_t) -> Result<(), ThreadError> { thread_policy().cancel(thread) }

/// Detaches `thread`, its resources being reclaimed on termination.
///
/// #   Safety
///
/// -   Assumes `thread` has not been joined or detached yet.
pub unsafe fn detach_thread(thread: libc::pthread_t) -> Result<(), ThreadError> { thread_policy().detach(thread) }

/// Terminates the calling thread, with `result`.
///
/// #   Safety
///
/// -   Assumes no Rust frame with a destructor is left on the stack of the calling thread.
pub unsafe fn exit_thread(result: *mut c_void) -> ! { thread_policy().exit(result) }

/// Examines or changes the signal mask of the calling thread.
pub fn set_thread_signal_mask(
    how: c_int,
    new_mask: Option<&libc::sigset_t>,
    old_mask: Option<&mut libc::sigset_t>,
)
    -> Result<(), ThreadError>
{
    thread_policy().set_signal_mask(how, new_mask, old_mask)
}

static POSIX_THREADS: PosixThreads = PosixThreads::new();

static THREAD_POLICY: std::sync::OnceLock<GlobalThreadPolicy> = std::sync::OnceLock::new();

}
