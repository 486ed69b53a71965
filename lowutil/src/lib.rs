//! A pluggable allocation and thread-lifecycle policy.
//!
//! Library code never calls the platform allocation or thread primitives directly: it calls the functions of this
//! crate, which forward to the policy installed in the process-wide store. The embedding application may install its
//! own policy once, during start-up, before any memory or thread request is made.
//!
//! Out of the box, the store holds the platform policy:
//!
//! -   `System`, serving memory from the C library.
//! -   `AbortOnFailure`, printing a diagnostic and aborting whenever a never-failing request cannot be satisfied.
//! -   `PosixThreads`, serving thread requests from the POSIX threads library.
//!
//! `Pooled` offers an alternative allocator, caching released blocks in size classes.

#![deny(missing_docs)]

mod global;
mod platform;
mod pool;

pub use lowutil_core::{
    AllocationFailure, AllocationPolicy, Allocator, FailureHandler, FailureMessage, Operation, PowerOf2,
};

#[cfg(feature = "threads")]
pub use lowutil_core::{StartRoutine, ThreadError, ThreadLifecycle, ThreadPolicy};

pub use global::{
    allocate, allocate_scalar, allocate_zeroed, allocation_policy, duplicate_string, initialize_allocation_policy,
    reallocate, release, try_allocate, try_allocate_scalar, try_allocate_zeroed, try_duplicate_string,
    try_reallocate, GlobalAllocationPolicy, InitializationError, SharedAllocator, SharedFailureHandler,
};

#[cfg(feature = "threads")]
pub use global::{
    cancel_thread, create_thread, detach_thread, exit_thread, initialize_thread_policy, join_thread,
    set_thread_signal_mask, thread_policy, GlobalThreadPolicy, SharedThreadLifecycle,
};

pub use platform::{AbortOnFailure, System};

#[cfg(feature = "threads")]
pub use platform::PosixThreads;

pub use pool::Pooled;
