//! Thread Lifecycle.
//!
//! Some backing allocators need to be told about threads: a conservative garbage collector must scan their stacks,
//! and thus provides its own thread creation routines. The ThreadLifecycle trait abstracts the routines creating,
//! joining, cancelling, detaching and exiting threads, as well as masking their signals.
//!
//! Unlike allocation, there is no never-failing flavor: every failure is reported to the caller as the status code
//! the routine returned, unmodified.

use core::{
    ffi::{c_int, c_void},
    mem::MaybeUninit,
    num::NonZeroI32,
    ptr,
};

use thiserror::Error;

/// Entry point of a thread.
pub type StartRoutine = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

/// Abstraction of the thread routines of a threading library.
///
/// The routines follow the conventions of POSIX threads: they return 0 on success, and an error code otherwise.
pub trait ThreadLifecycle {
    /// Handle to a thread.
    type Thread: Copy;

    /// Attributes of a thread to be created.
    type Attributes;

    /// Set of signals.
    type SignalSet;

    /// Creates a thread, running `start(argument)`, and stores its handle in `thread`.
    ///
    /// #   Safety
    ///
    /// -   Assumes `thread` is valid for writes.
    /// -   Assumes `attributes` is either null or points to initialized attributes.
    /// -   Assumes `argument` is valid for whatever use `start` makes of it.
    unsafe fn create(
        &self,
        thread: *mut Self::Thread,
        attributes: *const Self::Attributes,
        start: StartRoutine,
        argument: *mut c_void,
    )
        -> c_int;

    /// Waits for `thread` to terminate, and stores its result in `result`, unless null.
    ///
    /// #   Safety
    ///
    /// -   Assumes `thread` is joinable.
    /// -   Assumes `result` is either null or valid for writes.
    unsafe fn join(&self, thread: Self::Thread, result: *mut *mut c_void) -> c_int;

    /// Requests the cancellation of `thread`.
    ///
    /// #   Safety
    ///
    /// -   Assumes `thread` refers to a thread which has not been joined or detached yet.
    unsafe fn cancel(&self, thread: Self::Thread) -> c_int;

    /// Detaches `thread`, its resources being reclaimed on termination.
    ///
    /// #   Safety
    ///
    /// -   Assumes `thread` refers to a thread which has not been joined or detached yet.
    unsafe fn detach(&self, thread: Self::Thread) -> c_int;

    /// Terminates the calling thread, with `result` as result.
    ///
    /// #   Safety
    ///
    /// -   Assumes that no destructor on the calling thread's stack needs running.
    unsafe fn exit(&self, result: *mut c_void) -> !;

    /// Examines and changes the signal mask of the calling thread.
    ///
    /// `how` specifies how `new_mask`, unless null, is combined with the current mask; the previous mask is stored in
    /// `old_mask`, unless null.
    ///
    /// #   Safety
    ///
    /// -   Assumes `new_mask` is either null or points to an initialized set.
    /// -   Assumes `old_mask` is either null or valid for writes.
    unsafe fn set_signal_mask(&self, how: c_int, new_mask: *const Self::SignalSet, old_mask: *mut Self::SignalSet)
        -> c_int;
}

impl<'a, T> ThreadLifecycle for &'a T
    where
        T: ThreadLifecycle + ?Sized
{
    type Thread = T::Thread;
    type Attributes = T::Attributes;
    type SignalSet = T::SignalSet;

    unsafe fn create(
        &self,
        thread: *mut Self::Thread,
        attributes: *const Self::Attributes,
        start: StartRoutine,
        argument: *mut c_void,
    )
        -> c_int
    {
        (**self).create(thread, attributes, start, argument)
    }

    unsafe fn join(&self, thread: Self::Thread, result: *mut *mut c_void) -> c_int { (**self).join(thread, result) }

    unsafe fn cancel(&self, thread: Self::Thread) -> c_int { (**self).cancel(thread) }

    unsafe fn detach(&self, thread: Self::Thread) -> c_int { (**self).detach(thread) }

    unsafe fn exit(&self, result: *mut c_void) -> ! { (**self).exit(result) }

    unsafe fn set_signal_mask(&self, how: c_int, new_mask: *const Self::SignalSet, old_mask: *mut Self::SignalSet)
        -> c_int
    {
        (**self).set_signal_mask(how, new_mask, old_mask)
    }
}

/// Failure of a thread routine, carrying the code it returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
#[error("thread routine failed with code {0}")]
pub struct ThreadError(NonZeroI32);

impl ThreadError {
    /// Interprets the status code returned by a thread routine.
    pub fn check(status: c_int) -> Result<(), ThreadError> {
        match NonZeroI32::new(status) {
            None => Ok(()),
            Some(code) => Err(ThreadError(code)),
        }
    }

    /// Returns the code, as returned by the routine.
    pub fn code(&self) -> c_int { self.0.get() }
}

/// Thread Policy.
///
/// Forwards each operation to the `ThreadLifecycle`, converting status codes to `Result`.
pub struct ThreadPolicy<T> {
    lifecycle: T,
}

impl<T> ThreadPolicy<T> {
    /// Creates a policy.
    pub const fn new(lifecycle: T) -> Self { Self { lifecycle } }

    /// Returns a reference to the lifecycle routines.
    pub fn lifecycle(&self) -> &T { &self.lifecycle }
}

impl<T> ThreadPolicy<T>
    where
        T: ThreadLifecycle
{
    /// Creates a thread running `start(argument)`, and returns its handle.
    ///
    /// #   Safety
    ///
    /// -   Assumes `argument` is valid for whatever use `start` makes of it, for as long as the thread runs.
    pub unsafe fn create(&self, attributes: Option<&T::Attributes>, start: StartRoutine, argument: *mut c_void)
        -> Result<T::Thread, ThreadError>
    {
        let mut thread = MaybeUninit::uninit();
        let attributes = attributes.map_or(ptr::null(), |attributes| attributes as *const _);

        ThreadError::check(self.lifecycle.create(thread.as_mut_ptr(), attributes, start, argument))?;

        //  Safety:
        //  -   On success, `create` stored the handle.
        Ok(thread.assume_init())
    }

    /// Waits for `thread` to terminate, and returns its result.
    ///
    /// #   Safety
    ///
    /// -   Assumes `thread` is joinable.
    pub unsafe fn join(&self, thread: T::Thread) -> Result<*mut c_void, ThreadError> {
        let mut result = ptr::null_mut();

        ThreadError::check(self.lifecycle.join(thread, &mut result))?;

        Ok(result)
    }

    /// Requests the cancellation of `thread`.
    ///
    /// #   Safety
    ///
    /// -   Assumes `thread` has not been joined or detached yet.
    pub unsafe fn cancel(&self, thread: T::Thread) -> Result<(), ThreadError> {
        ThreadError::check(self.lifecycle.cancel(thread))
    }

    /// Detaches `thread`.
    ///
    /// #   Safety
    ///
    /// -   Assumes `thread` has not been joined or detached yet.
    pub unsafe fn detach(&self, thread: T::Thread) -> Result<(), ThreadError> {
        ThreadError::check(self.lifecycle.detach(thread))
    }

    /// Terminates the calling thread.
    ///
    /// #   Safety
    ///
    /// -   Assumes that no destructor on the calling thread's stack needs running.
    pub unsafe fn exit(&self, result: *mut c_void) -> ! { self.lifecycle.exit(result) }

    /// Examines and changes the signal mask of the calling thread.
    ///
    /// The previous mask is stored in `old_mask`, if provided.
    pub fn set_signal_mask(&self, how: c_int, new_mask: Option<&T::SignalSet>, old_mask: Option<&mut T::SignalSet>)
        -> Result<(), ThreadError>
    {
        let new_mask = new_mask.map_or(ptr::null(), |mask| mask as *const _);
        let old_mask = old_mask.map_or(ptr::null_mut(), |mask| mask as *mut _);

        //  Safety:
        //  -   Both pointers are either null, or derived from references.
        ThreadError::check(unsafe { self.lifecycle.set_signal_mask(how, new_mask, old_mask) })
    }
}
