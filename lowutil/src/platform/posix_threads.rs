//! Implementation of the ThreadLifecycle trait, over POSIX threads.

use std::os::raw::{c_int, c_void};

use lowutil_core::{StartRoutine, ThreadLifecycle};

/// Implementation of the ThreadLifecycle trait, over the C library `pthread_*` functions.
#[derive(Clone, Copy, Debug, Default)]
pub struct PosixThreads;

impl PosixThreads {
    /// Creates an instance.
    pub const fn new() -> Self { Self }
}

impl ThreadLifecycle for PosixThreads {
    type Thread = libc::pthread_t;
    type Attributes = libc::pthread_attr_t;
    type SignalSet = libc::sigset_t;

    unsafe fn create(
        &self,
        thread: *mut libc::pthread_t,
        attributes: *const libc::pthread_attr_t,
        start: StartRoutine,
        argument: *mut c_void,
    )
        -> c_int
    {
        //  Safety:
        //  -   `StartRoutine` is `extern "C" fn(*mut c_void) -> *mut c_void`, as expected by `pthread_create`.
        let start = std::mem::transmute::<StartRoutine, extern "C" fn(*mut c_void) -> *mut c_void>(start);

        libc::pthread_create(thread, attributes, start, argument)
    }

    unsafe fn join(&self, thread: libc::pthread_t, result: *mut *mut c_void) -> c_int {
        libc::pthread_join(thread, result)
    }

    unsafe fn cancel(&self, thread: libc::pthread_t) -> c_int { pthread_cancel(thread) }

    unsafe fn detach(&self, thread: libc::pthread_t) -> c_int { libc::pthread_detach(thread) }

    unsafe fn exit(&self, result: *mut c_void) -> ! { libc::pthread_exit(result) }

    unsafe fn set_signal_mask(&self, how: c_int, new_mask: *const libc::sigset_t, old_mask: *mut libc::sigset_t)
        -> c_int
    {
        libc::pthread_sigmask(how, new_mask, old_mask)
    }
}

//  Declared locally, older versions of the libc crate do not expose it.
extern "C" {
    fn pthread_cancel(thread: libc::pthread_t) -> c_int;
}
