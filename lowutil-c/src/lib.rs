#![deny(missing_docs)]

//! Exposition of the lowutil API via a C ABI.
//!
//! The C embedder installs its routines with `lowutil_initialize_memory_allocation` and `lowutil_initialize_threads`,
//! once, during start-up, then requests memory and threads through the `lowutil_*` wrappers.

use std::{
    ffi::CStr,
    io::Write,
    os::raw::{c_char, c_void},
    process,
    ptr::{self, NonNull},
    sync::OnceLock,
};

use lowutil::{AllocationFailure, Allocator, FailureHandler};

#[cfg(feature = "threads")]
pub use self::threads::*;

/// A C `malloc`-like routine.
pub type MallocRoutine = unsafe extern "C" fn(usize) -> *mut c_void;

/// A C `calloc`-like routine.
pub type CallocRoutine = unsafe extern "C" fn(usize, usize) -> *mut c_void;

/// A C `realloc`-like routine.
pub type ReallocRoutine = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;

/// A C `strdup`-like routine.
pub type StrdupRoutine = unsafe extern "C" fn(*const c_char) -> *mut c_char;

/// A C `free`-like routine.
pub type FreeRoutine = unsafe extern "C" fn(*mut c_void);

/// A C failure handler, receiving the NUL-terminated description of the failure.
///
/// It is expected not to return; if it does, the process is aborted.
pub type FailureRoutine = unsafe extern "C" fn(*const c_char);

/// Installs the memory allocation routines of the process.
///
/// Must be called at most once, before any memory is requested, from any thread. A later call is reported on the
/// standard error, and ignored. A null routine is reported on the standard error, and aborts the process.
#[cold]
#[no_mangle]
pub extern fn lowutil_initialize_memory_allocation(
    malloc: Option<MallocRoutine>,
    scalar_malloc: Option<MallocRoutine>,
    calloc: Option<CallocRoutine>,
    realloc: Option<ReallocRoutine>,
    strdup: Option<StrdupRoutine>,
    free: Option<FreeRoutine>,
    on_failure: Option<FailureRoutine>,
)
{
    const NAME: &str = "lowutil_initialize_memory_allocation";

    let allocator = CAllocator {
        malloc: required(NAME, "malloc", malloc),
        scalar_malloc: required(NAME, "scalar_malloc", scalar_malloc),
        calloc: required(NAME, "calloc", calloc),
        realloc: required(NAME, "realloc", realloc),
        strdup: required(NAME, "strdup", strdup),
        free: required(NAME, "free", free),
    };

    let handler = CFailureHandler { on_failure: required(NAME, "on_failure", on_failure) };

    if ALLOCATION_ROUTINES.set((allocator, handler)).is_err() {
        diagnose(format_args!("{}: already initialized, ignored", NAME));
        return;
    }

    if let Some((allocator, handler)) = ALLOCATION_ROUTINES.get() {
        if let Err(error) = lowutil::initialize_allocation_policy(allocator, handler) {
            diagnose(format_args!("{}: {}, ignored", NAME, error));
        }
    }
}

/// Allocates `size` bytes of memory, which may contain pointers.
///
/// Never returns NULL: on failure, the failure handler is invoked and the process does not survive.
#[no_mangle]
pub extern fn lowutil_malloc(size: usize) -> *mut c_void { lowutil::allocate(size).as_ptr() as *mut c_void }

/// Allocates `size` bytes of memory, which will never contain pointers.
///
/// Never returns NULL: on failure, the failure handler is invoked and the process does not survive.
#[no_mangle]
pub extern fn lowutil_scalar_malloc(size: usize) -> *mut c_void {
    lowutil::allocate_scalar(size).as_ptr() as *mut c_void
}

/// Allocates `count * size` bytes of zeroed memory.
///
/// Never returns NULL: on failure, the failure handler is invoked and the process does not survive.
#[no_mangle]
pub extern fn lowutil_calloc(count: usize, size: usize) -> *mut c_void {
    lowutil::allocate_zeroed(count, size).as_ptr() as *mut c_void
}

/// Resizes the memory located at `block` to `size` bytes, possibly moving it; NULL allocates.
///
/// Never returns NULL: on failure, the failure handler is invoked and the process does not survive.
///
/// #   Safety
///
/// -   Assumes `block` is NULL, or was returned by a prior call to a `lowutil_*` allocation function.
/// -   Assumes `block` has not been released since its allocation.
#[no_mangle]
pub unsafe extern fn lowutil_realloc(block: *mut c_void, size: usize) -> *mut c_void {
    lowutil::reallocate(NonNull::new(block as *mut u8), size).as_ptr() as *mut c_void
}

/// Copies the NUL-terminated `text` into newly allocated memory.
///
/// Never returns NULL: on failure, the failure handler is invoked and the process does not survive.
///
/// #   Safety
///
/// -   Assumes `text` points to a NUL-terminated string.
#[no_mangle]
pub unsafe extern fn lowutil_strdup(text: *const c_char) -> *mut c_char {
    lowutil::duplicate_string(CStr::from_ptr(text)).as_ptr()
}

/// Allocates `size` bytes of memory, which may contain pointers; returns NULL on failure.
#[no_mangle]
pub extern fn lowutil_try_malloc(size: usize) -> *mut c_void { into_raw(lowutil::try_allocate(size)) }

/// Allocates `size` bytes of memory, which will never contain pointers; returns NULL on failure.
#[no_mangle]
pub extern fn lowutil_try_scalar_malloc(size: usize) -> *mut c_void { into_raw(lowutil::try_allocate_scalar(size)) }

/// Allocates `count * size` bytes of zeroed memory; returns NULL on failure.
#[no_mangle]
pub extern fn lowutil_try_calloc(count: usize, size: usize) -> *mut c_void {
    into_raw(lowutil::try_allocate_zeroed(count, size))
}

/// Resizes the memory located at `block` to `size` bytes, possibly moving it; NULL allocates.
///
/// Returns NULL on failure, in which case `block` is left untouched.
///
/// #   Safety
///
/// -   Assumes `block` is NULL, or was returned by a prior call to a `lowutil_*` allocation function.
/// -   Assumes `block` has not been released since its allocation.
#[no_mangle]
pub unsafe extern fn lowutil_try_realloc(block: *mut c_void, size: usize) -> *mut c_void {
    into_raw(lowutil::try_reallocate(NonNull::new(block as *mut u8), size))
}

/// Copies the NUL-terminated `text` into newly allocated memory; returns NULL on failure.
///
/// #   Safety
///
/// -   Assumes `text` points to a NUL-terminated string.
#[no_mangle]
pub unsafe extern fn lowutil_try_strdup(text: *const c_char) -> *mut c_char {
    lowutil::try_duplicate_string(CStr::from_ptr(text)).map_or(ptr::null_mut(), |copy| copy.as_ptr())
}

/// Releases the memory located at `block`; NULL is a no-op.
///
/// #   Safety
///
/// -   Assumes `block` is NULL, or was returned by a prior call to a `lowutil_*` allocation function.
/// -   Assumes `block` has not been released since its allocation.
#[no_mangle]
pub unsafe extern fn lowutil_free(block: *mut c_void) { lowutil::release(NonNull::new(block as *mut u8)) }

//
//  Implementation
//

static ALLOCATION_ROUTINES: OnceLock<(CAllocator, CFailureHandler)> = OnceLock::new();

struct CAllocator {
    malloc: MallocRoutine,
    scalar_malloc: MallocRoutine,
    calloc: CallocRoutine,
    realloc: ReallocRoutine,
    strdup: StrdupRoutine,
    free: FreeRoutine,
}

impl Allocator for CAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        //  Safety:
        //  -   The routine was installed as a `malloc`-like routine.
        NonNull::new(unsafe { (self.malloc)(size) } as *mut u8)
    }

    fn allocate_scalar(&self, size: usize) -> Option<NonNull<u8>> {
        //  Safety:
        //  -   The routine was installed as a `malloc`-like routine.
        NonNull::new(unsafe { (self.scalar_malloc)(size) } as *mut u8)
    }

    fn allocate_zeroed(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        //  Safety:
        //  -   The routine was installed as a `calloc`-like routine.
        NonNull::new(unsafe { (self.calloc)(count, size) } as *mut u8)
    }

    unsafe fn reallocate(&self, block: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        let block = block.map_or(ptr::null_mut(), |block| block.as_ptr() as *mut c_void);

        NonNull::new((self.realloc)(block, size) as *mut u8)
    }

    fn duplicate_string(&self, text: &CStr) -> Option<NonNull<c_char>> {
        //  Safety:
        //  -   The routine was installed as a `strdup`-like routine, and `text` is NUL-terminated.
        NonNull::new(unsafe { (self.strdup)(text.as_ptr()) })
    }

    unsafe fn release(&self, block: NonNull<u8>) { (self.free)(block.as_ptr() as *mut c_void) }
}

struct CFailureHandler {
    on_failure: FailureRoutine,
}

impl FailureHandler for CFailureHandler {
    #[cold]
    fn on_failure(&self, failure: &AllocationFailure) -> ! {
        let message = failure.message();

        //  Safety:
        //  -   The message is NUL-terminated, and outlives the call.
        unsafe { (self.on_failure)(message.as_c_str().as_ptr()) };

        diagnose(format_args!("failure handler returned, aborting"));

        process::abort()
    }
}

//  Returns `routine`, or aborts the process if null.
fn required<T>(function: &str, name: &str, routine: Option<T>) -> T {
    match routine {
        Some(routine) => routine,
        None => {
            diagnose(format_args!("{}: null {} routine, aborting", function, name));
            process::abort()
        }
    }
}

fn into_raw<T>(block: Option<NonNull<T>>) -> *mut c_void {
    block.map_or(ptr::null_mut(), |block| block.as_ptr() as *mut c_void)
}

//  Standard error is unbuffered: nothing to allocate, and nothing to do if the write fails anyway.
fn diagnose(arguments: std::fmt::Arguments<'_>) {
    let _ = writeln!(std::io::stderr(), "lowutil: {}", arguments);
}

#[cfg(feature = "threads")]
mod threads {

use std::{
    os::raw::{c_int, c_void},
    process,
    sync::OnceLock,
};

use lowutil::{StartRoutine, ThreadLifecycle};

use super::{diagnose, required};

/// A C `pthread_create`-like routine.
pub type CreateRoutine =
    unsafe extern "C" fn(*mut libc::pthread_t, *const libc::pthread_attr_t, StartRoutine, *mut c_void) -> c_int;

/// A C `pthread_join`-like routine.
pub type JoinRoutine = unsafe extern "C" fn(libc::pthread_t, *mut *mut c_void) -> c_int;

/// A C `pthread_cancel`-like, or `pthread_detach`-like, routine.
pub type ThreadRoutine = unsafe extern "C" fn(libc::pthread_t) -> c_int;

/// A C `pthread_exit`-like routine.
///
/// It is expected not to return; if it does, the process is aborted. It may unwind the stack of the calling thread,
/// as `pthread_exit` does.
pub type ExitRoutine = unsafe extern "C-unwind" fn(*mut c_void);

/// A C `pthread_sigmask`-like routine.
pub type SigmaskRoutine = unsafe extern "C" fn(c_int, *const libc::sigset_t, *mut libc::sigset_t) -> c_int;

/// Installs the thread routines of the process.
///
/// Must be called at most once, before any thread is created, from any thread. A later call is reported on the
/// standard error, and ignored. A null routine is reported on the standard error, and aborts the process.
#[cold]
#[no_mangle]
pub extern fn lowutil_initialize_threads(
    create: Option<CreateRoutine>,
    join: Option<JoinRoutine>,
    cancel: Option<ThreadRoutine>,
    detach: Option<ThreadRoutine>,
    exit: Option<ExitRoutine>,
    sigmask: Option<SigmaskRoutine>,
)
{
    const NAME: &str = "lowutil_initialize_threads";

    let threads = CThreads {
        create: required(NAME, "create", create),
        join: required(NAME, "join", join),
        cancel: required(NAME, "cancel", cancel),
        detach: required(NAME, "detach", detach),
        exit: required(NAME, "exit", exit),
        sigmask: required(NAME, "sigmask", sigmask),
    };

    if THREAD_ROUTINES.set(threads).is_err() {
        diagnose(format_args!("{}: already initialized, ignored", NAME));
        return;
    }

    if let Some(threads) = THREAD_ROUTINES.get() {
        if let Err(error) = lowutil::initialize_thread_policy(threads) {
            diagnose(format_args!("{}: {}, ignored", NAME, error));
        }
    }
}

/// Creates a thread running `start(argument)`, storing its handle in `thread`.
///
/// Returns the status of the installed routine, unmodified.
///
/// #   Safety
///
/// -   Assumes `thread` is valid for writes.
/// -   Assumes `attributes` is NULL, or points to initialized attributes.
/// -   Assumes `argument` is valid for whatever use `start` makes of it, for as long as the thread runs.
#[no_mangle]
pub unsafe extern fn lowutil_pthread_create(
    thread: *mut libc::pthread_t,
    attributes: *const libc::pthread_attr_t,
    start: StartRoutine,
    argument: *mut c_void,
)
    -> c_int
{
    lowutil::thread_policy().lifecycle().create(thread, attributes, start, argument)
}

/// Waits for `thread` to terminate, storing its result in `result` unless NULL.
///
/// Returns the status of the installed routine, unmodified.
///
/// #   Safety
///
/// -   Assumes `thread` is joinable.
/// -   Assumes `result` is NULL, or valid for writes.
#[no_mangle]
pub unsafe extern fn lowutil_pthread_join(thread: libc::pthread_t, result: *mut *mut c_void) -> c_int {
    lowutil::thread_policy().lifecycle().join(thread, result)
}

/// Requests the cancellation of `thread`.
///
/// Returns the status of the installed routine, unmodified.
///
/// #   Safety
///
/// -   Assumes `thread` has not been joined or detached yet.
#[no_mangle]
pub unsafe extern fn lowutil_pthread_cancel(thread: libc::pthread_t) -> c_int {
    lowutil::thread_policy().lifecycle().cancel(thread)
}

/// Detaches `thread`, its resources being reclaimed on termination.
///
/// Returns the status of the installed routine, unmodified.
///
/// #   Safety
///
/// -   Assumes `thread` has not been joined or detached yet.
#[no_mangle]
pub unsafe extern fn lowutil_pthread_detach(thread: libc::pthread_t) -> c_int {
    lowutil::thread_policy().lifecycle().detach(thread)
}

/// Terminates the calling thread, with `result`.
///
/// The installed routine may unwind the stack of the calling thread, through this function.
///
/// #   Safety
///
/// -   Assumes no Rust frame with a destructor is left on the stack of the calling thread.
#[no_mangle]
pub unsafe extern "C-unwind" fn lowutil_pthread_exit(result: *mut c_void) -> ! { lowutil::exit_thread(result) }

/// Examines or changes the signal mask of the calling thread.
///
/// Returns the status of the installed routine, unmodified.
///
/// #   Safety
///
/// -   Assumes `new_mask` is NULL, or points to an initialized signal set.
/// -   Assumes `old_mask` is NULL, or valid for writes.
#[no_mangle]
pub unsafe extern fn lowutil_pthread_sigmask(
    how: c_int,
    new_mask: *const libc::sigset_t,
    old_mask: *mut libc::sigset_t,
)
    -> c_int
{
    lowutil::thread_policy().lifecycle().set_signal_mask(how, new_mask, old_mask)
}

//
//  Implementation
//

static THREAD_ROUTINES: OnceLock<CThreads> = OnceLock::new();

struct CThreads {
    create: CreateRoutine,
    join: JoinRoutine,
    cancel: ThreadRoutine,
    detach: ThreadRoutine,
    exit: ExitRoutine,
    sigmask: SigmaskRoutine,
}

impl ThreadLifecycle for CThreads {
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
        (self.create)(thread, attributes, start, argument)
    }

    unsafe fn join(&self, thread: libc::pthread_t, result: *mut *mut c_void) -> c_int { (self.join)(thread, result) }

    unsafe fn cancel(&self, thread: libc::pthread_t) -> c_int { (self.cancel)(thread) }

    unsafe fn detach(&self, thread: libc::pthread_t) -> c_int { (self.detach)(thread) }

    unsafe fn exit(&self, result: *mut c_void) -> ! {
        (self.exit)(result);

        diagnose(format_args!("exit routine returned, aborting"));

        process::abort()
    }

    unsafe fn set_signal_mask(&self, how: c_int, new_mask: *const libc::sigset_t, old_mask: *mut libc::sigset_t)
        -> c_int
    {
        (self.sigmask)(how, new_mask, old_mask)
    }
}

}
