//  Thread requests served by an installed, scripted, lifecycle.

#![cfg(feature = "threads")]

use std::{
    os::raw::{c_int, c_void},
    sync::{Mutex, Once},
};

use serial_test::serial;

use lowutil::{InitializationError, PosixThreads, StartRoutine, ThreadLifecycle};
use lowutil_test::CallLog;

static SCRIPTED: Scripted = Scripted::new();

static INITIALIZE: Once = Once::new();

fn initialize() -> &'static Scripted {
    INITIALIZE.call_once(|| lowutil::initialize_thread_policy(&SCRIPTED).expect("Initialized"));

    SCRIPTED.log.clear();

    &SCRIPTED
}

unsafe extern "C" fn triple(argument: *mut c_void) -> *mut c_void { (argument as usize * 3) as *mut c_void }

#[serial]
#[test]
fn create_then_join() {
    let scripted = initialize();

    let thread = unsafe { lowutil::create_thread(None, triple, 14 as *mut c_void) }.expect("Created");
    let result = unsafe { lowutil::join_thread(thread) }.expect("Joined");

    assert_eq!(42, result as usize);
    assert_eq!(vec!["create", "join"], scripted.log.calls());
}

#[serial]
#[test]
fn failures_are_unmodified() {
    let scripted = initialize();

    let thread = unsafe { lowutil::create_thread(None, triple, std::ptr::null_mut()) }.expect("Created");

    let cancelled = unsafe { lowutil::cancel_thread(thread) }.unwrap_err();
    assert_eq!(libc::ESRCH, cancelled.code());

    let detached = unsafe { lowutil::detach_thread(thread) }.unwrap_err();
    assert_eq!(libc::EINVAL, detached.code());

    let masked = lowutil::set_thread_signal_mask(libc::SIG_BLOCK, None, None).unwrap_err();
    assert_eq!(-7, masked.code());

    assert_eq!(vec!["create", "cancel", "detach", "sigmask"], scripted.log.calls());

    //  Consume the pending start routine.
    let _ = unsafe { lowutil::join_thread(thread) };
}

#[serial]
#[test]
fn second_initialization_is_flagged() {
    static POSIX_THREADS: PosixThreads = PosixThreads::new();

    let scripted = initialize();

    assert_eq!(
        Err(InitializationError::AlreadyInitialized("thread")),
        lowutil::initialize_thread_policy(&POSIX_THREADS)
    );

    assert!(std::ptr::eq(lowutil::thread_policy(), lowutil::thread_policy()));
    assert!(scripted.log.calls().is_empty());
}

//
//  Implementation
//

//  Runs the start routine synchronously, on join, and fails every other operation with a distinctive code.
struct Scripted {
    log: CallLog,
    pending: Mutex<Option<(StartRoutine, usize)>>,
}

impl Scripted {
    const fn new() -> Self { Self { log: CallLog::new(), pending: Mutex::new(None) } }
}

impl ThreadLifecycle for Scripted {
    type Thread = libc::pthread_t;
    type Attributes = libc::pthread_attr_t;
    type SignalSet = libc::sigset_t;

    unsafe fn create(
        &self,
        thread: *mut libc::pthread_t,
        _: *const libc::pthread_attr_t,
        start: StartRoutine,
        argument: *mut c_void,
    )
        -> c_int
    {
        self.log.record("create");

        *self.pending.lock().unwrap() = Some((start, argument as usize));
        *thread = 7 as libc::pthread_t;

        0
    }

    unsafe fn join(&self, _: libc::pthread_t, result: *mut *mut c_void) -> c_int {
        self.log.record("join");

        let (start, argument) = self.pending.lock().unwrap().take().expect("Created");

        *result = start(argument as *mut c_void);

        0
    }

    unsafe fn cancel(&self, _: libc::pthread_t) -> c_int {
        self.log.record("cancel");
        libc::ESRCH
    }

    unsafe fn detach(&self, _: libc::pthread_t) -> c_int {
        self.log.record("detach");
        libc::EINVAL
    }

    unsafe fn exit(&self, _: *mut c_void) -> ! {
        self.log.record("exit");
        panic!("Scripted threads never exit")
    }

    unsafe fn set_signal_mask(&self, _: c_int, _: *const libc::sigset_t, _: *mut libc::sigset_t) -> c_int {
        self.log.record("sigmask");
        -7
    }
}
