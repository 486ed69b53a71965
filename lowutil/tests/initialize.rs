//  Requests served by an installed policy.

use std::{ffi::CStr, sync::Once};

use serial_test::serial;

use lowutil::{InitializationError, System};
use lowutil_test::{Counting, Recording};

static COUNTING: Counting<System> = Counting::new(System::new());
static RECORDING: Recording = Recording::new();

static INITIALIZE: Once = Once::new();

//  Installs the counting policy, before any request of any test.
fn initialize() -> &'static Counting<System> {
    INITIALIZE.call_once(|| lowutil::initialize_allocation_policy(&COUNTING, &RECORDING).expect("Initialized"));

    &COUNTING
}

#[serial]
#[test]
fn every_wrapper_observes_installed_policy() {
    let counting = initialize();
    let before = counting.total();

    let a = lowutil::allocate(10);
    let b = lowutil::allocate_scalar(10);
    let c = lowutil::allocate_zeroed(2, 5);
    let a = unsafe { lowutil::reallocate(Some(a), 20) };
    let d = lowutil::duplicate_string(CStr::from_bytes_with_nul(b"copy\0").expect("Valid"));

    let e = lowutil::try_allocate(10).expect("Allocated");
    let f = lowutil::try_allocate_scalar(10).expect("Allocated");
    let g = lowutil::try_allocate_zeroed(2, 5).expect("Allocated");
    let e = unsafe { lowutil::try_reallocate(Some(e), 20) }.expect("Reallocated");
    let h = lowutil::try_duplicate_string(CStr::from_bytes_with_nul(b"copy\0").expect("Valid")).expect("Copied");

    for block in [a, b, c, d.cast(), e, f, g, h.cast()].iter() {
        unsafe { lowutil::release(Some(*block)) };
    }

    assert_eq!(18, counting.total() - before);
    assert!(RECORDING.messages().is_empty());
}

#[serial]
#[test]
fn every_routine_is_counted_separately() {
    let counting = initialize();

    let allocations = counting.allocations();
    let scalar_allocations = counting.scalar_allocations();
    let zeroed_allocations = counting.zeroed_allocations();
    let reallocations = counting.reallocations();
    let duplications = counting.duplications();
    let releases = counting.releases();

    let block = lowutil::allocate(1);
    assert_eq!(allocations + 1, counting.allocations());

    let scalar = lowutil::try_allocate_scalar(1).expect("Allocated");
    assert_eq!(scalar_allocations + 1, counting.scalar_allocations());

    let zeroed = lowutil::allocate_zeroed(1, 1);
    assert_eq!(zeroed_allocations + 1, counting.zeroed_allocations());

    let block = unsafe { lowutil::reallocate(Some(block), 2) };
    assert_eq!(reallocations + 1, counting.reallocations());

    let copy = lowutil::duplicate_string(CStr::from_bytes_with_nul(b"\0").expect("Valid"));
    assert_eq!(duplications + 1, counting.duplications());

    unsafe {
        lowutil::release(Some(block));
        lowutil::release(Some(scalar));
        lowutil::release(Some(zeroed));
        lowutil::release(Some(copy.cast()));
        lowutil::release(None);
    }

    assert_eq!(releases + 4, counting.releases());
}

#[serial]
#[test]
fn second_initialization_is_flagged() {
    static OTHER: Counting<System> = Counting::new(System::new());

    let counting = initialize();

    assert_eq!(
        Err(InitializationError::AlreadyInitialized("allocation")),
        lowutil::initialize_allocation_policy(&OTHER, &RECORDING)
    );

    let before = counting.allocations();

    let block = lowutil::allocate(8);
    unsafe { lowutil::release(Some(block)) };

    assert_eq!(before + 1, counting.allocations());
    assert_eq!(0, OTHER.total());
}

#[serial]
#[test]
fn policy_is_shared() {
    let counting = initialize();

    let policy = lowutil::allocation_policy();

    assert!(std::ptr::eq(policy, lowutil::allocation_policy()));

    let before = counting.allocations();

    let block = policy.allocate(8);
    unsafe { policy.release(Some(block)) };

    assert_eq!(before + 1, counting.allocations());
}
