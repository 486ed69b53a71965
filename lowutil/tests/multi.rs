use std::{
    ffi::CStr,
    ptr::{self, NonNull},
    slice,
    sync::{self, atomic},
    thread,
};

use serial_test::serial;

use lowutil::{AbortOnFailure, Pooled, System};
use lowutil_test::Counting;

static POOLED: Pooled<Counting<System>> = Pooled::new(Counting::new(System::new()));
static ABORT_ON_FAILURE: AbortOnFailure = AbortOnFailure::new();

static INITIALIZE: sync::Once = sync::Once::new();

fn initialize() {
    INITIALIZE.call_once(|| lowutil::initialize_allocation_policy(&POOLED, &ABORT_ON_FAILURE).expect("Initialized"));
}

//
//  Tests
//

#[serial]
#[test]
fn concurrent_allocate_release() {
    //  Test that each thread allocating, filling, checking and releasing its own blocks never observes corruption.

    initialize();

    let number_iterations = number_iterations();
    let number_threads = number_threads();

    let start = RendezVous::new("start", number_threads);

    let pool = Pool::new(number_threads, |thread_index| {
        let start = start.clone();

        move || {
            start.wait_until_all_ready();

            for iteration in 0..number_iterations {
                let blocks: Vec<_> = (0..64).map(|i| Block::new(thread_index, iteration, i)).collect();

                for block in &blocks {
                    block.check();
                }
            }
        }
    });

    pool.join();

    check_no_leak();
}

#[serial]
#[test]
fn producer_consumer_ring() {
    //  Test that blocks can be concurrently allocated and released, including released on a separate thread.
    //
    //  1.  Each thread allocates a batch of blocks, tagged with its index, and places them in its slot of the ring.
    //  2.  Each thread then takes the batch of the next slot, checks the tags, and releases the blocks.
    //  3.  The rendez-vous are reset, for the next iteration.

    initialize();

    let number_iterations = number_iterations();
    let number_threads = number_threads();
    let number_blocks = 256;

    let produced = RendezVous::new("produced", number_threads);
    let consumed = RendezVous::new("consumed", number_threads);
    let next = RendezVous::new("next", 0);

    let ring = {
        let mut ring = Vec::with_capacity(number_threads);
        ring.resize_with(number_threads, || sync::Mutex::new(vec!()));

        sync::Arc::new(ring)
    };

    let pool = Pool::new(number_threads, |thread_index| {
        let produced = produced.clone();
        let consumed = consumed.clone();
        let next = next.clone();
        let ring = ring.clone();

        move || {
            let custodian = thread_index == 0;
            let victim = (thread_index + 1) % number_threads;

            for iteration in 0..number_iterations {
                {
                    let mut sink = ring[thread_index].lock().unwrap();

                    for i in 0..number_blocks {
                        sink.push(Block::new(thread_index, iteration, i));
                    }
                }

                produced.wait_until_all_ready();

                if custodian {
                    next.reset(number_threads);
                }

                let batch = std::mem::replace(&mut *ring[victim].lock().unwrap(), vec!());

                assert_eq!(number_blocks, batch.len());

                for block in &batch {
                    assert_eq!(victim, block.thread);
                    block.check();
                }

                drop(batch);

                consumed.wait_until_all_ready();

                if custodian {
                    produced.reset(number_threads);
                }

                next.wait_until_all_ready();

                if custodian {
                    consumed.reset(number_threads);
                }
            }
        }
    });

    pool.join();

    check_no_leak();
}

#[serial]
#[test]
fn concurrent_strings() {
    initialize();

    let number_iterations = number_iterations();
    let number_threads = number_threads();

    let pool = Pool::new(number_threads, |thread_index| {
        move || {
            for iteration in 0..number_iterations {
                let text = format!("thread {} iteration {}\0", thread_index, iteration);
                let text = CStr::from_bytes_with_nul(text.as_bytes()).expect("Valid");

                let copy = lowutil::duplicate_string(text);

                assert_eq!(text, unsafe { CStr::from_ptr(copy.as_ptr()) });

                let zeroed = lowutil::allocate_zeroed(iteration + 1, 16);

                let bytes = unsafe { slice::from_raw_parts(zeroed.as_ptr(), (iteration + 1) * 16) };
                assert!(bytes.iter().all(|b| *b == 0));

                unsafe { lowutil::release(Some(copy.cast())) };
                unsafe { lowutil::release(Some(zeroed)) };
            }
        }
    });

    pool.join();

    check_no_leak();
}

//
//  Multi-threaded helpers
//

struct Pool<T>(Vec<thread::JoinHandle<T>>);

impl<T> Pool<T> {
    fn new<F, G>(count: usize, mut factory: F) -> Self
        where
            F: FnMut(usize) -> G,
            G: FnOnce() -> T + Send + 'static,
            T: Send + 'static
    {
        let threads : Vec<_> = (0..count)
            .map(|i| {
                thread::spawn(factory(i))
            })
            .collect();

        Self(threads)
    }

    fn join(mut self) -> Vec<T> {
        let thread_handles = std::mem::replace(&mut self.0, vec!());
        Self::join_handles(thread_handles)
    }

    fn join_handles(thread_handles: Vec<thread::JoinHandle<T>>) -> Vec<T> {
        //  First join _all_ threads.
        let results: Vec<_> = thread_handles.into_iter()
            .map(|handle| handle.join())
            .collect();
        //  Then collect the results.
        results.into_iter()
            .map(|value| value.unwrap())
            .collect()
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        let thread_handles = std::mem::replace(&mut self.0, vec!());
        Self::join_handles(thread_handles);
    }
}

//  #   Warning
//
//  An instance should only be rearmed by 1 thread, and never right before or right after a `wait_until_all_ready`
//  on the same instance: some threads may not have decremented the counter yet, or not have exited the wait yet.
//
//  Instead, an instance is rearmed right after the wait on the _next_ instance of the cycle.
#[derive(Clone, Debug)]
struct RendezVous(&'static str, sync::Arc<atomic::AtomicUsize>);

impl RendezVous {
    fn new(name: &'static str, count: usize) -> Self {
        Self(name, sync::Arc::new(atomic::AtomicUsize::new(count)))
    }

    fn wait_until_all_ready(&self) {
        self.1.fetch_sub(1, atomic::Ordering::AcqRel);

        while !self.is_ready() {
            thread::yield_now();
        }
    }

    fn is_ready(&self) -> bool { self.1.load(atomic::Ordering::Acquire) == 0 }

    fn reset(&self, count: usize) {
        assert!(self.is_ready(), "{} not ready: {:?}", self.0, self.1);
        self.1.store(count, atomic::Ordering::Release);
    }
}

//
//  Implementation Details
//

fn number_iterations() -> usize { read_number_from_environment("LOWUTIL_MULTI_NUMBER_ITERATIONS", 10) }

fn number_threads() -> usize { read_number_from_environment("LOWUTIL_MULTI_NUMBER_THREADS", num_cpus::get().max(2)) }

fn read_number_from_environment(name: &str, default: usize) -> usize {
    for (n, value) in std::env::vars() {
        if n == name {
            if let Ok(result) = value.parse() {
                println!("read_number_from_environment - {}: {}", name, result);
                return result;
            }
        }
    }

    println!("read_number_from_environment - {}: {} (default)", name, default);
    default
}

//  Every block requested from the system was returned to it, once the cache is flushed.
fn check_no_leak() {
    POOLED.flush();

    let inner = POOLED.inner();

    assert_eq!(0, POOLED.cached());
    assert_eq!(inner.allocations() + inner.scalar_allocations(), inner.releases());
}

//  A block, tagged with its origin, and filled with a pattern derived from it.
struct Block {
    thread: usize,
    iteration: usize,
    index: usize,
    pointer: NonNull<u8>,
}

impl Block {
    fn new(thread: usize, iteration: usize, index: usize) -> Self {
        let size = Self::size(index);

        let pointer = if index % 2 == 0 { lowutil::allocate(size) } else { lowutil::allocate_scalar(size) };

        unsafe { ptr::write_bytes(pointer.as_ptr(), Self::pattern(thread, iteration, index), size) };

        Self { thread, iteration, index, pointer }
    }

    fn check(&self) {
        let pattern = Self::pattern(self.thread, self.iteration, self.index);
        let bytes = unsafe { slice::from_raw_parts(self.pointer.as_ptr(), Self::size(self.index)) };

        assert!(bytes.iter().all(|b| *b == pattern),
            "thread {}, iteration {}, index {}", self.thread, self.iteration, self.index);
    }

    //  Spans every size class, and beyond.
    fn size(index: usize) -> usize { (index * 37) % 6000 }

    fn pattern(thread: usize, iteration: usize, index: usize) -> u8 { (thread * 31 + iteration * 7 + index) as u8 }
}

impl Drop for Block {
    fn drop(&mut self) {
        unsafe { lowutil::release(Some(self.pointer)) };
    }
}

unsafe impl Send for Block {}
