//! A pooling allocator.
//!
//! `Pooled` caches released blocks in power-of-2 size classes, from 16 to 4096 bytes, and serves further requests of
//! the same class from the cache rather than from the underlying allocator.
//!
//! Each block is prefixed by a 16 bytes header, recording its capacity and kind, so that `release` needs no size.
//! Blocks above 4096 bytes are never cached, and go straight back to the underlying allocator.
//!
//! The scalar hint is honored by segregating scalar blocks from general blocks: a block released by one kind is never
//! handed out to the other. All cached blocks are requested from the underlying allocator as general blocks, since
//! the cache links them together through their payload.

use std::{
    ptr::{self, NonNull},
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::{const_mutex, Mutex};

use lowutil_core::{Allocator, PowerOf2};

/// Pooled
///
/// An `Allocator` caching released blocks of up to 4096 bytes, layered over another `Allocator`.
///
/// When the underlying allocator fails, the cache is flushed back to it and the request retried once, before
/// reporting the failure.
pub struct Pooled<A: Allocator> {
    inner: A,
    pools: [[Mutex<Link>; NUMBER_CLASSES]; NUMBER_KINDS],
    cached: AtomicUsize,
}

impl<A: Allocator> Pooled<A> {
    /// Largest size served from the cache.
    pub const MAXIMUM_POOLED_SIZE: usize = MAXIMUM_CLASS.value();

    /// Creates an instance, with an empty cache, over `inner`.
    pub const fn new(inner: A) -> Self { Self { inner, pools: [EMPTY_POOLS; NUMBER_KINDS], cached: AtomicUsize::new(0) } }

    /// Returns a reference to the underlying allocator.
    pub fn inner(&self) -> &A { &self.inner }

    /// Returns the number of blocks currently cached.
    pub fn cached(&self) -> usize { self.cached.load(Ordering::Relaxed) }

    /// Returns all cached blocks to the underlying allocator.
    pub fn flush(&self) {
        for pool in self.pools.iter().flatten() {
            let mut head = pool.lock().0.take();

            while let Some(block) = head {
                //  Safety:
                //  -   `block` was pushed on the free list by `release`, and is exclusively owned by it.
                head = unsafe { block.as_ref().next };

                self.cached.fetch_sub(1, Ordering::Relaxed);

                //  Safety:
                //  -   The header was allocated by `inner`.
                unsafe { self.inner.release(Header::from_payload(block.cast())) };
            }
        }
    }

    fn allocate_kind(&self, kind: Kind, size: usize) -> Option<NonNull<u8>> {
        match Class::of(size) {
            Some(class) => self.pop(kind, class).or_else(|| self.allocate_retry(kind, class.capacity(), true)),
            None => self.allocate_retry(kind, size, false),
        }
    }

    //  Requests a fresh block from `inner`, flushing the cache and retrying once on failure.
    fn allocate_retry(&self, kind: Kind, capacity: usize, pooled: bool) -> Option<NonNull<u8>> {
        let total = capacity.checked_add(HEADER)?;

        let raw = self.allocate_raw(kind, total, pooled).or_else(|| {
            if self.cached() == 0 {
                return None;
            }

            self.flush();
            self.allocate_raw(kind, total, pooled)
        })?;

        //  Safety:
        //  -   `raw` is valid for `HEADER + capacity` bytes, aligned for `Header`.
        Some(unsafe { Header::write(raw, Header { capacity, kind, pooled }) })
    }

    fn allocate_raw(&self, kind: Kind, total: usize, pooled: bool) -> Option<NonNull<u8>> {
        if pooled || kind == Kind::General {
            self.inner.allocate(total)
        } else {
            self.inner.allocate_scalar(total)
        }
    }

    fn pop(&self, kind: Kind, class: Class) -> Option<NonNull<u8>> {
        let mut head = self.pools[kind as usize][class.index()].lock();

        let block = head.0?;

        //  Safety:
        //  -   `block` is on the free list, hence exclusively owned by it.
        head.0 = unsafe { block.as_ref().next };

        self.cached.fetch_sub(1, Ordering::Relaxed);

        Some(block.cast())
    }

    //  Safety:
    //  -   Assumes `payload` is a pooled block, no longer in use.
    unsafe fn push(&self, payload: NonNull<u8>, header: &Header) {
        debug_assert!(Class::of(header.capacity).is_some());

        //  Safety:
        //  -   A pooled block has the capacity of its class.
        let class = Class(PowerOf2::new_unchecked(header.capacity));
        let block = payload.cast::<FreeBlock>();

        let mut head = self.pools[header.kind as usize][class.index()].lock();

        ptr::write(block.as_ptr(), FreeBlock { next: head.0 });
        head.0 = Some(block);

        self.cached.fetch_add(1, Ordering::Relaxed);
    }
}

impl<A: Allocator> Allocator for Pooled<A> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> { self.allocate_kind(Kind::General, size) }

    fn allocate_scalar(&self, size: usize) -> Option<NonNull<u8>> { self.allocate_kind(Kind::Scalar, size) }

    unsafe fn reallocate(&self, block: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        let block = match block {
            Some(block) => block,
            None => return self.allocate(size),
        };

        let header = Header::read(block);

        if size <= header.capacity {
            return Some(block);
        }

        let fresh = self.allocate_kind(header.kind, size)?;

        //  Safety:
        //  -   `block` is valid for `header.capacity` bytes, `fresh` for `size` bytes, and `size > header.capacity`.
        ptr::copy_nonoverlapping(block.as_ptr(), fresh.as_ptr(), header.capacity);

        self.release(block);

        Some(fresh)
    }

    unsafe fn release(&self, block: NonNull<u8>) {
        let header = Header::read(block);

        if header.pooled {
            self.push(block, &header);
        } else {
            self.inner.release(Header::from_payload(block));
        }
    }
}

impl<A: Allocator> Drop for Pooled<A> {
    fn drop(&mut self) { self.flush(); }
}

//
//  Implementation
//

const HEADER: usize = 16;

const MINIMUM_CLASS: PowerOf2 = unsafe { PowerOf2::new_unchecked(16) };
const MAXIMUM_CLASS: PowerOf2 = unsafe { PowerOf2::new_unchecked(4096) };

const NUMBER_CLASSES: usize = (MAXIMUM_CLASS.log2() - MINIMUM_CLASS.log2() + 1) as usize;
const NUMBER_KINDS: usize = 2;

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_POOL: Mutex<Link> = const_mutex(Link(None));

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_POOLS: [Mutex<Link>; NUMBER_CLASSES] = [EMPTY_POOL; NUMBER_CLASSES];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    General = 0,
    Scalar = 1,
}

//  A size class, between MINIMUM_CLASS and MAXIMUM_CLASS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Class(PowerOf2);

impl Class {
    //  Returns the class of a request of `size` bytes, if small enough to be pooled.
    fn of(size: usize) -> Option<Class> {
        if size > MAXIMUM_CLASS.value() {
            return None;
        }

        PowerOf2::ceil(size.max(MINIMUM_CLASS.value())).map(Class)
    }

    fn capacity(&self) -> usize { self.0.value() }

    fn index(&self) -> usize { (self.0.log2() - MINIMUM_CLASS.log2()) as usize }
}

//  Header preceding each payload; exactly HEADER bytes.
#[repr(C, align(16))]
struct Header {
    capacity: usize,
    kind: Kind,
    pooled: bool,
}

impl Header {
    //  Writes `header` at `raw`, and returns the payload.
    //
    //  Safety:
    //  -   Assumes `raw` is valid for writes of `HEADER` bytes, and 16-bytes aligned.
    unsafe fn write(raw: NonNull<u8>, header: Header) -> NonNull<u8> {
        ptr::write(raw.as_ptr() as *mut Header, header);

        NonNull::new_unchecked(raw.as_ptr().add(HEADER))
    }

    //  Safety:
    //  -   Assumes `payload` was returned by `write`.
    unsafe fn read(payload: NonNull<u8>) -> Header {
        ptr::read(Self::from_payload(payload).as_ptr() as *const Header)
    }

    //  Safety:
    //  -   Assumes `payload` was returned by `write`.
    unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<u8> { NonNull::new_unchecked(payload.as_ptr().sub(HEADER)) }
}

//  Payload of a cached block.
struct FreeBlock {
    next: Option<NonNull<FreeBlock>>,
}

//  Head of a free list.
struct Link(Option<NonNull<FreeBlock>>);

//  Safety:
//  -   The blocks of a free list are exclusively owned by it, and only accessed under its lock.
unsafe impl Send for Link {}
