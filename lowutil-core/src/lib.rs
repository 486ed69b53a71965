#![no_std]

#![deny(missing_docs)]

//! Building blocks for a pluggable allocation and thread-lifecycle policy.
//!
//! lowutil-core lets an embedding application decide which routines serve memory and thread requests, without
//! touching any call site. It contains:
//! -   An allocator trait, the six memory routines a backing allocator provides.
//! -   A failure handler trait, invoked when a never-failing request cannot be satisfied.
//! -   A thread lifecycle trait, the six thread routines a backing threading library provides.
//! -   Policy objects bundling those, exposing never-failing and fallible operations to the call sites.

mod api;
mod utils;

pub use api::*;
pub use utils::PowerOf2;
