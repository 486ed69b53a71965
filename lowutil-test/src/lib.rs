//! Test utilities for lowutil.
//!
//! Instrumented implementations of the lowutil-core traits, to observe which routines a policy invokes, and how
//! often:
//!
//! -   `Heap`, a working allocator over the Rust global allocator, tracking live blocks.
//! -   `Counting`, a wrapper counting invocations of each routine of another allocator.
//! -   `Failing`, an allocator which never satisfies any request.
//! -   `Recording` and `Exiting`, failure handlers respectively unwinding and exiting after recording the failure.
//! -   `CallLog`, a thread-safe log of calls, to check their order.

#![deny(missing_docs)]

mod call_log;
mod counting;
mod failing;
mod handlers;
mod heap;

pub use call_log::CallLog;
pub use counting::Counting;
pub use failing::Failing;
pub use handlers::{Exiting, Recording};
pub use heap::Heap;
