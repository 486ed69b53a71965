//! Platform policy, over the C library.

mod system;

#[cfg(feature = "threads")]
mod posix_threads;

pub use system::{AbortOnFailure, System};

#[cfg(feature = "threads")]
pub use posix_threads::PosixThreads;
