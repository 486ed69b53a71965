//! The API of lowutil-core.

mod allocator;
mod failure;
mod policy;

#[cfg(feature = "threads")]
mod thread;

pub use allocator::Allocator;
pub use failure::{AllocationFailure, FailureHandler, FailureMessage, Operation};
pub use policy::AllocationPolicy;

#[cfg(feature = "threads")]
pub use thread::{StartRoutine, ThreadError, ThreadLifecycle, ThreadPolicy};
