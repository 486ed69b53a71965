//! Failure
//!
//! When a never-failing operation cannot be satisfied, the policy describes the failure with an `AllocationFailure`
//! and hands it over to the `FailureHandler`, which is not allowed to return.
//!
//! Memory is, by definition, exhausted at that point: the description is rendered into a fixed-size `FailureMessage`
//! living on the stack, rather than into a heap-allocated string.

use core::{
    ffi::{c_char, CStr},
    fmt::{self, Write},
    panic::Location,
};

/// The never-failing operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `allocate`.
    Allocate,
    /// `allocate_scalar`.
    AllocateScalar,
    /// `allocate_zeroed`.
    AllocateZeroed,
    /// `reallocate`.
    Reallocate,
    /// `duplicate_string`.
    DuplicateString,
}

impl Operation {
    /// Returns the name of the operation, as exposed by the policy.
    pub const fn name(&self) -> &'static str {
        match self {
            Operation::Allocate => "allocate",
            Operation::AllocateScalar => "allocate_scalar",
            Operation::AllocateZeroed => "allocate_zeroed",
            Operation::Reallocate => "reallocate",
            Operation::DuplicateString => "duplicate_string",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Description of a never-failing request which could not be satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationFailure {
    operation: Operation,
    count: usize,
    size: usize,
    location: &'static Location<'static>,
}

impl AllocationFailure {
    /// Creates an instance.
    ///
    /// The requested memory is `count` elements of `size` bytes; `count` is 1 for all operations but
    /// `allocate_zeroed`.
    pub const fn new(operation: Operation, count: usize, size: usize, location: &'static Location<'static>) -> Self {
        Self { operation, count, size, location }
    }

    /// Returns the failing operation.
    pub const fn operation(&self) -> Operation { self.operation }

    /// Returns the number of elements requested.
    pub const fn count(&self) -> usize { self.count }

    /// Returns the size of each element requested, in bytes.
    pub const fn size(&self) -> usize { self.size }

    /// Returns the location of the call to the policy.
    pub const fn location(&self) -> &'static Location<'static> { self.location }

    /// Renders the diagnostic message, without allocating.
    pub fn message(&self) -> FailureMessage {
        let mut message = FailureMessage::new();

        //  FailureMessage truncates rather than fails.
        let _ = write!(message, "{}", self);

        message
    }
}

impl fmt::Display for AllocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lowutil: {} failed for {} x {} bytes at {}", self.operation, self.count, self.size, self.location)
    }
}

/// Handler invoked when a never-failing operation cannot be satisfied.
///
/// The handler must not return: it is expected to terminate the process, or to unwind out of the failing call.
pub trait FailureHandler {
    /// Handles the failure.
    fn on_failure(&self, failure: &AllocationFailure) -> !;
}

impl<'a, F> FailureHandler for &'a F
    where
        F: FailureHandler + ?Sized
{
    fn on_failure(&self, failure: &AllocationFailure) -> ! { (**self).on_failure(failure) }
}

/// A fixed-capacity, NUL-terminated, text buffer.
///
/// Text written beyond the capacity is silently truncated, on a character boundary.
#[derive(Clone)]
pub struct FailureMessage {
    buffer: [u8; FailureMessage::CAPACITY + 1],
    length: usize,
}

impl FailureMessage {
    /// Maximum number of bytes of text, excluding the terminating NUL.
    pub const CAPACITY: usize = 255;

    /// Creates an empty instance.
    pub const fn new() -> Self { Self { buffer: [0; FailureMessage::CAPACITY + 1], length: 0 } }

    /// Returns the text.
    pub fn as_str(&self) -> &str {
        //  Safety:
        //  -   Only whole `str` characters are ever copied in.
        unsafe { core::str::from_utf8_unchecked(&self.buffer[..self.length]) }
    }

    /// Returns the text as a C string.
    ///
    /// An interior NUL in the text truncates the C string.
    pub fn as_c_str(&self) -> &CStr {
        //  Safety:
        //  -   `buffer[length]` is always NUL, as `length <= CAPACITY` and the buffer is only written before it.
        unsafe { CStr::from_ptr(self.buffer.as_ptr() as *const c_char) }
    }
}

impl Default for FailureMessage {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for FailureMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self.as_str(), f) }
}

impl fmt::Display for FailureMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Write for FailureMessage {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let available = FailureMessage::CAPACITY - self.length;

        let mut taken = s.len().min(available);

        while !s.is_char_boundary(taken) {
            taken -= 1;
        }

        self.buffer[self.length..self.length + taken].copy_from_slice(&s.as_bytes()[..taken]);
        self.length += taken;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn failure_message() {
    let location = Location::caller();
    let failure = AllocationFailure::new(Operation::AllocateZeroed, 4, 1024, location);

    let message = failure.message();

    assert!(message.as_str().starts_with("lowutil: allocate_zeroed failed for 4 x 1024 bytes at "),
        "{}", message);
    assert!(message.as_str().contains(location.file()), "{}", message);
    assert_eq!(message.as_str().as_bytes(), message.as_c_str().to_bytes());
}

#[test]
fn failure_message_truncation() {
    let mut message = FailureMessage::new();

    for _ in 0..100 {
        write!(message, "0123456789").expect("Infallible");
    }

    assert_eq!(FailureMessage::CAPACITY, message.as_str().len());
    assert_eq!(FailureMessage::CAPACITY, message.as_c_str().to_bytes().len());
}

#[test]
fn failure_message_truncation_char_boundary() {
    let mut message = FailureMessage::new();

    for _ in 0..(FailureMessage::CAPACITY - 1) {
        message.write_str("x").expect("Infallible");
    }

    //  2 bytes character, with only 1 byte left.
    message.write_str("é").expect("Infallible");

    assert_eq!(FailureMessage::CAPACITY - 1, message.as_str().len());
}

#[test]
fn operation_names() {
    assert_eq!("allocate", Operation::Allocate.name());
    assert_eq!("allocate_scalar", Operation::AllocateScalar.name());
    assert_eq!("allocate_zeroed", Operation::AllocateZeroed.name());
    assert_eq!("reallocate", Operation::Reallocate.name());
    assert_eq!("duplicate_string", Operation::DuplicateString.name());
}

}
