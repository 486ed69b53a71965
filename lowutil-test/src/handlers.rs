//! Failure handlers for tests.

use std::{
    io::Write,
    process,
    sync::Mutex,
};

use lowutil_core::{AllocationFailure, FailureHandler};

/// Recording
///
/// Records the message of each failure, then unwinds out of the failing call with a panic.
#[derive(Debug, Default)]
pub struct Recording(Mutex<Vec<String>>);

impl Recording {
    /// Creates an instance.
    pub const fn new() -> Self { Self(Mutex::new(Vec::new())) }

    /// Returns the messages recorded so far.
    pub fn messages(&self) -> Vec<String> { self.lock().clone() }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FailureHandler for Recording {
    fn on_failure(&self, failure: &AllocationFailure) -> ! {
        let message = failure.message();

        self.lock().push(message.as_str().to_owned());

        panic!("{}", message)
    }
}

/// Exiting
///
/// Writes `recorded: <message>` on the standard error, then exits the process with the given status.
///
/// Meant for tests running in a child process, whose parent inspects the output and exit status.
#[derive(Debug)]
pub struct Exiting(i32);

impl Exiting {
    /// Creates an instance, exiting with `status`.
    pub const fn new(status: i32) -> Self { Self(status) }
}

impl FailureHandler for Exiting {
    fn on_failure(&self, failure: &AllocationFailure) -> ! {
        let mut stderr = std::io::stderr();

        let _ = writeln!(stderr, "recorded: {}", failure.message());
        let _ = stderr.flush();

        process::exit(self.0)
    }
}
