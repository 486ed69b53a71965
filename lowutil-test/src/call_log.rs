//! A thread-safe log of calls.

use std::sync::Mutex;

/// CallLog
///
/// Records the names of the calls made, in order.
#[derive(Debug, Default)]
pub struct CallLog(Mutex<Vec<&'static str>>);

impl CallLog {
    /// Creates an empty instance.
    pub const fn new() -> Self { Self(Mutex::new(Vec::new())) }

    /// Records a call.
    pub fn record(&self, name: &'static str) { self.lock().push(name); }

    /// Returns the calls recorded so far.
    pub fn calls(&self) -> Vec<&'static str> { self.lock().clone() }

    /// Returns the number of times `name` was recorded.
    pub fn count(&self, name: &str) -> usize { self.lock().iter().filter(|call| **call == name).count() }

    /// Forgets all calls recorded so far.
    pub fn clear(&self) { self.lock().clear(); }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<&'static str>> {
        //  A poisoned log is still a log; the panic is reported by the test itself.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
