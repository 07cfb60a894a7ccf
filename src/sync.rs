//! Small synchronisation primitives shared by the stream engine.

use std::sync::{Condvar, Mutex};

/// A broadcastable one-shot latch.
///
/// Firing is idempotent and visible to every waiter; once fired, the
/// signal stays fired. Streams use one as the request-complete gate and
/// share another, connection-wide, as the stop signal handlers observe
/// through `close_notify`.
#[derive(Debug, Default)]
pub struct Signal {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking every current and future waiter.
    pub fn fire(&self) {
        let mut fired = self.fired.lock().unwrap();
        if !*fired {
            *fired = true;
            self.cond.notify_all();
        }
    }

    /// Check whether the signal has fired without blocking.
    pub fn is_fired(&self) -> bool {
        *self.fired.lock().unwrap()
    }

    /// Block until the signal fires. Returns immediately if it already has.
    pub fn wait(&self) {
        let mut fired = self.fired.lock().unwrap();
        while !*fired {
            fired = self.cond.wait(fired).unwrap();
        }
    }
}
