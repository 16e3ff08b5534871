//! Wake signal used to park threads until something happens.
//!
//! [`Event`] is a manual-reset event: once signalled it stays signalled until
//! [`Event::reset`] is called, so a thread that starts waiting after the
//! signal returns immediately. [`Event::pulse`] wakes only the threads that are
//! already blocked and leaves the event cleared.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct EventState {
    signaled: bool,
    /// Bumped by every `signal` and `pulse` so blocked waiters can tell a
    /// pulse happened even though `signaled` is already false again.
    generation: u64,
}

/// A manual-reset event built on a mutex and a condition variable.
pub struct Event {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl Event {
    /// Creates a new event in the non-signalled state.
    pub fn new() -> Self {
        Event {
            state: Mutex::new(EventState {
                signaled: false,
                generation: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Sets the event and wakes every waiter.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        state.signaled = true;
        state.generation = state.generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Clears the event.
    pub fn reset(&self) {
        self.state.lock().signaled = false;
    }

    /// Wakes every thread currently blocked in `wait`, then leaves the event
    /// cleared. Threads that start waiting afterwards block until the next
    /// signal or pulse.
    pub fn pulse(&self) {
        let mut state = self.state.lock();
        state.signaled = false;
        state.generation = state.generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Returns true if the event is currently set.
    pub fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    /// Blocks until the event is signalled or pulsed.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        let seen = state.generation;
        while !state.signaled && state.generation == seen {
            self.cond.wait(&mut state);
        }
    }

    /// Blocks for at most `timeout`. Returns true if the event fired.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let seen = state.generation;
        while !state.signaled && state.generation == seen {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return state.signaled || state.generation != seen;
            }
        }
        true
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::new()
    }
}
