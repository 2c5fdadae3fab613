//! Binary event flag shared between producers and the dispatch thread.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A binary flag: producers set it, the single consumer waits for it and
/// clears it on wake-up. Multiple sets before a wait collapse into one.
///
/// Setting never takes the lock unless the consumer is parked.
#[derive(Debug, Default)]
pub struct EventFlag {
    set: AtomicBool,
    parked: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl EventFlag {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake the waiter.
    pub fn set(&self) {
        self.set.store(true, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) {
            // The waiter holds the lock from its last check until it parks.
            let _guard = self.lock.lock();
            self.cond.notify_one();
        }
    }

    /// Check whether the flag is currently set.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    /// Block until the flag is set, then clear it.
    pub fn wait(&self) {
        if self.set.swap(false, Ordering::SeqCst) {
            return;
        }

        let mut guard = self.lock.lock();
        self.parked.store(true, Ordering::SeqCst);
        while !self.set.load(Ordering::SeqCst) {
            self.cond.wait(&mut guard);
        }
        self.parked.store(false, Ordering::SeqCst);
        self.set.store(false, Ordering::SeqCst);
    }

    /// Block until the flag is set or `timeout` elapses.
    ///
    /// Returns `true` if the flag was set. The flag is cleared either way.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        if self.set.swap(false, Ordering::SeqCst) {
            return true;
        }

        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        self.parked.store(true, Ordering::SeqCst);
        while !self.set.load(Ordering::SeqCst) {
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.parked.store(false, Ordering::SeqCst);
        self.set.swap(false, Ordering::SeqCst)
    }
}
