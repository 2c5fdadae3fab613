//! One-shot timers for scan and advertising durations.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// A re-armable one-shot timer running on a tokio runtime.
///
/// The callback runs on a runtime worker, never on the dispatch thread, so
/// it must only act as a producer (enqueue an event and return).
#[derive(Debug)]
pub struct Timeout {
    runtime: Handle,
    task: Option<JoinHandle<()>>,
}

impl Timeout {
    /// Create a disarmed timer bound to `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            task: None,
        }
    }

    /// Arm the timer, replacing any pending expiry.
    pub fn attach<F>(&mut self, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.detach();
        trace!("Arming timeout for {:?}", delay);
        self.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        }));
    }

    /// Cancel a pending expiry. Does nothing when disarmed.
    pub fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Check whether an expiry is pending.
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.detach();
    }
}
