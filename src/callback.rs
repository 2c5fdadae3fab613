//! Callback registration.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Handle for a registered callback.
///
/// Dropping the handle unregisters the callback.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

type Entries<F> = RwLock<Vec<(u64, Arc<F>)>>;

/// An ordered list of callbacks of one kind.
pub(crate) struct CallbackRegistry<F: ?Sized> {
    next_id: AtomicU64,
    entries: Arc<Entries<F>>,
}

impl<F: ?Sized + Send + Sync + 'static> CallbackRegistry<F> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a callback; it stays registered until the handle goes away.
    pub(crate) fn register(&self, callback: Arc<F>) -> CallbackHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.write().push((id, callback));

        let entries: Weak<Entries<F>> = Arc::downgrade(&self.entries);
        CallbackHandle::new(id, move || {
            if let Some(entries) = entries.upgrade() {
                entries.write().retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// The registered callbacks in registration order.
    ///
    /// Callers invoke the snapshot after the registry lock is released, so a
    /// callback may register or unregister others.
    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .read()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}
