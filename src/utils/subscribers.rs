//! Minimal observer registry used by the cache and the wallet hub.
//!
//! Callbacks are copied out of the registry before they run, so a callback
//! may subscribe or unsubscribe without deadlocking.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::DashMap;

pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Subscribers<T> {
    next_id: AtomicU64,
    entries: Arc<DashMap<u64, Callback<T>>>,
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(id, Arc::new(callback));

        let entries = Arc::downgrade(&self.entries);
        Subscription::new(move || {
            if let Some(entries) = entries.upgrade() {
                entries.remove(&id);
            }
        })
    }

    pub fn notify(&self, value: &T) {
        for callback in self.snapshot() {
            callback(value);
        }
    }

    /// Copy of the current callbacks, for callers that must release their
    /// own locks before running them.
    pub fn snapshot(&self) -> Vec<Callback<T>> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by every `subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}
