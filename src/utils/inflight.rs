//! In-flight request deduplication.
//!
//! Callers asking for the same key while a request is still pending await the
//! same shared future instead of issuing a second request. The entry is
//! dropped as soon as the request settles, so the next call starts fresh.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::debug;

use crate::error::Result;

type SharedRequest<V> = Shared<BoxFuture<'static, Result<V>>>;

pub struct InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Each pending request carries the id of the call that started it.
    pending: DashMap<String, (u64, SharedRequest<V>)>,
    next_id: AtomicU64,
}

impl<V> InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `make()` for `key` unless a request for it is already pending.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (id, request) = match self.pending.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                debug!("🔗 [INFLIGHT] joining pending request for {}", key);
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let request = make().boxed().shared();
                slot.insert((id, request.clone()));
                (id, request)
            }
        };

        let result = request.await;
        // a newer request may already sit under the same key
        self.pending.remove_if(key, |_, (pending_id, _)| *pending_id == id);
        result
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl<V> Default for InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
