//! Token ids owned by the connected wallet.
//!
//! The set only grows during a session: a full refetch replaces it and a
//! confirmed mint unions into it. Observers are woken only when it changes.

use std::{cmp::Ordering, sync::Arc};

use itertools::Itertools;
use tokio::sync::watch;

#[derive(Clone)]
pub struct OwnedTokenSet {
    ids: Arc<watch::Sender<Vec<String>>>,
}

impl OwnedTokenSet {
    pub fn new() -> Self {
        Self {
            ids: Arc::new(watch::channel(Vec::new()).0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.ids.subscribe()
    }

    /// Replace with the result of a `walletOfOwner` read.
    pub fn replace(&self, ids: Vec<String>) {
        let ids: Vec<String> = ids.into_iter().unique().collect();
        self.ids.send_if_modified(|current| {
            if *current == ids {
                return false;
            }
            *current = ids;
            true
        });
    }

    /// Add ids not yet present. Returns how many were new.
    pub fn union(&self, ids: &[String]) -> usize {
        let mut added = 0;
        self.ids.send_if_modified(|current| {
            for id in ids {
                if !current.contains(id) {
                    current.push(id.clone());
                    added += 1;
                }
            }
            added > 0
        });
        added
    }

    pub fn clear(&self) {
        self.ids.send_if_modified(|current| {
            if current.is_empty() {
                return false;
            }
            current.clear();
            true
        });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.borrow().iter().any(|owned| owned == id)
    }

    pub fn len(&self) -> usize {
        self.ids.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.borrow().is_empty()
    }

    /// Ids in numeric order.
    pub fn sorted(&self) -> Vec<String> {
        let mut ids = self.ids.borrow().clone();
        ids.sort_by(|a, b| compare_ids(a, b));
        ids
    }
}

impl Default for OwnedTokenSet {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
