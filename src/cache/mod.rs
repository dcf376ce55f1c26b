//! Expiring key/value cache over a persistent store.
//!
//! Values are wrapped as `{"expiry": <RFC3339>, "value": ...}`. Reads fail
//! open: anything missing, expired or unreadable is simply absent. Expired
//! entries are left in the store until overwritten.

pub mod storage;

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{PaperCatsError, Result},
    utils::{
        clock::{Clock, SystemClock},
        subscribers::{Subscribers, Subscription},
    },
};

pub use storage::{FileStorage, MemoryStorage, Storage};

/// One day.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    #[serde(alias = "expiresAt")]
    pub expiry: DateTime<Utc>,
    pub value: T,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

pub struct ExpiringCache {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    subscribers: DashMap<String, Subscribers<Value>>,
}

impl ExpiringCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            default_ttl: DEFAULT_TTL,
            subscribers: DashMap::new(),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.storage.get_item(key)?;
        let entry: CacheEntry<Value> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("❌ [CACHE] unreadable entry for {}: {}", key, e);
                return None;
            }
        };

        if entry.is_expired(self.clock.now()) {
            debug!("⏰ [CACHE] entry for {} expired at {}", key, entry.expiry);
            return None;
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("❌ [CACHE] entry for {} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl` (default one day) and notify the
    /// key's subscribers.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expiry = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or_else(|| PaperCatsError::Storage(format!("ttl {ttl:?} out of range")))?;

        let value = serde_json::to_value(value)
            .map_err(|e| PaperCatsError::Storage(format!("serializing {key}: {e}")))?;
        let entry = CacheEntry { expiry, value };
        let raw = serde_json::to_string(&entry)
            .map_err(|e| PaperCatsError::Storage(format!("serializing {key}: {e}")))?;

        self.storage.set_item(key, raw)?;
        info!("💾 [CACHE] stored {} until {}", key, entry.expiry);

        self.notify(key, &entry.value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.storage.remove_item(key)
    }

    /// Watch writes to `key` made through any handle sharing this cache.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribers.retain(|_, subs| !subs.is_empty());
        self.subscribers
            .entry(key.to_string())
            .or_default()
            .subscribe(callback)
    }

    fn notify(&self, key: &str, value: &Value) {
        let callbacks = match self.subscribers.get(key) {
            Some(subs) => subs.snapshot(),
            None => return,
        };
        if callbacks.is_empty() {
            self.subscribers.remove_if(key, |_, subs| subs.is_empty());
            return;
        }
        for callback in callbacks {
            callback(value);
        }
    }
}
