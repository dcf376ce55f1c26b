//! Contract-wide values and the connected wallet's cats.

pub mod owned;

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{contract::ContractHandle, error::Result};

pub use owned::OwnedTokenSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub name: String,
    pub paused: bool,
    /// Wei per cat.
    pub price: u128,
    pub total_supply: u64,
}

/// Shared view of the collection. Cloning shares the same state.
#[derive(Clone)]
pub struct CollectionState {
    snapshot: Arc<watch::Sender<Option<CollectionSnapshot>>>,
    owned: OwnedTokenSet,
}

impl CollectionState {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(watch::channel(None).0),
            owned: OwnedTokenSet::new(),
        }
    }

    pub fn snapshot(&self) -> Option<CollectionSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CollectionSnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn owned(&self) -> &OwnedTokenSet {
        &self.owned
    }

    /// Read every contract value at once and replace the local view.
    pub async fn refresh(&self, contract: &ContractHandle, owner: &str) -> Result<CollectionSnapshot> {
        let (paused, price, name, total_supply, wallet_of_owner) = tokio::try_join!(
            contract.paused(),
            contract.price(),
            contract.name(),
            contract.total_supply(),
            contract.wallet_of_owner(owner),
        )?;

        let snapshot = CollectionSnapshot {
            name,
            paused,
            price,
            total_supply,
        };
        info!(
            "📦 [COLLECTION] {} supply {} paused {} | {} owns {}",
            snapshot.name,
            snapshot.total_supply,
            snapshot.paused,
            owner,
            wallet_of_owner.len()
        );

        self.owned.replace(wallet_of_owner);
        self.snapshot.send_replace(Some(snapshot.clone()));
        Ok(snapshot)
    }

    /// Union freshly minted ids into the owned set. Supply only moves when
    /// the set actually grew, so a repeated confirmation is a no-op.
    pub fn record_minted(&self, token_ids: &[String]) -> usize {
        let added = self.owned.union(token_ids);
        if added == 0 {
            if !token_ids.is_empty() {
                warn!("⚠️ [COLLECTION] minted ids {:?} already known", token_ids);
            }
            return 0;
        }

        self.snapshot.send_if_modified(|snapshot| match snapshot {
            Some(snapshot) => {
                snapshot.total_supply += added as u64;
                true
            }
            None => false,
        });
        added
    }

    pub fn clear(&self) {
        self.owned.clear();
        self.snapshot.send_replace(None);
    }
}

impl Default for CollectionState {
    fn default() -> Self {
        Self::new()
    }
}
