//! Wires wallet events to the contract, the collection view, metadata and
//! minting.
//!
//! Wallet states are consumed in order from a channel fed by
//! [`Session::attach`]. Failures while reacting to a connection are kept as
//! the session's last error rather than propagated.

use std::sync::{Arc, RwLock};

use log::{info, warn};
use tokio::sync::mpsc;

use crate::{
    cache::{ExpiringCache, Storage},
    collection::CollectionState,
    config::settings::Settings,
    contract::{abi::AbiFetcher, loader::ContractLoader, ContractFactory},
    error::{PaperCatsError, Result},
    metadata::{MetadataLoader, PaperCatMetadata},
    mint::{gas::GasPolicy, MintOrchestrator, MintOutcome},
    utils::subscribers::Subscription,
    wallet::{WalletHub, WalletState},
};

pub struct Session {
    contract: ContractLoader,
    collection: CollectionState,
    metadata: MetadataLoader,
    orchestrator: MintOrchestrator,
    wallet: RwLock<WalletState>,
    last_error: RwLock<Option<PaperCatsError>>,
}

impl Session {
    pub fn new(contract: ContractLoader, metadata: MetadataLoader, gas: GasPolicy) -> Self {
        let collection = CollectionState::new();
        Self {
            contract,
            orchestrator: MintOrchestrator::new(collection.clone(), gas),
            collection,
            metadata,
            wallet: RwLock::new(WalletState::default()),
            last_error: RwLock::new(None),
        }
    }

    /// Build every component from settings over one shared cache.
    pub fn from_settings(
        settings: &Settings,
        storage: Arc<dyn Storage>,
        factory: Arc<dyn ContractFactory>,
    ) -> anyhow::Result<Self> {
        let client = settings.http_client()?;
        let cache = Arc::new(ExpiringCache::new(storage).with_default_ttl(settings.cache_ttl()));

        let abi = AbiFetcher::new(client.clone(), cache.clone(), settings.abi_cache_ttl())
            .with_base_url(settings.explorer_api_url.clone())
            .with_api_key(settings.explorer_api_key.clone());
        let contract = ContractLoader::new(settings.contract_address.clone(), abi, factory);
        let metadata = MetadataLoader::new(
            client,
            cache,
            settings.contract_address.clone(),
            settings.cache_ttl(),
        )
        .with_retry(settings.metadata_retry_delay(), settings.metadata_max_attempts);

        Ok(Self::new(contract, metadata, settings.gas_policy()?))
    }

    /// Forward every wallet state change into a channel for [`Session::run`].
    pub fn attach(hub: &WalletHub) -> (Subscription, mpsc::UnboundedReceiver<WalletState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = hub.on_state_change(move |state| {
            let _ = tx.send(state.clone());
        });
        (subscription, rx)
    }

    pub async fn run(&self, mut states: mpsc::UnboundedReceiver<WalletState>) {
        while let Some(state) = states.recv().await {
            self.apply(state).await;
        }
        info!("🛑 [SESSION] wallet feed closed");
    }

    pub async fn apply(&self, state: WalletState) {
        let previous = self.replace_wallet(state.clone());

        if !state.connected() {
            self.contract.invalidate();
            self.collection.clear();
            self.set_last_error(None);
            return;
        }

        // the handle was bound to the previous account's provider
        if previous.address != state.address {
            self.contract.invalidate();
        }

        let result = async {
            let contract = self.contract.ensure(&state).await?;
            self.collection.refresh(&contract, &state.address).await
        }
        .await;

        match result {
            Ok(_) => self.set_last_error(None),
            Err(e) => {
                warn!("⚠️ [SESSION] could not load collection for {}: {}", state.address, e);
                self.set_last_error(Some(e));
            }
        }
    }

    pub async fn mint(&self, amount: u32) -> Result<MintOutcome> {
        let wallet = self.wallet();
        let contract = self.contract.ensure(&wallet).await?;
        self.orchestrator.mint(&contract, &wallet, amount).await
    }

    pub async fn paper_cat(&self, token_id: &str) -> Result<PaperCatMetadata> {
        if let Some(metadata) = self.metadata.cached(token_id) {
            return Ok(metadata);
        }
        let contract = self.contract.ensure(&self.wallet()).await?;
        self.metadata.load(&contract, token_id).await
    }

    pub fn wallet(&self) -> WalletState {
        self.wallet.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn collection(&self) -> &CollectionState {
        &self.collection
    }

    pub fn orchestrator(&self) -> &MintOrchestrator {
        &self.orchestrator
    }

    pub fn last_error(&self) -> Option<PaperCatsError> {
        self.last_error.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace_wallet(&self, state: WalletState) -> WalletState {
        let mut wallet = self.wallet.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *wallet, state)
    }

    fn set_last_error(&self, error: Option<PaperCatsError>) {
        *self.last_error.write().unwrap_or_else(|e| e.into_inner()) = error;
    }
}
