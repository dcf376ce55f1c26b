//! Keeps the bound contract handle in step with the wallet connection.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};

use log::{info, warn};

use crate::{
    contract::{abi::AbiFetcher, ContractFactory, ContractHandle},
    error::{PaperCatsError, Result},
    wallet::WalletState,
};

pub struct ContractLoader {
    contract_address: String,
    abi: AbiFetcher,
    factory: Arc<dyn ContractFactory>,
    handle: RwLock<Option<ContractHandle>>,
    /// Bumped by every `invalidate`.
    generation: AtomicU64,
}

impl ContractLoader {
    pub fn new(
        contract_address: impl Into<String>,
        abi: AbiFetcher,
        factory: Arc<dyn ContractFactory>,
    ) -> Self {
        Self {
            contract_address: contract_address.into(),
            abi,
            factory,
            handle: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    pub fn current(&self) -> Option<ContractHandle> {
        self.handle.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Existing handle, or a freshly bound one once the wallet is connected
    /// and the ABI is available.
    pub async fn ensure(&self, wallet: &WalletState) -> Result<ContractHandle> {
        let provider = match (&wallet.provider, wallet.address.is_empty()) {
            (Some(provider), false) => provider.clone(),
            _ => return Err(PaperCatsError::WalletDisconnected),
        };
        if let Some(handle) = self.current() {
            return Ok(handle);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let abi = self
            .abi
            .load(provider.network_id(), &self.contract_address)
            .await?;
        let handle = self.factory.bind(&abi, &self.contract_address, provider)?;

        let mut slot = self.handle.write().unwrap_or_else(|e| e.into_inner());
        // the wallet went away while the ABI was loading
        if self.generation.load(Ordering::SeqCst) != generation {
            warn!("🗑️ [CONTRACT] discarding {} bound before a disconnect", self.contract_address);
            return Err(PaperCatsError::WalletDisconnected);
        }
        // another caller may have bound one while the ABI was loading
        let handle = slot.get_or_insert(handle).clone();
        info!("🔗 [CONTRACT] bound {}", self.contract_address);
        Ok(handle)
    }

    pub fn invalidate(&self) {
        let mut slot = self.handle.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::SeqCst);
        if slot.take().is_some() {
            info!("🔌 [CONTRACT] released {}", self.contract_address);
        }
    }
}
