//! Wallet state as reported by the browser wallet widget.
//!
//! The widget pushes `{address, balance, web3}` payloads; `WalletHub` turns
//! them into wholesale `WalletState` replacements and fans them out to
//! observers registered through `on_state_change`.

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use log::info;
use serde::Deserialize;

use crate::{
    error::Result,
    utils::{
        subscribers::{Subscribers, Subscription},
        units::parse_wei,
    },
};

/// Status the widget reports when the user disconnects.
pub const DISCONNECTED_STATUS: &str = "disconnected";

/// The wallet library handed over by the widget (`web3` in the payload).
#[async_trait]
pub trait Web3Provider: Send + Sync {
    /// Current network gas price in wei.
    async fn gas_price(&self) -> Result<u128>;

    /// Network id the wallet is connected to (1 = mainnet, 4 = rinkeby, ...).
    fn network_id(&self) -> u64;
}

/* --------------------------------------------------------------------- */
/*  State                                                                */
/* --------------------------------------------------------------------- */
#[derive(Clone, Default)]
pub struct WalletState {
    pub address: String,
    /// Wei, as a decimal string.
    pub balance: String,
    pub provider: Option<Arc<dyn Web3Provider>>,
}

impl WalletState {
    pub fn connected(&self) -> bool {
        !self.address.is_empty() && self.provider.is_some()
    }

    pub fn balance_wei(&self) -> Result<u128> {
        parse_wei(&self.balance)
    }
}

impl fmt::Debug for WalletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletState")
            .field("address", &self.address)
            .field("balance", &self.balance)
            .field("connected", &self.connected())
            .finish_non_exhaustive()
    }
}

/* --------------------------------------------------------------------- */
/*  Widget payload                                                       */
/* --------------------------------------------------------------------- */

/// Serializable part of a widget event's detail.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WidgetEventDetail {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub balance: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Default)]
pub struct WidgetEvent {
    pub detail: Option<WidgetEventDetail>,
    pub provider: Option<Arc<dyn Web3Provider>>,
}

impl WidgetEvent {
    pub fn connected(
        address: impl Into<String>,
        balance: impl Into<String>,
        provider: Arc<dyn Web3Provider>,
    ) -> Self {
        Self {
            detail: Some(WidgetEventDetail {
                address: Some(address.into()),
                balance: Some(balance.into()),
                status: None,
            }),
            provider: Some(provider),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            detail: Some(WidgetEventDetail {
                status: Some(DISCONNECTED_STATUS.to_string()),
                ..WidgetEventDetail::default()
            }),
            provider: None,
        }
    }

    fn is_disconnect(&self) -> bool {
        match &self.detail {
            None => true,
            Some(detail) => {
                detail.address.as_deref().map_or(true, str::is_empty)
                    || detail.status.as_deref() == Some(DISCONNECTED_STATUS)
            }
        }
    }
}

/* --------------------------------------------------------------------- */
/*  Hub                                                                  */
/* --------------------------------------------------------------------- */
#[derive(Default)]
pub struct WalletHub {
    state: RwLock<WalletState>,
    subscribers: Subscribers<WalletState>,
}

impl WalletHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WalletState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&WalletState) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Apply one widget event. Returns whether the state was replaced.
    pub fn publish(&self, event: WidgetEvent) -> bool {
        let next = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

            let next = if event.is_disconnect() {
                if state.address.is_empty() && state.provider.is_none() {
                    return false;
                }
                info!("🔌 [WALLET] disconnected");
                WalletState::default()
            } else {
                let detail = event.detail.unwrap_or_default();
                let address = detail.address.unwrap_or_default();
                let balance = detail.balance.unwrap_or_else(|| "0".to_string());
                if address == state.address && balance == state.balance {
                    return false;
                }
                info!("👛 [WALLET] {} balance {}", address, balance);
                WalletState {
                    address,
                    balance,
                    provider: event.provider,
                }
            };

            *state = next.clone();
            next
        };

        self.subscribers.notify(&next);
        true
    }
}
