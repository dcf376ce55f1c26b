//! In-process stand-ins for the wallet library and the bound contract.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use crate::{
    contract::{
        CallParams, ConfirmationDetail, ContractFactory, ContractHandle, PaperCatsContract,
        SendParams, TxEvent, TxEvents,
    },
    error::{PaperCatsError, Result},
    wallet::Web3Provider,
};

pub(crate) struct FixedProvider {
    pub gas_price: u128,
    pub network_id: u64,
}

#[async_trait]
impl Web3Provider for FixedProvider {
    async fn gas_price(&self) -> Result<u128> {
        Ok(self.gas_price)
    }

    fn network_id(&self) -> u64 {
        self.network_id
    }
}

pub(crate) fn provider() -> Arc<dyn Web3Provider> {
    Arc::new(FixedProvider {
        gas_price: 1_000_000_000,
        network_id: 4,
    })
}

pub(crate) fn transfer_detail(token_ids: &[&str]) -> ConfirmationDetail {
    let transfers: Vec<Value> = token_ids
        .iter()
        .map(|id| json!({ "returnValues": { "tokenId": id } }))
        .collect();
    let transfer = if transfers.len() == 1 {
        transfers[0].clone()
    } else {
        Value::Array(transfers)
    };
    ConfirmationDetail::from_value(json!({ "events": { "Transfer": transfer } }))
        .expect("valid receipt")
}

pub(crate) struct MockContract {
    pub name: String,
    pub paused: bool,
    pub price: u128,
    pub total_supply: u64,
    pub owned: Vec<String>,
    pub token_uris: HashMap<String, String>,
    pub estimate: Result<u64>,
    pub send_error: Option<PaperCatsError>,
    pub events: Vec<TxEvent>,
    /// Holds the event stream back until notified.
    pub release: Option<Arc<Notify>>,

    pub estimates: AtomicUsize,
    pub sends: AtomicUsize,
    pub last_send: Mutex<Option<SendParams>>,
    pub last_call: Mutex<Option<CallParams>>,
}

impl MockContract {
    pub fn new() -> Self {
        Self {
            name: "Paper Cats".into(),
            paused: false,
            price: 10_000_000_000_000_000,
            total_supply: 41,
            owned: Vec::new(),
            token_uris: HashMap::new(),
            estimate: Ok(21_000),
            send_error: None,
            events: vec![
                TxEvent::Sent,
                TxEvent::TransactionHash("0xhash".into()),
                TxEvent::Confirmation {
                    number: 1,
                    detail: transfer_detail(&["42"]),
                },
            ],
            release: None,
            estimates: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            last_send: Mutex::new(None),
            last_call: Mutex::new(None),
        }
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn estimates(&self) -> usize {
        self.estimates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaperCatsContract for MockContract {
    async fn name(&self) -> Result<String> {
        Ok(self.name.clone())
    }

    async fn paused(&self) -> Result<bool> {
        Ok(self.paused)
    }

    async fn price(&self) -> Result<u128> {
        Ok(self.price)
    }

    async fn total_supply(&self) -> Result<u64> {
        Ok(self.total_supply)
    }

    async fn wallet_of_owner(&self, _owner: &str) -> Result<Vec<String>> {
        Ok(self.owned.clone())
    }

    async fn token_uri(&self, token_id: &str) -> Result<String> {
        self.token_uris
            .get(token_id)
            .cloned()
            .ok_or_else(|| PaperCatsError::ContractCall(format!("nonexistent token {token_id}")))
    }

    async fn estimate_adopt_gas(&self, _amount: u32, call: CallParams) -> Result<u64> {
        self.estimates.fetch_add(1, Ordering::SeqCst);
        *self.last_call.lock().unwrap() = Some(call);
        self.estimate.clone()
    }

    async fn send_adopt(&self, _amount: u32, send: SendParams) -> Result<TxEvents> {
        if let Some(err) = &self.send_error {
            return Err(err.clone());
        }
        self.sends.fetch_add(1, Ordering::SeqCst);
        *self.last_send.lock().unwrap() = Some(send);

        let (tx, rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        let release = self.release.clone();
        tokio::spawn(async move {
            if let Some(release) = release {
                release.notified().await;
            }
            for event in events {
                let _ = tx.send(event);
            }
        });
        Ok(rx)
    }
}

pub(crate) struct MockFactory {
    pub contract: Arc<MockContract>,
    pub binds: AtomicUsize,
}

impl MockFactory {
    pub fn new(contract: Arc<MockContract>) -> Self {
        Self {
            contract,
            binds: AtomicUsize::new(0),
        }
    }
}

impl ContractFactory for MockFactory {
    fn bind(
        &self,
        _abi: &Value,
        _address: &str,
        _provider: Arc<dyn Web3Provider>,
    ) -> Result<ContractHandle> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        Ok(self.contract.clone())
    }
}
