//! The Paper Cats contract as seen by the client.
//!
//! Binding an ABI to an address and talking to the chain belong to the
//! wallet library, so they stay behind `ContractFactory` and
//! `PaperCatsContract`. This module also owns the receipt shapes delivered
//! with `confirmation` events.

pub mod abi;
pub mod loader;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{error::Result, wallet::Web3Provider};

pub type ContractHandle = Arc<dyn PaperCatsContract>;

/// Events emitted by a sent `adopt` transaction, in provider order.
pub type TxEvents = mpsc::UnboundedReceiver<TxEvent>;

/// `{from, value}` for `adopt(amount).estimateGas(..)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallParams {
    pub from: String,
    pub value: u128,
}

/// `{from, value, gas, gasPrice}` for `adopt(amount).send(..)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendParams {
    pub from: String,
    pub value: u128,
    pub gas: u64,
    pub gas_price: u128,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TxEvent {
    Sent,
    TransactionHash(String),
    Confirmation {
        number: u64,
        detail: ConfirmationDetail,
    },
    Error(String),
}

#[async_trait]
pub trait PaperCatsContract: Send + Sync {
    async fn name(&self) -> Result<String>;
    /// `_paused()`
    async fn paused(&self) -> Result<bool>;
    /// `_price()`, wei per cat.
    async fn price(&self) -> Result<u128>;
    async fn total_supply(&self) -> Result<u64>;
    async fn wallet_of_owner(&self, owner: &str) -> Result<Vec<String>>;
    async fn token_uri(&self, token_id: &str) -> Result<String>;
    async fn estimate_adopt_gas(&self, amount: u32, call: CallParams) -> Result<u64>;
    async fn send_adopt(&self, amount: u32, send: SendParams) -> Result<TxEvents>;
}

/// Binds an ABI to an address using the connected wallet's library.
pub trait ContractFactory: Send + Sync {
    fn bind(
        &self,
        abi: &Value,
        address: &str,
        provider: Arc<dyn Web3Provider>,
    ) -> Result<ContractHandle>;
}

/* --------------------------------------------------------------------- */
/*  Confirmation receipts                                                */
/* --------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(one) => vec![one],
            OneOrMany::Many(many) => many,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(one) => std::slice::from_ref(one).iter(),
            OneOrMany::Many(many) => many.iter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferValues {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(rename = "tokenId", deserialize_with = "token_id_string")]
    pub token_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferEvent {
    #[serde(rename = "returnValues")]
    pub return_values: TransferValues,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReceiptEvents {
    #[serde(rename = "Transfer", default)]
    pub transfer: Option<OneOrMany<TransferEvent>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Receipt {
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub events: ReceiptEvents,
}

/// Second argument of a `confirmation` event: one receipt, or a list of them
/// depending on the wallet library version.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationDetail(pub OneOrMany<Receipt>);

impl ConfirmationDetail {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| {
            crate::error::PaperCatsError::ContractCall(format!("unreadable confirmation receipt: {e}"))
        })
    }

    /// Token ids from every `Transfer` event, in log order.
    pub fn minted_token_ids(&self) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|receipt| receipt.events.transfer.as_ref())
            .flat_map(|transfers| transfers.iter())
            .map(|transfer| transfer.return_values.token_id.clone())
            .collect()
    }
}

fn token_id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "tokenId must be a string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_transfer_event() {
        let detail = ConfirmationDetail::from_value(json!({
            "transactionHash": "0xfeed",
            "events": { "Transfer": { "returnValues": { "tokenId": "42" } } }
        }))
        .unwrap();
        assert_eq!(detail.minted_token_ids(), vec!["42"]);
    }

    #[test]
    fn test_array_of_transfer_events() {
        let detail = ConfirmationDetail::from_value(json!({
            "events": { "Transfer": [
                { "returnValues": { "from": "0x0", "to": "0xabc", "tokenId": "7" } },
                { "returnValues": { "tokenId": 8 } }
            ] }
        }))
        .unwrap();
        assert_eq!(detail.minted_token_ids(), vec!["7", "8"]);
    }

    #[test]
    fn test_array_of_receipts() {
        let detail = ConfirmationDetail::from_value(json!([
            { "events": { "Transfer": { "returnValues": { "tokenId": "1" } } } },
            { "events": { "Transfer": { "returnValues": { "tokenId": "2" } } } },
            { "events": {} }
        ]))
        .unwrap();
        assert_eq!(detail.minted_token_ids(), vec!["1", "2"]);
    }

    #[test]
    fn test_receipt_without_transfers() {
        let detail = ConfirmationDetail::from_value(json!({ "status": true })).unwrap();
        assert!(detail.minted_token_ids().is_empty());

        assert!(ConfirmationDetail::from_value(json!("nope")).is_err());
    }
}
