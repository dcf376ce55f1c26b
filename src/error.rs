//! Error type shared by every component of the client.
//!
//! Payloads are plain strings so the error can be cloned into the mint job,
//! handed to every waiter of a shared in-flight request and rendered as text
//! by whatever view sits on top.

use thiserror::Error;

/// Substring wallet providers put in their error text when the account
/// cannot cover value + gas.
const INSUFFICIENT_FUNDS_MARKER: &str = "insufficient funds";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaperCatsError {
    /// Transport level failure or unexpected HTTP status (ABI or metadata).
    #[error("network error: {0}")]
    Network(String),

    /// The block explorer answered but refused the request (`"NOTOK"`).
    #[error("block explorer error: {0}")]
    Explorer(String),

    #[error("unsupported network id {0}")]
    UnsupportedNetwork(u64),

    /// A read or write against the contract reverted or the provider failed.
    #[error("contract call failed: {0}")]
    ContractCall(String),

    #[error("insufficient balance to mint: costs {cost} wei, wallet holds {balance} wei")]
    InsufficientFunds { cost: u128, balance: u128 },

    #[error("minting is currently paused")]
    Paused,

    /// Metadata JSON is missing expected fields. Usually the metadata server
    /// has not indexed a fresh mint yet.
    #[error("metadata for paper cat #{token_id} is malformed: {reason}")]
    MetadataShape { token_id: String, reason: String },

    #[error("wallet is not connected")]
    WalletDisconnected,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl PaperCatsError {
    /// True when the user should be offered a way to top up their wallet.
    pub fn needs_funds(&self) -> bool {
        match self {
            PaperCatsError::InsufficientFunds { .. } => true,
            PaperCatsError::ContractCall(msg) => msg
                .to_ascii_lowercase()
                .contains(INSUFFICIENT_FUNDS_MARKER),
            _ => false,
        }
    }

    /// Errors worth retrying on their own after a short delay.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaperCatsError::MetadataShape { .. })
    }
}

impl From<reqwest::Error> for PaperCatsError {
    fn from(err: reqwest::Error) -> Self {
        PaperCatsError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PaperCatsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_funds_classification() {
        let typed = PaperCatsError::InsufficientFunds { cost: 120, balance: 100 };
        assert!(typed.needs_funds());

        let provider = PaperCatsError::ContractCall(
            "Returned error: Insufficient funds for gas * price + value".to_string(),
        );
        assert!(provider.needs_funds());

        assert!(!PaperCatsError::Paused.needs_funds());
        assert!(!PaperCatsError::ContractCall("execution reverted".into()).needs_funds());
    }

    #[test]
    fn test_only_metadata_shape_is_transient() {
        let shape = PaperCatsError::MetadataShape {
            token_id: "7".into(),
            reason: "attributes missing".into(),
        };
        assert!(shape.is_transient());
        assert!(!PaperCatsError::Network("timeout".into()).is_transient());
        assert!(!PaperCatsError::Paused.is_transient());
    }
}
