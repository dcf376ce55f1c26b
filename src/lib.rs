//! Client core for the Paper Cats NFT collection: expiring cache, wallet
//! events, contract binding, metadata loading and the mint state machine.

pub mod cache;
pub mod collection;
pub mod config;
pub mod contract;
pub mod error;
pub mod metadata;
pub mod mint;
pub mod session;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{PaperCatsError, Result};
pub use session::Session;
