//! Network parameters, consensus constants and wallet policy constants
//!
//! This crate provides the network-specific encodings (address prefixes,
//! human-readable parts), consensus limits and the shielding policy values
//! consumed by `zwallet-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consensus;
pub mod network;
pub mod policy;

pub use consensus::{COIN, COINBASE_MATURITY, MAX_MONEY, MAX_TX_SIZE, TRANSPARENT_INPUT_SIZE};
pub use network::{Network, NetworkType};
pub use policy::{
    DEFAULT_MIN_CONFIRMATIONS, DEFAULT_SHIELD_UTXO_LIMIT, GRACE_ACTIONS, MARGINAL_FEE,
};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
