//! zwallet core
//!
//! Account and unified address derivation over the transparent, Sapling and
//! Orchard pools, per-pool balances, and the coinbase shielding engine with
//! its UTXO lock table and asynchronous operation registry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod address;
pub mod amount;
pub mod balance;
pub mod config;
pub mod diversifier;
mod encoding;
pub mod error;
pub mod fees;
pub mod keys;
pub mod ledger;
pub mod operation;
pub mod pool;
pub mod selection;
pub mod shielding;
pub mod transaction;
pub mod viewing_key;
pub mod wallet;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use account::{
    AccountId, AccountManager, AccountsSnapshot, DerivedAddress, ViewingKeySource,
    DEFAULT_SCAN_LIMIT,
};
pub use address::{Receiver, TransparentAddress, UnifiedAddress, WalletAddress};
pub use amount::{parse_zats, Zatoshis};
pub use balance::{BalanceCalculator, BalanceScope, PoolBalances, TotalBalance};
pub use config::WalletConfig;
pub use diversifier::{DiversifierIndex, MAX_DIVERSIFIER_INDEX};
pub use error::{Error, ErrorCategory, Result};
pub use fees::FeeCalculator;
pub use keys::{KeyDerivationService, SeedKeyDerivation};
pub use ledger::{LedgerScope, LedgerView, MemoryLedger, OutPoint, WalletOutput};
pub use operation::{OperationId, OperationRegistry, OperationState, OperationStatus};
pub use pool::{Pool, ReceiverType};
pub use selection::{LimitPolicy, Selection, SourceSelector, UtxoLockManager};
pub use shielding::{ShieldingDestination, ShieldingExecutor, ShieldingResult};
pub use transaction::{BroadcastResult, SignedTransaction, TransactionDraft, TransactionRelay, TxId};
pub use viewing_key::ViewingKey;
pub use wallet::{ShieldCoinbaseRequest, Wallet};
