//! Ledger view
//!
//! Read-only projection of the wallet's unspent outputs. [`MemoryLedger`] is
//! an in-process store that also plays the transaction relay, which is what
//! the integration tests and embedded callers use.

use crate::account::AccountId;
use crate::amount::Zatoshis;
use crate::pool::Pool;
use crate::transaction::{BroadcastResult, SignedTransaction, TransactionRelay, TxId};
use crate::Result;
use async_trait::async_trait;
use blake2b_simd::Params as Blake2bParams;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

const LEDGER_TXID_PERSONALIZATION: &[u8; 16] = b"ZWallet_LedgerTx";

/// Reference to one transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Creating transaction
    pub txid: TxId,
    /// Output index
    pub index: u32,
}

impl OutPoint {
    /// Create new outpoint
    pub const fn new(txid: TxId, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// One output as seen by the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletOutput {
    /// Outpoint
    pub outpoint: OutPoint,
    /// Pool the output lives in
    pub pool: Pool,
    /// Value
    pub value: Zatoshis,
    /// Spending account; `None` for watch-only outputs
    pub account: Option<AccountId>,
    /// Encoded address the output was paid to
    pub address: String,
    /// Confirmation height, `None` while in the mempool
    pub height: Option<u32>,
    /// Coinbase output
    pub is_coinbase: bool,
    /// Spent flag
    pub spent: bool,
}

impl WalletOutput {
    /// Confirmations at `chain_height` (0 while unconfirmed)
    pub fn confirmations(&self, chain_height: u32) -> u32 {
        match self.height {
            Some(h) if h <= chain_height => chain_height - h + 1,
            _ => 0,
        }
    }

    /// True if the output counts at `min_confirmations`; zero admits unconfirmed outputs
    pub fn is_confirmed(&self, chain_height: u32, min_confirmations: u32) -> bool {
        min_confirmations == 0 || self.confirmations(chain_height) >= min_confirmations
    }

    /// True if the wallet holds spending authority
    pub fn is_spendable(&self) -> bool {
        self.account.is_some()
    }
}

/// Which outputs a ledger query covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerScope {
    /// Every output the wallet tracks, spendable or watch-only
    Wallet,
    /// Outputs spendable by one account
    Account(AccountId),
    /// Outputs paid to one encoded address
    Address(String),
}

/// Ledger/storage collaborator
pub trait LedgerView: Send + Sync {
    /// Unspent outputs in scope
    fn list_unspent(&self, scope: &LedgerScope) -> Result<Vec<WalletOutput>>;

    /// Current chain tip height
    fn chain_height(&self) -> Result<u32>;
}

/// Ownership of an address tracked by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Spendable by the account
    Spendable(AccountId),
    /// Visible without spending authority
    WatchOnly,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    pool: Pool,
    value: Zatoshis,
    address: String,
    height: Option<u32>,
    is_coinbase: bool,
    spent_by: Option<TxId>,
}

#[derive(Debug, Default)]
struct LedgerState {
    height: u32,
    outputs: BTreeMap<OutPoint, LedgerEntry>,
    owners: HashMap<String, Ownership>,
    nonce: u64,
}

impl LedgerState {
    fn project(&self, outpoint: &OutPoint, entry: &LedgerEntry) -> Option<WalletOutput> {
        let ownership = self.owners.get(&entry.address)?;
        Some(WalletOutput {
            outpoint: *outpoint,
            pool: entry.pool,
            value: entry.value,
            account: match ownership {
                Ownership::Spendable(account) => Some(*account),
                Ownership::WatchOnly => None,
            },
            address: entry.address.clone(),
            height: entry.height,
            is_coinbase: entry.is_coinbase,
            spent: entry.spent_by.is_some(),
        })
    }

    fn fresh_txid(&mut self) -> TxId {
        self.nonce += 1;
        let hash = Blake2bParams::new()
            .hash_length(32)
            .personal(LEDGER_TXID_PERSONALIZATION)
            .hash(&self.nonce.to_le_bytes());
        let mut txid = [0u8; 32];
        txid.copy_from_slice(hash.as_bytes());
        TxId::from_bytes(txid)
    }
}

/// In-memory ledger and relay
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    /// Create an empty ledger at the given tip height
    pub fn new(height: u32) -> Self {
        Self {
            state: RwLock::new(LedgerState {
                height,
                ..LedgerState::default()
            }),
        }
    }

    /// Track an address as spendable by `account`
    pub fn register_address(&self, address: &str, account: AccountId) {
        self.state
            .write()
            .owners
            .insert(address.to_string(), Ownership::Spendable(account));
    }

    /// Track an address without spending authority
    pub fn watch_address(&self, address: &str) {
        self.state
            .write()
            .owners
            .insert(address.to_string(), Ownership::WatchOnly);
    }

    /// Add an unconfirmed output paid to `address` from an external source
    pub fn receive(&self, pool: Pool, address: &str, value: Zatoshis) -> OutPoint {
        let mut state = self.state.write();
        let outpoint = OutPoint::new(state.fresh_txid(), 0);
        state.outputs.insert(
            outpoint,
            LedgerEntry {
                pool,
                value,
                address: address.to_string(),
                height: None,
                is_coinbase: false,
                spent_by: None,
            },
        );
        outpoint
    }

    /// Mine one block paying a transparent coinbase output to `address`
    pub fn mine_coinbase(&self, address: &str, value: Zatoshis) -> OutPoint {
        let mut state = self.state.write();
        state.height += 1;
        let height = state.height;
        for entry in state.outputs.values_mut() {
            entry.height.get_or_insert(height);
        }

        let outpoint = OutPoint::new(state.fresh_txid(), 0);
        state.outputs.insert(
            outpoint,
            LedgerEntry {
                pool: Pool::Transparent,
                value,
                address: address.to_string(),
                height: Some(height),
                is_coinbase: true,
                spent_by: None,
            },
        );
        outpoint
    }

    /// Mine `count` blocks, confirming everything in the mempool
    pub fn mine_blocks(&self, count: u32) {
        let mut state = self.state.write();
        for _ in 0..count {
            state.height += 1;
            let height = state.height;
            for entry in state.outputs.values_mut() {
                entry.height.get_or_insert(height);
            }
        }
    }

    /// Mark outputs spent by `txid`
    pub fn mark_spent(&self, outpoints: &[OutPoint], txid: TxId) {
        let mut state = self.state.write();
        for outpoint in outpoints {
            if let Some(entry) = state.outputs.get_mut(outpoint) {
                entry.spent_by = Some(txid);
            }
        }
    }

    /// Transaction that spent an output, if any
    pub fn spent_by(&self, outpoint: &OutPoint) -> Option<TxId> {
        self.state
            .read()
            .outputs
            .get(outpoint)
            .and_then(|e| e.spent_by)
    }

    /// Number of unconfirmed outputs
    pub fn mempool_size(&self) -> usize {
        self.state
            .read()
            .outputs
            .values()
            .filter(|e| e.height.is_none())
            .count()
    }
}

impl LedgerView for MemoryLedger {
    fn list_unspent(&self, scope: &LedgerScope) -> Result<Vec<WalletOutput>> {
        let state = self.state.read();
        let outputs = state
            .outputs
            .iter()
            .filter(|(_, entry)| entry.spent_by.is_none())
            .filter_map(|(outpoint, entry)| state.project(outpoint, entry))
            .filter(|output| match scope {
                LedgerScope::Wallet => true,
                LedgerScope::Account(account) => output.account == Some(*account),
                LedgerScope::Address(address) => &output.address == address,
            })
            .collect();
        Ok(outputs)
    }

    fn chain_height(&self) -> Result<u32> {
        Ok(self.state.read().height)
    }
}

#[async_trait]
impl TransactionRelay for MemoryLedger {
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<BroadcastResult> {
        let mut state = self.state.write();

        if state.outputs.contains_key(&OutPoint::new(tx.txid, 0)) {
            return Ok(BroadcastResult::Rejected("txn-already-in-mempool".to_string()));
        }
        for input in &tx.draft.inputs {
            match state.outputs.get(&input.outpoint) {
                None => {
                    return Ok(BroadcastResult::Rejected(
                        "bad-txns-inputs-missingorspent".to_string(),
                    ))
                }
                Some(entry) if entry.spent_by.is_some() => {
                    return Ok(BroadcastResult::Rejected("bad-txns-inputs-spent".to_string()))
                }
                Some(_) => {}
            }
        }

        for input in &tx.draft.inputs {
            if let Some(entry) = state.outputs.get_mut(&input.outpoint) {
                entry.spent_by = Some(tx.txid);
            }
        }
        state.outputs.insert(
            OutPoint::new(tx.txid, 0),
            LedgerEntry {
                pool: tx.draft.output.pool(),
                value: tx.draft.output.value,
                address: tx.draft.output.address.clone(),
                height: None,
                is_coinbase: false,
                spent_by: None,
            },
        );

        tracing::debug!(
            "Accepted {} spending {} inputs into the mempool",
            tx.txid,
            tx.draft.inputs.len()
        );
        Ok(BroadcastResult::Accepted(tx.txid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zats(v: u64) -> Zatoshis {
        Zatoshis::from_u64(v).unwrap()
    }

    #[test]
    fn test_confirmations() {
        let ledger = MemoryLedger::new(10);
        let account = AccountId::from(0u32);
        ledger.register_address("addr", account);
        ledger.receive(Pool::Sapling, "addr", zats(5));

        let outputs = ledger.list_unspent(&LedgerScope::Account(account)).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].confirmations(10), 0);
        assert!(outputs[0].is_confirmed(10, 0));
        assert!(!outputs[0].is_confirmed(10, 1));

        ledger.mine_blocks(1);
        let outputs = ledger.list_unspent(&LedgerScope::Account(account)).unwrap();
        assert_eq!(outputs[0].height, Some(11));
        assert!(outputs[0].is_confirmed(11, 1));
        assert!(!outputs[0].is_confirmed(11, 2));
    }

    #[test]
    fn test_untracked_addresses_are_invisible() {
        let ledger = MemoryLedger::new(0);
        ledger.receive(Pool::Orchard, "stranger", zats(5));
        assert!(ledger.list_unspent(&LedgerScope::Wallet).unwrap().is_empty());

        ledger.watch_address("stranger");
        let outputs = ledger.list_unspent(&LedgerScope::Wallet).unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(!outputs[0].is_spendable());
    }

    #[test]
    fn test_coinbase_and_spent() {
        let ledger = MemoryLedger::new(0);
        let account = AccountId::from(0u32);
        ledger.register_address("taddr", account);
        let outpoint = ledger.mine_coinbase("taddr", zats(1_000));
        assert_eq!(ledger.chain_height().unwrap(), 1);

        let outputs = ledger
            .list_unspent(&LedgerScope::Address("taddr".into()))
            .unwrap();
        assert!(outputs[0].is_coinbase);

        let txid = TxId::from_bytes([9u8; 32]);
        ledger.mark_spent(&[outpoint], txid);
        assert_eq!(ledger.spent_by(&outpoint), Some(txid));
        assert!(ledger.list_unspent(&LedgerScope::Wallet).unwrap().is_empty());
    }
}
