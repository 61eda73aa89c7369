//! Coinbase UTXO selection and locking
//!
//! The lock table maps each reserved outpoint to the operation holding it.
//! Selection and lock acquisition happen under one mutex, so no outpoint can
//! enter two concurrent selections.

use crate::account::AccountManager;
use crate::address::TransparentAddress;
use crate::amount::Zatoshis;
use crate::ledger::{LedgerScope, LedgerView, OutPoint, WalletOutput};
use crate::operation::OperationId;
use crate::pool::Pool;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use zwallet_params::{Network, COINBASE_MATURITY, DEFAULT_SHIELD_UTXO_LIMIT};

/// Source address has no spending key in this wallet
pub const NO_PAYMENT_SOURCE: &str = "Invalid from address, no payment source found for address.";
/// Nothing eligible to shield
pub const NO_COINBASE_FUNDS: &str = "Could not find any coinbase funds to shield.";
/// Negative selection cap
pub const NEGATIVE_LIMIT: &str = "Limit on maximum number of utxos cannot be negative";
/// Selection cap beyond a 32-bit signed integer
pub const LIMIT_OUT_OF_RANGE: &str = "JSON integer out of range";

/// Where coinbase outputs may be taken from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelector {
    /// One transparent address
    Address(String),
    /// Every transparent address the wallet can spend from
    Wildcard,
}

impl SourceSelector {
    /// Parse `"*"` or a transparent address
    pub fn parse(network: &Network, source: &str) -> Result<Self> {
        if source == "*" {
            return Ok(SourceSelector::Wildcard);
        }
        TransparentAddress::decode(network, source).map_err(|_| {
            Error::MalformedAddress(format!(
                "Invalid from address, should be a taddr or \"*\": {}",
                source
            ))
        })?;
        Ok(SourceSelector::Address(source.to_string()))
    }
}

/// Selection caps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    /// Cap applied when the caller gives none
    pub default_limit: usize,
    /// Hard ceiling from the transaction size limit
    pub max_limit: usize,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SHIELD_UTXO_LIMIT,
            max_limit: crate::fees::FeeCalculator::new().max_shielding_inputs(),
        }
    }
}

impl LimitPolicy {
    /// Resolve a caller-supplied cap.
    ///
    /// `None` applies the default, `Some(0)` lifts the per-request cap and
    /// leaves only the ceiling.
    pub fn resolve(&self, requested: Option<i64>) -> Result<usize> {
        match requested {
            Some(n) if n < 0 => Err(Error::InvalidLimit(NEGATIVE_LIMIT.to_string())),
            Some(n) if n > i64::from(i32::MAX) => {
                Err(Error::InvalidLimit(LIMIT_OUT_OF_RANGE.to_string()))
            }
            None => Ok(self.default_limit.min(self.max_limit)),
            Some(0) => Ok(self.max_limit),
            Some(n) => Ok((n as usize).min(self.max_limit)),
        }
    }
}

/// Outputs reserved for one operation
#[derive(Debug, Clone)]
pub struct Selection {
    /// Operation holding the locks
    pub operation_id: OperationId,
    /// Selected outputs in outpoint order
    pub selected: Vec<WalletOutput>,
    /// Sum of selected values
    pub selected_value: Zatoshis,
    /// Eligible outputs left behind by the cap
    pub remaining_count: usize,
    /// Value of the outputs left behind
    pub remaining_value: Zatoshis,
}

impl Selection {
    /// Selected outpoints
    pub fn outpoints(&self) -> Vec<OutPoint> {
        self.selected.iter().map(|o| o.outpoint).collect()
    }
}

/// UTXO lock manager
pub struct UtxoLockManager {
    ledger: Arc<dyn LedgerView>,
    accounts: Arc<AccountManager>,
    limits: LimitPolicy,
    coinbase_maturity: u32,
    locks: Mutex<HashMap<OutPoint, OperationId>>,
}

impl UtxoLockManager {
    /// Create new lock manager
    pub fn new(
        ledger: Arc<dyn LedgerView>,
        accounts: Arc<AccountManager>,
        limits: LimitPolicy,
    ) -> Self {
        Self {
            ledger,
            accounts,
            limits,
            coinbase_maturity: COINBASE_MATURITY,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the coinbase maturity depth
    pub fn with_coinbase_maturity(mut self, confirmations: u32) -> Self {
        self.coinbase_maturity = confirmations;
        self
    }

    /// Selection caps in force
    pub fn limits(&self) -> LimitPolicy {
        self.limits
    }

    /// Select eligible coinbase outputs and lock them for `operation_id`
    pub fn select_and_lock(
        &self,
        operation_id: &OperationId,
        selector: &SourceSelector,
        max_count: Option<i64>,
        exclude: Option<&str>,
    ) -> Result<Selection> {
        self.select_and_lock_with(operation_id, selector, max_count, exclude, |_| Ok(()))
            .map(|(selection, ())| selection)
    }

    /// Like [`select_and_lock`](Self::select_and_lock), running `check` on
    /// the candidate selection before any lock is committed. An error from
    /// `check` takes no locks.
    ///
    /// Locks on outputs the ledger no longer lists as unspent are retired
    /// first, so a successful operation's inputs stop counting once spent.
    pub fn select_and_lock_with<T, F>(
        &self,
        operation_id: &OperationId,
        selector: &SourceSelector,
        max_count: Option<i64>,
        exclude: Option<&str>,
        check: F,
    ) -> Result<(Selection, T)>
    where
        F: FnOnce(&Selection) -> Result<T>,
    {
        let limit = self.limits.resolve(max_count)?;

        let source = match selector {
            SourceSelector::Address(address) => {
                if self.accounts.find_transparent(address).is_none() {
                    return Err(Error::NoEligibleSource(NO_PAYMENT_SOURCE.to_string()));
                }
                Some(address.as_str())
            }
            SourceSelector::Wildcard => None,
        };

        let mut locks = self.locks.lock();
        let chain_height = self.ledger.chain_height()?;
        let unspent = self.ledger.list_unspent(&LedgerScope::Wallet)?;
        Self::retain_unspent(&mut locks, &unspent);

        let mut eligible: Vec<WalletOutput> = unspent
            .into_iter()
            .filter(|o| {
                source.map_or(true, |address| o.address == address)
                    && o.pool == Pool::Transparent
                    && o.is_coinbase
                    && !o.spent
                    && o.is_spendable()
                    && o.confirmations(chain_height) >= self.coinbase_maturity
                    && exclude != Some(o.address.as_str())
                    && !locks.contains_key(&o.outpoint)
            })
            .collect();

        if eligible.is_empty() {
            return Err(Error::NoEligibleSource(NO_COINBASE_FUNDS.to_string()));
        }

        eligible.sort_by_key(|o| o.outpoint);
        let remaining = eligible.split_off(limit.min(eligible.len()));

        let selected_value =
            Zatoshis::checked_sum(eligible.iter().map(|o| o.value)).ok_or(Error::AmountOutOfRange)?;
        let remaining_value =
            Zatoshis::checked_sum(remaining.iter().map(|o| o.value)).ok_or(Error::AmountOutOfRange)?;

        let selection = Selection {
            operation_id: operation_id.clone(),
            selected: eligible,
            selected_value,
            remaining_count: remaining.len(),
            remaining_value,
        };
        let extra = check(&selection)?;

        for output in &selection.selected {
            locks.insert(output.outpoint, operation_id.clone());
        }

        tracing::debug!(
            "Locked {} UTXOs ({}) for {}, {} remaining",
            selection.selected.len(),
            selection.selected_value,
            operation_id,
            selection.remaining_count
        );
        Ok((selection, extra))
    }

    /// Release every lock held by an operation
    pub fn release(&self, operation_id: &OperationId) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, holder| holder != operation_id);
        let released = before - locks.len();
        if released > 0 {
            tracing::debug!("Released {} UTXO locks held by {}", released, operation_id);
        }
        released
    }

    /// True if the outpoint is reserved
    pub fn is_locked(&self, outpoint: &OutPoint) -> bool {
        self.locks.lock().contains_key(outpoint)
    }

    /// Operation holding an outpoint
    pub fn locked_by(&self, outpoint: &OutPoint) -> Option<OperationId> {
        self.locks.lock().get(outpoint).cloned()
    }

    /// Number of reserved outpoints
    pub fn locked_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop locks whose outputs the ledger no longer lists as unspent.
    ///
    /// Selection does this on every call; this entry point lets a caller
    /// retire locks without selecting.
    pub fn prune_spent(&self) -> Result<usize> {
        let unspent = self.ledger.list_unspent(&LedgerScope::Wallet)?;
        let mut locks = self.locks.lock();
        Ok(Self::retain_unspent(&mut locks, &unspent))
    }

    fn retain_unspent(locks: &mut HashMap<OutPoint, OperationId>, unspent: &[WalletOutput]) -> usize {
        if locks.is_empty() {
            return 0;
        }
        let unspent: HashSet<OutPoint> = unspent.iter().map(|o| o.outpoint).collect();
        let before = locks.len();
        locks.retain(|outpoint, _| unspent.contains(outpoint));
        let pruned = before - locks.len();
        if pruned > 0 {
            tracing::debug!("Pruned {} locks on spent outputs", pruned);
        }
        pruned
    }
}
