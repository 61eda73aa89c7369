//! Balance calculation
//!
//! Per-pool sums over the ledger view under a confirmation-depth filter.

use crate::account::{AccountId, AccountManager};
use crate::address::WalletAddress;
use crate::amount::Zatoshis;
use crate::ledger::{LedgerScope, LedgerView, WalletOutput};
use crate::pool::Pool;
use crate::viewing_key::ViewingKey;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Per-pool balances. Pools with no value are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolBalances(BTreeMap<Pool, Zatoshis>);

impl PoolBalances {
    /// Empty balances
    pub fn new() -> Self {
        Self::default()
    }

    /// Add value to a pool; zero additions leave the map untouched
    pub fn add(&mut self, pool: Pool, value: Zatoshis) -> Result<()> {
        if value.is_zero() {
            return Ok(());
        }
        let entry = self.0.entry(pool).or_insert(Zatoshis::ZERO);
        *entry = entry.checked_add(value).ok_or(Error::AmountOutOfRange)?;
        Ok(())
    }

    /// Value in a pool, zero when absent
    pub fn get(&self, pool: Pool) -> Zatoshis {
        self.0.get(&pool).copied().unwrap_or(Zatoshis::ZERO)
    }

    /// True if no pool holds value
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pools holding value
    pub fn pools(&self) -> BTreeSet<Pool> {
        self.0.keys().copied().collect()
    }

    /// Sum over shielded pools
    pub fn shielded(&self) -> Zatoshis {
        self.0
            .iter()
            .filter(|(pool, _)| pool.is_shielded())
            .map(|(_, v)| *v)
            .sum()
    }

    /// Sum over every pool
    pub fn total(&self) -> Zatoshis {
        self.0.values().copied().sum()
    }

    /// Iterate in pool order
    pub fn iter(&self) -> btree_map::Iter<'_, Pool, Zatoshis> {
        self.0.iter()
    }
}

impl<const N: usize> From<[(Pool, Zatoshis); N]> for PoolBalances {
    fn from(entries: [(Pool, Zatoshis); N]) -> Self {
        Self(entries.into_iter().filter(|(_, v)| !v.is_zero()).collect())
    }
}

/// Scope of a balance query
#[derive(Debug, Clone)]
pub enum BalanceScope {
    /// Every pool of an account
    Account(AccountId),
    /// The pools a viewing key can see
    ViewingKey(ViewingKey),
}

/// Wallet-wide totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalBalance {
    /// Transparent pool
    pub transparent: Zatoshis,
    /// All shielded pools
    pub private: Zatoshis,
    /// Sum of both
    pub total: Zatoshis,
}

/// Balance calculator
pub struct BalanceCalculator {
    ledger: Arc<dyn LedgerView>,
    accounts: Arc<AccountManager>,
}

impl BalanceCalculator {
    /// Create new calculator
    pub fn new(ledger: Arc<dyn LedgerView>, accounts: Arc<AccountManager>) -> Self {
        Self { ledger, accounts }
    }

    fn sum_into(
        balances: &mut PoolBalances,
        outputs: &[WalletOutput],
        chain_height: u32,
        min_confirmations: u32,
        pools: Option<&BTreeSet<Pool>>,
    ) -> Result<()> {
        for output in outputs {
            if !output.is_confirmed(chain_height, min_confirmations) {
                continue;
            }
            if pools.is_some_and(|p| !p.contains(&output.pool)) {
                continue;
            }
            balances.add(output.pool, output.value)?;
        }
        Ok(())
    }

    /// Per-pool balance of an account or viewing key.
    ///
    /// A viewing key exported from an account sees the same notes as the
    /// account, restricted to the key's pools.
    pub fn balance(&self, scope: &BalanceScope, min_confirmations: u32) -> Result<PoolBalances> {
        let (account, pools) = match scope {
            BalanceScope::Account(account) => {
                self.accounts.ensure_account(*account)?;
                (*account, None)
            }
            BalanceScope::ViewingKey(vk) => {
                let (account, pools) = self.accounts.resolve_viewing_key(vk)?;
                (account, Some(pools))
            }
        };

        let chain_height = self.ledger.chain_height()?;
        let outputs = self.ledger.list_unspent(&LedgerScope::Account(account))?;
        let mut balances = PoolBalances::new();
        Self::sum_into(
            &mut balances,
            &outputs,
            chain_height,
            min_confirmations,
            pools.as_ref(),
        )?;

        tracing::debug!(
            "Balance for account {} at minconf {}: {:?}",
            account,
            min_confirmations,
            balances
        );
        Ok(balances)
    }

    /// Balance received at one address.
    ///
    /// For a unified address this covers outputs paid to the address itself
    /// and to its transparent receiver.
    pub fn address_balance(&self, address: &str, min_confirmations: u32) -> Result<PoolBalances> {
        let network = self.accounts.network();
        let mut scopes = vec![address.to_string()];
        if let WalletAddress::Unified(ua) = WalletAddress::decode(network, address)? {
            if let Some(taddr) = ua.transparent() {
                scopes.push(taddr.encode(network));
            }
        }

        let chain_height = self.ledger.chain_height()?;
        let mut balances = PoolBalances::new();
        for scope in scopes {
            let outputs = self.ledger.list_unspent(&LedgerScope::Address(scope))?;
            Self::sum_into(&mut balances, &outputs, chain_height, min_confirmations, None)?;
        }
        Ok(balances)
    }

    /// Wallet-wide transparent and private totals
    pub fn total_balance(
        &self,
        min_confirmations: u32,
        include_watch_only: bool,
    ) -> Result<TotalBalance> {
        let chain_height = self.ledger.chain_height()?;
        let outputs: Vec<WalletOutput> = self
            .ledger
            .list_unspent(&LedgerScope::Wallet)?
            .into_iter()
            .filter(|o| include_watch_only || o.is_spendable())
            .collect();

        let mut balances = PoolBalances::new();
        Self::sum_into(&mut balances, &outputs, chain_height, min_confirmations, None)?;

        let transparent = balances.get(Pool::Transparent);
        let private = balances.shielded();
        let total = transparent
            .checked_add(private)
            .ok_or(Error::AmountOutOfRange)?;
        Ok(TotalBalance {
            transparent,
            private,
            total,
        })
    }
}
