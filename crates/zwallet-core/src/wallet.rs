//! Wallet facade
//!
//! Wires the account manager, balance calculator, lock manager, executor and
//! operation registry together and exposes the surface an RPC layer calls.

use crate::account::{AccountId, AccountManager, AccountsSnapshot, DerivedAddress, ViewingKeySource};
use crate::address::Receiver;
use crate::balance::{BalanceCalculator, BalanceScope, PoolBalances, TotalBalance};
use crate::config::WalletConfig;
use crate::diversifier::DiversifierIndex;
use crate::fees::FeeCalculator;
use crate::keys::KeyDerivationService;
use crate::ledger::LedgerView;
use crate::operation::{OperationId, OperationRegistry, OperationState, OperationStatus};
use crate::pool::ReceiverType;
use crate::selection::{SourceSelector, UtxoLockManager};
use crate::shielding::{ShieldingDestination, ShieldingExecutor, ShieldingResult};
use crate::transaction::TransactionRelay;
use crate::viewing_key::ViewingKey;
use crate::{amount, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use zwallet_params::Network;

/// Parameters of a coinbase shielding request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldCoinbaseRequest {
    /// Transparent source address or `"*"`
    pub from: String,
    /// Unified destination address
    pub to: String,
    /// Fee in signed zatoshis; `None` for the conventional fee
    pub fee: Option<i64>,
    /// UTXO cap; `None` for the configured default, `0` for no cap
    pub limit: Option<i64>,
    /// Transparent address to leave untouched by a wildcard source
    pub exclude: Option<String>,
}

impl ShieldCoinbaseRequest {
    /// Request with default fee and limit
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            fee: None,
            limit: None,
            exclude: None,
        }
    }

    /// Set the fee in zatoshis
    pub fn with_fee(mut self, fee: i64) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Set the fee from a fixed-point decimal string
    pub fn with_fee_decimal(mut self, fee: &str) -> Result<Self> {
        self.fee = Some(amount::parse_zats(fee)?);
        Ok(self)
    }

    /// Set the UTXO cap
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Leave one address alone
    pub fn excluding(mut self, address: impl Into<String>) -> Self {
        self.exclude = Some(address.into());
        self
    }
}

/// Wallet
pub struct Wallet {
    config: WalletConfig,
    network: Network,
    ledger: Arc<dyn LedgerView>,
    accounts: Arc<AccountManager>,
    balances: BalanceCalculator,
    fees: FeeCalculator,
    locks: Arc<UtxoLockManager>,
    registry: Arc<OperationRegistry>,
    executor: ShieldingExecutor,
}

impl Wallet {
    /// Create a wallet with no accounts
    pub fn new(
        config: WalletConfig,
        keys: Arc<dyn KeyDerivationService>,
        ledger: Arc<dyn LedgerView>,
        relay: Arc<dyn TransactionRelay>,
    ) -> Self {
        let accounts = Arc::new(AccountManager::new(config.network_params(), keys.clone()));
        Self::assemble(config, keys, accounts, ledger, relay)
    }

    /// Restore a wallet from an account snapshot
    pub fn restore(
        config: WalletConfig,
        keys: Arc<dyn KeyDerivationService>,
        ledger: Arc<dyn LedgerView>,
        relay: Arc<dyn TransactionRelay>,
        snapshot: AccountsSnapshot,
    ) -> Result<Self> {
        let accounts = Arc::new(AccountManager::restore(
            config.network_params(),
            keys.clone(),
            snapshot,
        )?);
        Ok(Self::assemble(config, keys, accounts, ledger, relay))
    }

    fn assemble(
        config: WalletConfig,
        keys: Arc<dyn KeyDerivationService>,
        accounts: Arc<AccountManager>,
        ledger: Arc<dyn LedgerView>,
        relay: Arc<dyn TransactionRelay>,
    ) -> Self {
        let network = config.network_params();
        let locks = Arc::new(
            UtxoLockManager::new(ledger.clone(), accounts.clone(), config.limit_policy())
                .with_coinbase_maturity(config.coinbase_maturity),
        );
        let registry = Arc::new(OperationRegistry::new());
        let executor = ShieldingExecutor::new(keys, relay, locks.clone(), registry.clone());

        Self {
            balances: BalanceCalculator::new(ledger.clone(), accounts.clone()),
            fees: config.fee_calculator(),
            config,
            network,
            ledger,
            accounts,
            locks,
            registry,
            executor,
        }
    }

    /// Network parameters in force
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Configuration
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Account manager
    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    /// UTXO lock manager
    pub fn locks(&self) -> &UtxoLockManager {
        &self.locks
    }

    /// Snapshot of every account for persistence
    pub fn snapshot(&self) -> AccountsSnapshot {
        self.accounts.snapshot()
    }

    /// Allocate the next account
    pub fn create_account(&self) -> Result<AccountId> {
        self.accounts.create_account()
    }

    /// Derive a unified address for an account
    pub fn get_address_for_account(
        &self,
        account: AccountId,
        receiver_types: &[ReceiverType],
        diversifier_index: Option<DiversifierIndex>,
    ) -> Result<DerivedAddress> {
        self.accounts
            .derive_address(account, receiver_types, diversifier_index)
    }

    /// Receivers of a unified address in typecode order
    pub fn list_unified_receivers(&self, address: &str) -> Result<Vec<Receiver>> {
        Ok(self.accounts.list_receivers(address)?.receivers().to_vec())
    }

    /// Export an encoded viewing key for an account or address
    pub fn export_viewing_key(&self, source: &ViewingKeySource) -> Result<String> {
        self.accounts.export_viewing_key(source)?.encode(&self.network)
    }

    fn min_confirmations(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.config.default_min_confirmations)
    }

    /// Per-pool balance of an account
    pub fn balance_for_account(
        &self,
        account: AccountId,
        min_confirmations: Option<u32>,
    ) -> Result<PoolBalances> {
        self.balances.balance(
            &BalanceScope::Account(account),
            self.min_confirmations(min_confirmations),
        )
    }

    /// Per-pool balance visible to an encoded viewing key
    pub fn balance_for_viewing_key(
        &self,
        viewing_key: &str,
        min_confirmations: Option<u32>,
    ) -> Result<PoolBalances> {
        let vk = ViewingKey::decode(&self.network, viewing_key)?;
        self.balances.balance(
            &BalanceScope::ViewingKey(vk),
            self.min_confirmations(min_confirmations),
        )
    }

    /// Per-pool balance received at one address
    pub fn address_balance(
        &self,
        address: &str,
        min_confirmations: Option<u32>,
    ) -> Result<PoolBalances> {
        self.balances
            .address_balance(address, self.min_confirmations(min_confirmations))
    }

    /// Wallet-wide transparent and private totals
    pub fn total_balance(
        &self,
        min_confirmations: Option<u32>,
        include_watch_only: bool,
    ) -> Result<TotalBalance> {
        self.balances
            .total_balance(self.min_confirmations(min_confirmations), include_watch_only)
    }

    /// Shield mature coinbase outputs into a shielded receiver.
    ///
    /// Every validation failure is reported before any UTXO is locked. On
    /// success the returned operation id tracks the asynchronous build and
    /// broadcast. Must be called from within a tokio runtime.
    pub fn shield_coinbase(&self, request: &ShieldCoinbaseRequest) -> Result<ShieldingResult> {
        let fee_override = request
            .fee
            .map(|fee| self.fees.validate_fee(fee))
            .transpose()?;
        let selector = SourceSelector::parse(&self.network, &request.from)?;
        if let Some(exclude) = &request.exclude {
            if SourceSelector::parse(&self.network, exclude)? == SourceSelector::Wildcard {
                return Err(Error::MalformedAddress(format!(
                    "Invalid exclusion address, should be a taddr: {}",
                    exclude
                )));
            }
        }

        let target_height = self.ledger.chain_height()?.saturating_add(1);
        let destination = ShieldingDestination::resolve(&self.network, &request.to, target_height)?;

        let operation_id = OperationId::new();
        let (selection, fee) = self.locks.select_and_lock_with(
            &operation_id,
            &selector,
            request.limit,
            request.exclude.as_deref(),
            |candidate| {
                let fee = match fee_override {
                    Some(fee) => fee,
                    None => self
                        .fees
                        .shielding_fee(candidate.selected.len(), destination.pool())?,
                };
                // The shielded output must carry a non-zero value.
                if candidate.selected_value <= fee {
                    return Err(Error::InsufficientFunds(format!(
                        "Insufficient coinbase funds, have {} and need more than {} for the fee",
                        candidate.selected_value, fee
                    )));
                }
                Ok(fee)
            },
        )?;

        let result = ShieldingResult::from_selection(&selection);
        self.executor
            .start(selection, destination, fee.into_u64() as i64, target_height)?;
        Ok(result)
    }

    /// Non-blocking status of an operation
    pub fn operation_status(&self, id: &OperationId) -> Result<OperationState> {
        self.registry.status(id)
    }

    /// Ids of tracked operations, optionally filtered by status
    pub fn list_operations(&self, status: Option<OperationStatus>) -> Vec<OperationId> {
        self.registry.list(status)
    }

    /// Take the result of a finished operation, removing it from the registry
    pub fn operation_result(&self, id: &OperationId) -> Result<Option<OperationState>> {
        self.registry.take_result(id)
    }

    /// Wait for an operation to finish or for `timeout` to pass
    pub async fn wait_for_operation(
        &self,
        id: &OperationId,
        timeout: Duration,
    ) -> Result<OperationState> {
        self.registry.wait(id, timeout).await
    }

    /// Retire locks on outputs that the ledger reports spent
    pub fn prune_spent_locks(&self) -> Result<usize> {
        self.locks.prune_spent()
    }
}
