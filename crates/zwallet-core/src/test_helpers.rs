//! Fixtures for integration tests: a regtest wallet over [`MemoryLedger`]
//! with helpers to register addresses and mine coinbase rewards.

use crate::account::{transparent_receiver_address, AccountId, DerivedAddress};
use crate::amount::Zatoshis;
use crate::config::WalletConfig;
use crate::keys::SeedKeyDerivation;
use crate::ledger::{MemoryLedger, OutPoint};
use crate::transaction::{BroadcastResult, SignedTransaction, TransactionRelay};
use crate::wallet::Wallet;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use zwallet_params::NetworkType;

/// Seed shared by fixture wallets
pub const TEST_SEED: [u8; 32] = [42u8; 32];

/// Install a fmt subscriber honouring `RUST_LOG`; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Relay that refuses every transaction with a fixed reason
pub struct RejectingRelay(pub String);

#[async_trait]
impl TransactionRelay for RejectingRelay {
    async fn broadcast(&self, _tx: &SignedTransaction) -> Result<BroadcastResult> {
        Ok(BroadcastResult::Rejected(self.0.clone()))
    }
}

/// Regtest wallet with an inspectable ledger
pub struct TestWallet {
    /// Wallet under test
    pub wallet: Wallet,
    /// Backing ledger
    pub ledger: Arc<MemoryLedger>,
}

impl TestWallet {
    /// Regtest wallet whose ledger also relays
    pub fn regtest() -> Self {
        Self::with_config(WalletConfig::for_network(NetworkType::Regtest))
    }

    /// Wallet with a custom configuration
    pub fn with_config(config: WalletConfig) -> Self {
        let ledger = Arc::new(MemoryLedger::new(0));
        Self::build(config, ledger.clone(), ledger)
    }

    /// Regtest wallet broadcasting through `relay`
    pub fn with_relay(relay: Arc<dyn TransactionRelay>) -> Self {
        let ledger = Arc::new(MemoryLedger::new(0));
        Self::build(WalletConfig::for_network(NetworkType::Regtest), ledger, relay)
    }

    fn build(
        config: WalletConfig,
        ledger: Arc<MemoryLedger>,
        relay: Arc<dyn TransactionRelay>,
    ) -> Self {
        init_tracing();
        let keys = SeedKeyDerivation::from_seed(&TEST_SEED, &config.network_params())
            .expect("fixture seed is valid");
        let wallet = Wallet::new(config, Arc::new(keys), ledger.clone(), relay);
        Self { wallet, ledger }
    }

    /// Make the ledger track a derived address and its transparent receiver
    pub fn register(&self, derived: &DerivedAddress) -> Option<String> {
        self.ledger.register_address(&derived.encoded, derived.account);
        let taddr = transparent_receiver_address(derived, self.wallet.network())?;
        self.ledger.register_address(&taddr, derived.account);
        Some(taddr)
    }

    /// New account with its default address registered.
    ///
    /// Returns the account, the derived address and its transparent address.
    pub fn account_with_address(&self) -> (AccountId, DerivedAddress, String) {
        let account = self.wallet.create_account().expect("account allocation");
        let derived = self
            .wallet
            .get_address_for_account(account, &[], None)
            .expect("default address");
        let taddr = self.register(&derived).expect("default address has a transparent receiver");
        (account, derived, taddr)
    }

    /// Mine `count` coinbase outputs of `value` to `taddr` and mature them
    pub fn fund_coinbase(&self, taddr: &str, count: usize, value: Zatoshis) -> Vec<OutPoint> {
        let outpoints = (0..count)
            .map(|_| self.ledger.mine_coinbase(taddr, value))
            .collect();
        self.ledger
            .mine_blocks(self.wallet.config().coinbase_maturity);
        outpoints
    }
}
