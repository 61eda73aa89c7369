//! Coinbase shielding
//!
//! One [`ShieldingExecutor::start`] call spawns one task that moves through
//! `queued -> executing -> {success, failed}`. A failed operation releases
//! its UTXO locks before it is reported terminal. A successful one keeps
//! them until the ledger reports the inputs spent; the next selection (or
//! [`UtxoLockManager::prune_spent`]) then retires them.

use crate::address::{Receiver, UnifiedAddress};
use crate::amount::Zatoshis;
use crate::keys::KeyDerivationService;
use crate::operation::{OperationId, OperationRegistry};
use crate::pool::Pool;
use crate::selection::{Selection, UtxoLockManager};
use crate::transaction::{BroadcastResult, SignedTransaction, TransactionDraft, TransactionRelay, TxId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use zwallet_params::Network;

/// Method name recorded for shielding operations
pub const SHIELD_COINBASE_METHOD: &str = "z_shieldcoinbase";

/// Resolved shielding destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldingDestination {
    /// Address as given by the caller
    pub address: String,
    /// Receiver that will be paid
    pub receiver: Receiver,
}

impl ShieldingDestination {
    /// Pick the receiver to pay in a unified address.
    ///
    /// Orchard is preferred once active at `target_height`, then Sapling.
    /// Addresses without a usable shielded receiver are rejected.
    pub fn resolve(network: &Network, address: &str, target_height: u32) -> Result<Self> {
        let ua = UnifiedAddress::decode(network, address).map_err(|_| {
            Error::MalformedAddress(format!(
                "Invalid to address, should be a unified address: {}",
                address
            ))
        })?;

        let orchard = ua
            .receiver(Pool::Orchard)
            .filter(|_| network.is_orchard_active(target_height));
        let sapling = ua
            .receiver(Pool::Sapling)
            .filter(|_| network.is_sapling_active(target_height));

        let receiver = orchard.or(sapling).cloned().ok_or_else(|| {
            Error::MalformedAddress(format!(
                "{} has no shielded receiver usable at height {}",
                address, target_height
            ))
        })?;

        Ok(Self {
            address: address.to_string(),
            receiver,
        })
    }

    /// Pool the output lands in
    pub fn pool(&self) -> Pool {
        self.receiver.receiver_type()
    }
}

/// What a shielding request reserved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldingResult {
    /// Operation id to poll
    pub operation_id: OperationId,
    /// UTXOs being shielded
    pub shielding_utxos: usize,
    /// Value being shielded (before fee)
    pub shielding_value: Zatoshis,
    /// Eligible UTXOs left for a later request
    pub remaining_utxos: usize,
    /// Value of the UTXOs left behind
    pub remaining_value: Zatoshis,
}

impl ShieldingResult {
    /// Summarize a selection
    pub fn from_selection(selection: &Selection) -> Self {
        Self {
            operation_id: selection.operation_id.clone(),
            shielding_utxos: selection.selected.len(),
            shielding_value: selection.selected_value,
            remaining_utxos: selection.remaining_count,
            remaining_value: selection.remaining_value,
        }
    }
}

/// Shielding operation executor
#[derive(Clone)]
pub struct ShieldingExecutor {
    keys: Arc<dyn KeyDerivationService>,
    relay: Arc<dyn TransactionRelay>,
    locks: Arc<UtxoLockManager>,
    registry: Arc<OperationRegistry>,
}

impl ShieldingExecutor {
    /// Create new executor
    pub fn new(
        keys: Arc<dyn KeyDerivationService>,
        relay: Arc<dyn TransactionRelay>,
        locks: Arc<UtxoLockManager>,
        registry: Arc<OperationRegistry>,
    ) -> Self {
        Self {
            keys,
            relay,
            locks,
            registry,
        }
    }

    /// Start shielding a locked selection.
    ///
    /// `fee` is validated before anything else; on any synchronous failure
    /// the selection's locks are released and no operation is registered.
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        selection: Selection,
        destination: ShieldingDestination,
        fee: i64,
        target_height: u32,
    ) -> Result<OperationId> {
        let id = selection.operation_id.clone();

        let fee = match Zatoshis::from_i64(fee) {
            Ok(fee) => fee,
            Err(e) => {
                self.locks.release(&id);
                return Err(e);
            }
        };
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.locks.release(&id);
                return Err(Error::OperationFailed(format!("no async runtime: {e}")));
            }
        };

        self.registry.insert(id.clone(), SHIELD_COINBASE_METHOD);
        tracing::info!(
            "Queued {} shielding {} UTXOs ({}) into {} with fee {}",
            id,
            selection.selected.len(),
            selection.selected_value,
            destination.pool(),
            fee
        );

        let executor = self.clone();
        handle.spawn(async move {
            executor.run(selection, destination, fee, target_height).await;
        });
        Ok(id)
    }

    async fn run(
        &self,
        selection: Selection,
        destination: ShieldingDestination,
        fee: Zatoshis,
        target_height: u32,
    ) {
        let id = selection.operation_id.clone();
        self.registry.mark_executing(&id);
        let started = Instant::now();

        let outcome = self.execute(selection, destination, fee, target_height).await;
        match outcome {
            Ok(txid) => {
                tracing::info!("Operation {} broadcast {}", id, txid);
                self.registry.complete(&id, Ok(txid), started.elapsed());
            }
            Err(e) => {
                let released = self.locks.release(&id);
                tracing::warn!(
                    "Operation {} failed ({}), released {} UTXO locks",
                    id,
                    e,
                    released
                );
                self.registry
                    .complete(&id, Err(e.to_string()), started.elapsed());
            }
        }
    }

    async fn execute(
        &self,
        selection: Selection,
        destination: ShieldingDestination,
        fee: Zatoshis,
        target_height: u32,
    ) -> Result<TxId> {
        let draft = TransactionDraft::new(
            selection.selected,
            destination.address,
            destination.receiver,
            fee,
            target_height,
        )?;

        let signatures = draft
            .signing_accounts()
            .into_iter()
            .map(|account| {
                self.keys
                    .sign(account, Pool::Transparent, &draft)
                    .map(|sig| (account, sig))
            })
            .collect::<Result<Vec<_>>>()?;
        let tx = SignedTransaction::new(draft, signatures);

        match self.relay.broadcast(&tx).await? {
            BroadcastResult::Accepted(txid) => Ok(txid),
            BroadcastResult::Rejected(reason) => Err(Error::OperationFailed(reason)),
        }
    }
}
