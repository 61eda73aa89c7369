//! Shielding transaction drafts, signing output and the relay seam

use crate::account::AccountId;
use crate::address::Receiver;
use crate::amount::Zatoshis;
use crate::ledger::WalletOutput;
use crate::pool::Pool;
use crate::{Error, Result};
use async_trait::async_trait;
use blake2b_simd::Params as Blake2bParams;
use serde::{Deserialize, Serialize};
use std::fmt;

const SIGHASH_PERSONALIZATION: &[u8; 16] = b"ZWallet_TxDigest";
const TXID_PERSONALIZATION: &[u8; 16] = b"ZWallet_TxIdHash";

/// Transaction identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId([u8; 32]);

impl TxId {
    /// Wrap raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

/// The single shielded output of a shielding transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldedOutput {
    /// Encoded destination address as given by the caller
    pub address: String,
    /// Receiver actually paid
    pub receiver: Receiver,
    /// Value after fee
    pub value: Zatoshis,
}

impl ShieldedOutput {
    /// Pool the output lands in
    pub fn pool(&self) -> Pool {
        self.receiver.receiver_type()
    }
}

/// Unsigned shielding transaction
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    /// Transparent inputs
    pub inputs: Vec<WalletOutput>,
    /// Shielded output
    pub output: ShieldedOutput,
    /// Fee paid
    pub fee: Zatoshis,
    /// Height the transaction targets
    pub target_height: u32,
}

impl TransactionDraft {
    /// Build a draft spending every input into `receiver` minus `fee`
    pub fn new(
        inputs: Vec<WalletOutput>,
        address: String,
        receiver: Receiver,
        fee: Zatoshis,
        target_height: u32,
    ) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::TransactionBuild("no inputs".to_string()));
        }
        if !receiver.receiver_type().is_shielded() {
            return Err(Error::TransactionBuild(
                "destination receiver is not shielded".to_string(),
            ));
        }

        let total = Zatoshis::checked_sum(inputs.iter().map(|i| i.value))
            .ok_or(Error::AmountOutOfRange)?;
        let value = total
            .checked_sub(fee)
            .filter(|v| !v.is_zero())
            .ok_or_else(|| {
                Error::InsufficientFunds(format!("inputs {} do not cover fee {}", total, fee))
            })?;

        Ok(Self {
            inputs,
            output: ShieldedOutput {
                address,
                receiver,
                value,
            },
            fee,
            target_height,
        })
    }

    /// Sum of input values
    pub fn input_value(&self) -> Zatoshis {
        self.inputs.iter().map(|i| i.value).sum()
    }

    /// Distinct accounts whose spending authority is required
    pub fn signing_accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self.inputs.iter().filter_map(|i| i.account).collect();
        accounts.sort();
        accounts.dedup();
        accounts
    }

    /// Digest committed to by signatures
    pub fn sighash(&self) -> [u8; 32] {
        let mut state = Blake2bParams::new()
            .hash_length(32)
            .personal(SIGHASH_PERSONALIZATION)
            .to_state();
        for input in &self.inputs {
            state.update(input.outpoint.txid.as_bytes());
            state.update(&input.outpoint.index.to_le_bytes());
            state.update(&input.value.into_u64().to_le_bytes());
        }
        state.update(&self.output.receiver.receiver_type().typecode().to_le_bytes());
        state.update(self.output.receiver.data());
        state.update(&self.output.value.into_u64().to_le_bytes());
        state.update(&self.fee.into_u64().to_le_bytes());
        state.update(&self.target_height.to_le_bytes());

        let mut out = [0u8; 32];
        out.copy_from_slice(state.finalize().as_bytes());
        out
    }
}

/// Signed transaction ready for broadcast
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    /// Transaction ID
    pub txid: TxId,
    /// Draft that was signed
    pub draft: TransactionDraft,
    /// One signature per spending account
    pub signatures: Vec<(AccountId, Vec<u8>)>,
}

impl SignedTransaction {
    /// Attach signatures and derive the txid
    pub fn new(draft: TransactionDraft, signatures: Vec<(AccountId, Vec<u8>)>) -> Self {
        let mut state = Blake2bParams::new()
            .hash_length(32)
            .personal(TXID_PERSONALIZATION)
            .to_state();
        state.update(&draft.sighash());
        for (account, signature) in &signatures {
            state.update(&account.index().to_le_bytes());
            state.update(signature);
        }
        let mut txid = [0u8; 32];
        txid.copy_from_slice(state.finalize().as_bytes());

        Self {
            txid: TxId(txid),
            draft,
            signatures,
        }
    }
}

/// Relay verdict for a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastResult {
    /// Accepted into the mempool
    Accepted(TxId),
    /// Rejected with a reason
    Rejected(String),
}

/// Transaction relay collaborator
#[async_trait]
pub trait TransactionRelay: Send + Sync {
    /// Submit a signed transaction
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<BroadcastResult>;
}
