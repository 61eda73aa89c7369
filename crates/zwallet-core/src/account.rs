//! Account manager
//!
//! Owns the dense account index space and turns (account, diversifier index,
//! receiver types) into unified addresses. The default-address cursor of
//! each account is advanced under the manager's write lock so that
//! concurrent default requests never share an index.

use crate::address::UnifiedAddress;
use crate::diversifier::DiversifierIndex;
use crate::keys::KeyDerivationService;
use crate::pool::{resolve_receiver_types, Pool, ReceiverType};
use crate::viewing_key::ViewingKey;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use zwallet_params::{Network, NetworkType};

/// Number of consecutive indices a default-address scan tries before giving up
pub const DEFAULT_SCAN_LIMIT: u32 = 1_000;

/// Wallet-level account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(u32);

impl AccountId {
    /// Account index
    pub const fn index(&self) -> u32 {
        self.0
    }
}

impl From<u32> for AccountId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<AccountId> for u32 {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unified address together with where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    /// Owning account
    pub account: AccountId,
    /// Diversifier index the address was derived at
    pub diversifier_index: DiversifierIndex,
    /// Decoded address
    pub address: UnifiedAddress,
    /// Encoded address string
    pub encoded: String,
    /// When the address was first handed out
    pub created_at: DateTime<Utc>,
}

impl DerivedAddress {
    /// Receiver types present in the address
    pub fn receiver_types(&self) -> BTreeSet<ReceiverType> {
        self.address.receiver_types()
    }
}

/// Source for viewing key export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewingKeySource {
    /// Every pool of an account
    Account(AccountId),
    /// Exactly the pools of one derived address
    Address(String),
}

struct AccountRecord {
    id: AccountId,
    next_index: DiversifierIndex,
    viewing_keys: BTreeMap<Pool, Vec<u8>>,
    addresses: Vec<String>,
}

#[derive(Default)]
struct AccountsState {
    accounts: Vec<AccountRecord>,
    addresses: HashMap<String, DerivedAddress>,
    transparent: HashMap<String, (AccountId, DiversifierIndex)>,
}

impl AccountsState {
    fn record(&self, account: AccountId) -> Result<&AccountRecord> {
        self.accounts
            .get(account.index() as usize)
            .ok_or(Error::UnknownAccount(account.index()))
    }

    fn record_mut(&mut self, account: AccountId) -> Result<&mut AccountRecord> {
        self.accounts
            .get_mut(account.index() as usize)
            .ok_or(Error::UnknownAccount(account.index()))
    }

    fn remember(&mut self, network: &Network, derived: &DerivedAddress) {
        if self.addresses.contains_key(&derived.encoded) {
            return;
        }
        if let Some(taddr) = derived.address.transparent() {
            self.transparent.insert(
                taddr.encode(network),
                (derived.account, derived.diversifier_index),
            );
        }
        if let Some(record) = self.accounts.get_mut(derived.account.index() as usize) {
            record.addresses.push(derived.encoded.clone());
        }
        self.addresses
            .insert(derived.encoded.clone(), derived.clone());
    }
}

/// Account manager
pub struct AccountManager {
    network: Network,
    keys: Arc<dyn KeyDerivationService>,
    state: RwLock<AccountsState>,
    scan_limit: u32,
}

impl AccountManager {
    /// Create an empty account manager
    pub fn new(network: Network, keys: Arc<dyn KeyDerivationService>) -> Self {
        Self {
            network,
            keys,
            state: RwLock::new(AccountsState::default()),
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }

    /// Network the manager encodes addresses for
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Allocate the next sequential account
    pub fn create_account(&self) -> Result<AccountId> {
        let mut state = self.state.write();
        let id = AccountId(u32::try_from(state.accounts.len()).map_err(|_| {
            Error::KeyDerivation("account index space exhausted".to_string())
        })?);

        let mut viewing_keys = BTreeMap::new();
        for pool in Pool::ALL {
            viewing_keys.insert(pool, self.keys.viewing_key(id, pool)?);
        }

        state.accounts.push(AccountRecord {
            id,
            next_index: DiversifierIndex::ZERO,
            viewing_keys,
            addresses: Vec::new(),
        });

        tracing::info!("Created account {}", id);
        Ok(id)
    }

    /// All accounts in index order
    pub fn list_accounts(&self) -> Vec<AccountId> {
        self.state.read().accounts.iter().map(|r| r.id).collect()
    }

    /// Fail with [`Error::UnknownAccount`] if the account was never created
    pub fn ensure_account(&self, account: AccountId) -> Result<()> {
        self.state.read().record(account).map(|_| ())
    }

    /// Derive a unified address.
    ///
    /// With an explicit index exactly that address is derived, failing as a
    /// whole if any requested receiver type has no receiver there. Without
    /// one, indices are scanned upward from the account's cursor and the
    /// cursor moves past the first index where every requested type derives.
    pub fn derive_address(
        &self,
        account: AccountId,
        requested: &[ReceiverType],
        index: Option<DiversifierIndex>,
    ) -> Result<DerivedAddress> {
        let types = resolve_receiver_types(requested)?;

        match index {
            Some(index) => {
                self.ensure_account(account)?;
                let derived = self.derive_at(account, &types, index)?;
                self.state.write().remember(&self.network, &derived);
                tracing::debug!(
                    "Derived address for account {} at explicit index {}",
                    account,
                    index
                );
                Ok(derived)
            }
            None => self.derive_default(account, &types),
        }
    }

    fn derive_default(
        &self,
        account: AccountId,
        types: &BTreeSet<ReceiverType>,
    ) -> Result<DerivedAddress> {
        let mut state = self.state.write();
        let start = state.record(account)?.next_index;

        let mut candidate = start;
        for _ in 0..self.scan_limit {
            match self.derive_at(account, types, candidate) {
                Ok(derived) => {
                    let next = candidate.next().ok_or_else(|| {
                        Error::KeyDerivation("diversifier index space exhausted".to_string())
                    })?;
                    state.record_mut(account)?.next_index = next;
                    state.remember(&self.network, &derived);
                    tracing::info!(
                        "Derived default address for account {} at index {}",
                        account,
                        candidate
                    );
                    return Ok(derived);
                }
                Err(Error::InvalidDiversifier { index, reason }) => {
                    tracing::debug!("Skipping diversifier index {}: {}", index, reason);
                }
                Err(e) => return Err(e),
            }
            candidate = candidate.next().ok_or_else(|| {
                Error::KeyDerivation("diversifier index space exhausted".to_string())
            })?;
        }

        Err(Error::KeyDerivation(format!(
            "no valid diversifier within {} indices of {}",
            self.scan_limit, start
        )))
    }

    fn derive_at(
        &self,
        account: AccountId,
        types: &BTreeSet<ReceiverType>,
        index: DiversifierIndex,
    ) -> Result<DerivedAddress> {
        let receivers = types
            .iter()
            .map(|pool| self.keys.derive_receiver(account, *pool, index))
            .collect::<Result<Vec<_>>>()?;
        let address = UnifiedAddress::from_receivers(receivers)?;
        let encoded = address.encode(&self.network)?;
        Ok(DerivedAddress {
            account,
            diversifier_index: index,
            address,
            encoded,
            created_at: Utc::now(),
        })
    }

    /// Decode the receivers of a unified address
    pub fn list_receivers(&self, encoded: &str) -> Result<UnifiedAddress> {
        UnifiedAddress::decode(&self.network, encoded)
    }

    /// Addresses handed out for an account, in derivation order
    pub fn list_addresses(&self, account: AccountId) -> Result<Vec<DerivedAddress>> {
        let state = self.state.read();
        let record = state.record(account)?;
        Ok(record
            .addresses
            .iter()
            .filter_map(|a| state.addresses.get(a).cloned())
            .collect())
    }

    /// Look up a derived unified address
    pub fn find_address(&self, encoded: &str) -> Option<DerivedAddress> {
        self.state.read().addresses.get(encoded).cloned()
    }

    /// Look up the owner of a transparent receiver address
    pub fn find_transparent(&self, encoded: &str) -> Option<(AccountId, DiversifierIndex)> {
        self.state.read().transparent.get(encoded).copied()
    }

    /// Export a read-only viewing key
    pub fn export_viewing_key(&self, source: &ViewingKeySource) -> Result<ViewingKey> {
        let state = self.state.read();
        let (account, pools): (AccountId, BTreeSet<Pool>) = match source {
            ViewingKeySource::Account(account) => (*account, Pool::ALL.into_iter().collect()),
            ViewingKeySource::Address(encoded) => {
                if let Some(derived) = state.addresses.get(encoded) {
                    (derived.account, derived.receiver_types())
                } else if let Some((account, _)) = state.transparent.get(encoded) {
                    (*account, BTreeSet::from([Pool::Transparent]))
                } else {
                    return Err(Error::UnknownAddress(encoded.clone()));
                }
            }
        };

        let record = state.record(account)?;
        let keys = pools
            .into_iter()
            .filter_map(|pool| record.viewing_keys.get(&pool).map(|k| (pool, k.clone())))
            .collect();
        ViewingKey::new(keys)
    }

    /// Find the account a viewing key was exported from
    pub fn resolve_viewing_key(&self, vk: &ViewingKey) -> Result<(AccountId, BTreeSet<Pool>)> {
        let state = self.state.read();
        state
            .accounts
            .iter()
            .find(|record| {
                vk.iter()
                    .all(|(pool, key)| record.viewing_keys.get(&pool).map(Vec::as_slice) == Some(key))
            })
            .map(|record| (record.id, vk.pools()))
            .ok_or_else(|| {
                Error::UnknownAddress("viewing key does not belong to this wallet".to_string())
            })
    }

    /// Capture every account, cursor and derived address
    pub fn snapshot(&self) -> AccountsSnapshot {
        let state = self.state.read();
        let accounts = state
            .accounts
            .iter()
            .map(|record| AccountSnapshot {
                id: record.id,
                next_index: record.next_index,
                viewing_keys: record
                    .viewing_keys
                    .iter()
                    .map(|(pool, key)| (*pool, hex::encode(key)))
                    .collect(),
                addresses: record
                    .addresses
                    .iter()
                    .filter_map(|a| state.addresses.get(a))
                    .map(|derived| AddressSnapshot {
                        diversifier_index: derived.diversifier_index,
                        address: derived.encoded.clone(),
                        created_at: derived.created_at,
                    })
                    .collect(),
            })
            .collect();

        AccountsSnapshot {
            network: self.network.network_type,
            accounts,
        }
    }

    /// Rebuild a manager from a snapshot.
    ///
    /// The key derivation service must be the one the snapshot was taken
    /// with; every stored viewing key is checked against it.
    pub fn restore(
        network: Network,
        keys: Arc<dyn KeyDerivationService>,
        snapshot: AccountsSnapshot,
    ) -> Result<Self> {
        if snapshot.network != network.network_type {
            return Err(Error::Storage(format!(
                "snapshot is for {:?}, wallet is {:?}",
                snapshot.network, network.network_type
            )));
        }

        let manager = Self::new(network, keys);
        {
            let mut state = manager.state.write();
            for (position, account) in snapshot.accounts.into_iter().enumerate() {
                if account.id.index() as usize != position {
                    return Err(Error::Storage(format!(
                        "account {} found at position {}",
                        account.id, position
                    )));
                }

                let mut viewing_keys = BTreeMap::new();
                for (pool, key_hex) in account.viewing_keys {
                    let key = hex::decode(&key_hex)
                        .map_err(|e| Error::Storage(format!("viewing key for {pool}: {e}")))?;
                    if manager.keys.viewing_key(account.id, pool)? != key {
                        return Err(Error::Storage(format!(
                            "{} viewing key of account {} does not match the seed",
                            pool, account.id
                        )));
                    }
                    viewing_keys.insert(pool, key);
                }

                state.accounts.push(AccountRecord {
                    id: account.id,
                    next_index: account.next_index,
                    viewing_keys,
                    addresses: Vec::new(),
                });

                for stored in account.addresses {
                    let address = UnifiedAddress::decode(&manager.network, &stored.address)?;
                    let derived = DerivedAddress {
                        account: account.id,
                        diversifier_index: stored.diversifier_index,
                        address,
                        encoded: stored.address,
                        created_at: stored.created_at,
                    };
                    state.remember(&manager.network, &derived);
                }
            }
        }

        tracing::info!(
            "Restored {} accounts",
            manager.state.read().accounts.len()
        );
        Ok(manager)
    }
}

/// Serializable account manager state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountsSnapshot {
    /// Network the addresses are encoded for
    pub network: NetworkType,
    /// Accounts in index order
    pub accounts: Vec<AccountSnapshot>,
}

/// Serialized account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account id
    pub id: AccountId,
    /// Default-address cursor
    pub next_index: DiversifierIndex,
    /// Hex-encoded viewing key per pool
    pub viewing_keys: BTreeMap<Pool, String>,
    /// Derived addresses in derivation order
    pub addresses: Vec<AddressSnapshot>,
}

/// Serialized derived address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    /// Diversifier index
    pub diversifier_index: DiversifierIndex,
    /// Encoded unified address
    pub address: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl AccountsSnapshot {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Transparent address of a derived unified address, encoded for `network`
pub fn transparent_receiver_address(derived: &DerivedAddress, network: &Network) -> Option<String> {
    derived
        .address
        .transparent()
        .map(|t| t.encode(network))
}
