//! Unified viewing keys
//!
//! A viewing key is a read-only capability covering a subset of an account's
//! pools. It is encoded in the same container format as unified addresses,
//! under the network's viewing key HRP.

use crate::encoding;
use crate::pool::Pool;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use zwallet_params::Network;

/// Read-only key material per pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewingKey {
    keys: BTreeMap<Pool, Vec<u8>>,
}

impl ViewingKey {
    /// Create from per-pool key bytes
    pub fn new(keys: BTreeMap<Pool, Vec<u8>>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::MalformedAddress(
                "viewing key covers no pools".to_string(),
            ));
        }
        Ok(Self { keys })
    }

    /// Pools this key can view
    pub fn pools(&self) -> BTreeSet<Pool> {
        self.keys.keys().copied().collect()
    }

    /// Key bytes for one pool
    pub fn key(&self, pool: Pool) -> Option<&[u8]> {
        self.keys.get(&pool).map(Vec::as_slice)
    }

    /// Iterate over (pool, key bytes)
    pub fn iter(&self) -> impl Iterator<Item = (Pool, &[u8])> {
        self.keys.iter().map(|(p, k)| (*p, k.as_slice()))
    }

    /// Encode under the network's viewing key HRP
    pub fn encode(&self, network: &Network) -> Result<String> {
        let items: Vec<encoding::Item> = self
            .keys
            .iter()
            .map(|(pool, key)| (pool.typecode(), key.clone()))
            .collect();
        encoding::encode(network.unified_viewing_key_hrp, &items)
    }

    /// Decode a key produced by [`ViewingKey::encode`]
    pub fn decode(network: &Network, encoded: &str) -> Result<Self> {
        let items = encoding::decode(network.unified_viewing_key_hrp, encoded)?;
        let mut keys = BTreeMap::new();
        for (typecode, data) in items {
            let pool = Pool::from_typecode(typecode).ok_or_else(|| {
                Error::MalformedAddress(format!("unknown viewing key typecode {typecode:#04x}"))
            })?;
            keys.insert(pool, data);
        }
        Self::new(keys)
    }
}
