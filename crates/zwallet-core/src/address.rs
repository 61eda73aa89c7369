//! Receivers, unified addresses and transparent addresses

use crate::encoding;
use crate::pool::{Pool, ReceiverType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use zwallet_params::Network;

/// One pool-specific receiver inside a unified address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Receiver {
    receiver_type: ReceiverType,
    data: Vec<u8>,
}

impl Receiver {
    /// Create a receiver, checking the raw length for its type
    pub fn new(receiver_type: ReceiverType, data: Vec<u8>) -> Result<Self> {
        if data.len() != receiver_type.receiver_len() {
            return Err(Error::MalformedAddress(format!(
                "{} receiver must be {} bytes, got {}",
                receiver_type,
                receiver_type.receiver_len(),
                data.len()
            )));
        }
        Ok(Self {
            receiver_type,
            data,
        })
    }

    /// Receiver type
    pub fn receiver_type(&self) -> ReceiverType {
        self.receiver_type
    }

    /// Raw receiver bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Transparent address for a P2PKH receiver
    pub fn to_transparent(&self) -> Option<TransparentAddress> {
        match self.receiver_type {
            Pool::Transparent => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&self.data);
                Some(TransparentAddress::from_pubkey_hash(hash))
            }
            _ => None,
        }
    }
}

/// Multi-receiver address.
///
/// Receivers are kept sorted by typecode with at most one receiver per type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnifiedAddress {
    receivers: Vec<Receiver>,
}

impl UnifiedAddress {
    /// Build from receivers in any order.
    ///
    /// Fails on an empty set, on two receivers of the same type, and on a
    /// transparent-only set.
    pub fn from_receivers(mut receivers: Vec<Receiver>) -> Result<Self> {
        if receivers.is_empty() {
            return Err(Error::MalformedAddress(
                "unified address has no receivers".to_string(),
            ));
        }
        receivers.sort_by_key(|r| r.receiver_type.typecode());
        if receivers
            .windows(2)
            .any(|w| w[0].receiver_type == w[1].receiver_type)
        {
            return Err(Error::MalformedAddress(
                "unified address has duplicate receiver types".to_string(),
            ));
        }
        if !receivers.iter().any(|r| r.receiver_type.is_shielded()) {
            return Err(Error::MalformedAddress(
                "unified address must contain a shielded receiver".to_string(),
            ));
        }
        Ok(Self { receivers })
    }

    /// Receivers in typecode order
    pub fn receivers(&self) -> &[Receiver] {
        &self.receivers
    }

    /// Set of receiver types present
    pub fn receiver_types(&self) -> BTreeSet<ReceiverType> {
        self.receivers.iter().map(|r| r.receiver_type).collect()
    }

    /// Receiver of the given type, if present
    pub fn receiver(&self, receiver_type: ReceiverType) -> Option<&Receiver> {
        self.receivers
            .iter()
            .find(|r| r.receiver_type == receiver_type)
    }

    /// Transparent address of the P2PKH receiver, if present
    pub fn transparent(&self) -> Option<TransparentAddress> {
        self.receiver(Pool::Transparent)
            .and_then(Receiver::to_transparent)
    }

    /// Encode under the network's unified address HRP
    pub fn encode(&self, network: &Network) -> Result<String> {
        let items: Vec<encoding::Item> = self
            .receivers
            .iter()
            .map(|r| (r.receiver_type.typecode(), r.data.clone()))
            .collect();
        encoding::encode(network.unified_address_hrp, &items)
    }

    /// Decode an address produced by [`UnifiedAddress::encode`]
    pub fn decode(network: &Network, encoded: &str) -> Result<Self> {
        let items = encoding::decode(network.unified_address_hrp, encoded)?;
        let receivers = items
            .into_iter()
            .map(|(typecode, data)| {
                let receiver_type = Pool::from_typecode(typecode).ok_or_else(|| {
                    Error::MalformedAddress(format!("unknown receiver typecode {typecode:#04x}"))
                })?;
                Receiver::new(receiver_type, data)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_receivers(receivers)
    }
}

/// Transparent P2PKH address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransparentAddress {
    pubkey_hash: [u8; 20],
}

impl TransparentAddress {
    /// Create from a 20-byte public key hash
    pub const fn from_pubkey_hash(pubkey_hash: [u8; 20]) -> Self {
        Self { pubkey_hash }
    }

    /// Public key hash
    pub fn pubkey_hash(&self) -> &[u8; 20] {
        &self.pubkey_hash
    }

    /// Encode as base58check with the network P2PKH prefix
    pub fn encode(&self, network: &Network) -> String {
        let mut payload = Vec::with_capacity(22);
        payload.extend_from_slice(&network.b58_pubkey_address_prefix);
        payload.extend_from_slice(&self.pubkey_hash);
        bs58::encode(payload).with_check().into_string()
    }

    /// Decode a base58check P2PKH address for the network
    pub fn decode(network: &Network, encoded: &str) -> Result<Self> {
        let payload = bs58::decode(encoded)
            .with_check(None)
            .into_vec()
            .map_err(|e| Error::MalformedAddress(format!("Base58 decode failed: {e}")))?;

        if payload.len() != 22 || payload[..2] != network.b58_pubkey_address_prefix {
            return Err(Error::MalformedAddress(format!(
                "'{}' is not a {} P2PKH address",
                encoded, network.name
            )));
        }

        let mut pubkey_hash = [0u8; 20];
        pubkey_hash.copy_from_slice(&payload[2..]);
        Ok(Self { pubkey_hash })
    }
}

/// Any address the wallet accepts at its boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletAddress {
    /// Unified address
    Unified(UnifiedAddress),
    /// Transparent P2PKH address
    Transparent(TransparentAddress),
}

impl WalletAddress {
    /// Decode either a unified or a transparent address
    pub fn decode(network: &Network, encoded: &str) -> Result<Self> {
        if let Ok(ua) = UnifiedAddress::decode(network, encoded) {
            return Ok(WalletAddress::Unified(ua));
        }
        TransparentAddress::decode(network, encoded)
            .map(WalletAddress::Transparent)
            .map_err(|_| Error::MalformedAddress(format!("'{}' is not a valid address", encoded)))
    }
}
