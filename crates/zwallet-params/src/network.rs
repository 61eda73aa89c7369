//! Network definitions

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Mainnet
    Mainnet,
    /// Testnet
    Testnet,
    /// Regtest (local development)
    Regtest,
}

impl FromStr for NetworkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(NetworkType::Mainnet),
            "test" | "testnet" => Ok(NetworkType::Testnet),
            "regtest" => Ok(NetworkType::Regtest),
            other => Err(Error::InvalidNetwork(other.to_string())),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone)]
pub struct Network {
    /// Network type
    pub network_type: NetworkType,
    /// Human-readable name
    pub name: &'static str,
    /// Coin type (BIP-44)
    pub coin_type: u32,
    /// Bech32m human-readable part for unified addresses
    pub unified_address_hrp: &'static str,
    /// Bech32m human-readable part for unified viewing keys
    pub unified_viewing_key_hrp: &'static str,
    /// Base58Check prefix for P2PKH addresses
    pub b58_pubkey_address_prefix: [u8; 2],
    /// Sapling activation height
    pub sapling_activation_height: u32,
    /// Orchard activation height (if activated)
    pub orchard_activation_height: Option<u32>,
}

impl Network {
    /// Get mainnet parameters
    pub const fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            name: "mainnet",
            coin_type: 133,
            unified_address_hrp: "u",
            unified_viewing_key_hrp: "uview",
            b58_pubkey_address_prefix: [0x1C, 0xB8],
            sapling_activation_height: 419_200,
            orchard_activation_height: Some(1_687_104),
        }
    }

    /// Get testnet parameters
    pub const fn testnet() -> Self {
        Self {
            network_type: NetworkType::Testnet,
            name: "testnet",
            coin_type: 1,
            unified_address_hrp: "utest",
            unified_viewing_key_hrp: "uviewtest",
            b58_pubkey_address_prefix: [0x1D, 0x25],
            sapling_activation_height: 280_000,
            orchard_activation_height: Some(1_842_420),
        }
    }

    /// Get regtest parameters
    pub const fn regtest() -> Self {
        Self {
            network_type: NetworkType::Regtest,
            name: "regtest",
            coin_type: 1,
            unified_address_hrp: "uregtest",
            unified_viewing_key_hrp: "uviewregtest",
            b58_pubkey_address_prefix: [0x1D, 0x25],
            sapling_activation_height: 1,
            orchard_activation_height: Some(210),
        }
    }

    /// Get network by type
    pub const fn from_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Regtest => Self::regtest(),
        }
    }

    /// Check if Sapling is activated at given height
    pub const fn is_sapling_active(&self, height: u32) -> bool {
        height >= self.sapling_activation_height
    }

    /// Check if Orchard is activated at given height
    pub const fn is_orchard_active(&self, height: u32) -> bool {
        if let Some(activation_height) = self.orchard_activation_height {
            height >= activation_height
        } else {
            false
        }
    }

    /// Override the Orchard activation height (regtest `-nuparams` style).
    pub const fn with_orchard_activation(mut self, height: Option<u32>) -> Self {
        self.orchard_activation_height = height;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_params() {
        let net = Network::mainnet();
        assert_eq!(net.network_type, NetworkType::Mainnet);
        assert_eq!(net.unified_address_hrp, "u");
        assert!(net.is_sapling_active(500_000));
        assert!(!net.is_orchard_active(1_000_000));
    }

    #[test]
    fn test_network_from_type() {
        let net = Network::from_type(NetworkType::Regtest);
        assert_eq!(net.network_type, NetworkType::Regtest);
        assert_eq!(net.unified_viewing_key_hrp, "uviewregtest");
    }

    #[test]
    fn test_orchard_activation_override() {
        let net = Network::regtest().with_orchard_activation(None);
        assert!(!net.is_orchard_active(u32::MAX));

        let net = Network::regtest().with_orchard_activation(Some(5));
        assert!(net.is_orchard_active(5));
        assert!(!net.is_orchard_active(4));
    }

    #[test]
    fn test_network_type_parsing() {
        assert_eq!("regtest".parse::<NetworkType>().unwrap(), NetworkType::Regtest);
        assert_eq!("Main".parse::<NetworkType>().unwrap(), NetworkType::Mainnet);
        assert!("signet".parse::<NetworkType>().is_err());

        let json = serde_json::to_string(&NetworkType::Testnet).unwrap();
        assert_eq!(json, "\"testnet\"");
    }
}
