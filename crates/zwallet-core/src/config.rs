//! Wallet configuration

use crate::fees::FeeCalculator;
use crate::selection::LimitPolicy;
use crate::Result;
use serde::{Deserialize, Serialize};
use zwallet_params::{
    Network, NetworkType, COINBASE_MATURITY, DEFAULT_MIN_CONFIRMATIONS,
    DEFAULT_SHIELD_UTXO_LIMIT, MAX_TX_SIZE,
};

/// Wallet configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Network
    pub network: NetworkType,
    /// Override of the Orchard activation height (regtest)
    pub orchard_activation_height: Option<u32>,
    /// UTXOs shielded per request when no limit is given
    pub default_utxo_limit: usize,
    /// Serialized transaction size ceiling (bytes)
    pub max_transaction_size: usize,
    /// Confirmations required by balance queries without an explicit minconf
    pub default_min_confirmations: u32,
    /// Confirmations before a coinbase output may be shielded
    pub coinbase_maturity: u32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Mainnet,
            orchard_activation_height: None,
            default_utxo_limit: DEFAULT_SHIELD_UTXO_LIMIT,
            max_transaction_size: MAX_TX_SIZE,
            default_min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            coinbase_maturity: COINBASE_MATURITY,
        }
    }
}

impl WalletConfig {
    /// Defaults for a network
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Load from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Network parameters with any activation override applied
    pub fn network_params(&self) -> Network {
        let network = Network::from_type(self.network);
        match self.orchard_activation_height {
            Some(height) => network.with_orchard_activation(Some(height)),
            None => network,
        }
    }

    /// Fee calculator honouring the size ceiling
    pub fn fee_calculator(&self) -> FeeCalculator {
        FeeCalculator::new().with_max_tx_size(self.max_transaction_size)
    }

    /// Selection caps
    pub fn limit_policy(&self) -> LimitPolicy {
        LimitPolicy {
            default_limit: self.default_utxo_limit,
            max_limit: self.fee_calculator().max_shielding_inputs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WalletConfig::default();
        assert_eq!(config.default_utxo_limit, 50);
        assert_eq!(config.default_min_confirmations, 1);
        assert_eq!(config.limit_policy().resolve(None).unwrap(), 50);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            WalletConfig::from_json(r#"{"network":"regtest","default_utxo_limit":10}"#).unwrap();
        assert_eq!(config.network, NetworkType::Regtest);
        assert_eq!(config.default_utxo_limit, 10);
        assert_eq!(config.max_transaction_size, MAX_TX_SIZE);
        assert_eq!(config.network_params().unified_address_hrp, "uregtest");

        assert!(WalletConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_orchard_override() {
        let config = WalletConfig {
            orchard_activation_height: Some(5),
            ..WalletConfig::for_network(NetworkType::Regtest)
        };
        assert!(config.network_params().is_orchard_active(5));
    }
}
