//! Transaction fee calculation
//!
//! Conventional fees follow ZIP-317: a marginal fee per logical action with a
//! grace allowance of two actions.

use crate::amount::Zatoshis;
use crate::pool::Pool;
use crate::{Error, Result};
use zwallet_params::{
    GRACE_ACTIONS, MARGINAL_FEE, MAX_MONEY, MAX_TX_SIZE, TRANSPARENT_INPUT_SIZE,
};

/// Serialized size budget reserved for everything but transparent inputs:
/// header, one shielded bundle with proofs and the binding signature.
pub const SHIELDED_TX_OVERHEAD: usize = 10_000;

/// P2PKH input size threshold used by ZIP-317 to count transparent actions
const P2PKH_STANDARD_INPUT_SIZE: usize = 150;

/// Orchard bundles are padded to at least two actions
const MIN_ORCHARD_ACTIONS: usize = 2;

/// ZIP-317 fee calculator
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    marginal_fee: u64,
    grace_actions: u64,
    max_tx_size: usize,
}

impl FeeCalculator {
    /// Create new fee calculator with the standard ZIP-317 constants
    pub fn new() -> Self {
        Self {
            marginal_fee: MARGINAL_FEE,
            grace_actions: GRACE_ACTIONS,
            max_tx_size: MAX_TX_SIZE,
        }
    }

    /// Use a different transaction size ceiling
    pub fn with_max_tx_size(mut self, max_tx_size: usize) -> Self {
        self.max_tx_size = max_tx_size;
        self
    }

    /// Logical actions of a transaction shape
    pub fn logical_actions(
        &self,
        transparent_inputs: usize,
        sapling_spends: usize,
        sapling_outputs: usize,
        orchard_actions: usize,
    ) -> usize {
        let transparent_in = (transparent_inputs * TRANSPARENT_INPUT_SIZE)
            .div_ceil(P2PKH_STANDARD_INPUT_SIZE);
        transparent_in + sapling_spends.max(sapling_outputs) + orchard_actions
    }

    /// Conventional fee for a number of logical actions
    pub fn conventional_fee(&self, logical_actions: usize) -> Result<Zatoshis> {
        let actions = (logical_actions as u64).max(self.grace_actions);
        let fee = actions
            .checked_mul(self.marginal_fee)
            .ok_or(Error::AmountOutOfRange)?;
        Zatoshis::from_u64(fee)
    }

    /// Conventional fee for shielding `inputs` transparent outputs into `pool`
    pub fn shielding_fee(&self, inputs: usize, pool: Pool) -> Result<Zatoshis> {
        let actions = match pool {
            Pool::Orchard => self.logical_actions(inputs, 0, 0, MIN_ORCHARD_ACTIONS),
            Pool::Sapling => self.logical_actions(inputs, 0, 1, 0),
            Pool::Transparent => {
                return Err(Error::TransactionBuild(
                    "shielding requires a shielded destination".to_string(),
                ))
            }
        };
        let fee = self.conventional_fee(actions)?;
        tracing::debug!("ZIP-317 fee for {} inputs into {}: {}", inputs, pool, fee);
        Ok(fee)
    }

    /// Most transparent inputs that fit in one shielding transaction
    pub fn max_shielding_inputs(&self) -> usize {
        self.max_tx_size.saturating_sub(SHIELDED_TX_OVERHEAD) / TRANSPARENT_INPUT_SIZE
    }

    /// Validate a caller-supplied fee given in signed zatoshis
    pub fn validate_fee(&self, fee: i64) -> Result<Zatoshis> {
        if fee < 0 || fee as u64 > MAX_MONEY {
            return Err(Error::AmountOutOfRange);
        }
        Zatoshis::from_i64(fee)
    }

    /// Marginal fee per logical action
    pub fn marginal_fee(&self) -> u64 {
        self.marginal_fee
    }

    /// Grace actions
    pub fn grace_actions(&self) -> u64 {
        self.grace_actions
    }
}

impl Default for FeeCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grace_actions_floor() {
        let calculator = FeeCalculator::new();
        assert_eq!(calculator.conventional_fee(0).unwrap().into_u64(), 10_000);
        assert_eq!(calculator.conventional_fee(1).unwrap().into_u64(), 10_000);
        assert_eq!(calculator.conventional_fee(3).unwrap().into_u64(), 15_000);
    }

    #[test]
    fn test_shielding_fee_by_pool() {
        let calculator = FeeCalculator::new();
        // 1 input + 2 padded Orchard actions
        assert_eq!(
            calculator.shielding_fee(1, Pool::Orchard).unwrap().into_u64(),
            15_000
        );
        // 1 input + 1 Sapling output
        assert_eq!(
            calculator.shielding_fee(1, Pool::Sapling).unwrap().into_u64(),
            10_000
        );
        assert_eq!(
            calculator.shielding_fee(50, Pool::Orchard).unwrap().into_u64(),
            260_000
        );
        assert!(calculator.shielding_fee(1, Pool::Transparent).is_err());
    }

    #[test]
    fn test_validate_fee_bounds() {
        let calculator = FeeCalculator::new();
        assert!(matches!(calculator.validate_fee(-1), Err(Error::AmountOutOfRange)));
        assert!(matches!(
            calculator.validate_fee(MAX_MONEY as i64 + 1),
            Err(Error::AmountOutOfRange)
        ));
        assert_eq!(calculator.validate_fee(0).unwrap(), Zatoshis::ZERO);
        assert_eq!(
            calculator.validate_fee(MAX_MONEY as i64).unwrap().into_u64(),
            MAX_MONEY
        );
    }

    #[test]
    fn test_max_shielding_inputs() {
        let calculator = FeeCalculator::new();
        assert_eq!(calculator.max_shielding_inputs(), (2_000_000 - 10_000) / 148);

        let small = FeeCalculator::new().with_max_tx_size(10_000 + 148 * 5);
        assert_eq!(small.max_shielding_inputs(), 5);
    }
}
