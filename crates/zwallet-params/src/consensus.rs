//! Consensus parameters

/// Number of zatoshis in one coin
pub const COIN: u64 = 100_000_000;

/// Maximum supply (zatoshis)
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

/// Maximum serialized transaction size after Sapling activation (bytes)
pub const MAX_TX_SIZE: usize = 2_000_000;

/// Conservative serialized size of one signed P2PKH input (bytes)
pub const TRANSPARENT_INPUT_SIZE: usize = 148;

/// Confirmations required before a coinbase output may be spent
pub const COINBASE_MATURITY: u32 = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_bounds() {
        assert_eq!(MAX_MONEY, 2_100_000_000_000_000);
        assert_eq!(MAX_MONEY % COIN, 0);
    }
}
