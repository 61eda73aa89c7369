//! Wallet policy constants
//!
//! These are local policy choices rather than consensus rules.

/// Number of coinbase UTXOs shielded per request when no limit is given
pub const DEFAULT_SHIELD_UTXO_LIMIT: usize = 50;

/// ZIP-317 marginal fee per logical action (zatoshis)
pub const MARGINAL_FEE: u64 = 5_000;

/// ZIP-317 number of logical actions covered by the minimum fee
pub const GRACE_ACTIONS: u64 = 2;

/// Confirmation depth used by balance queries when none is requested
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 1;
