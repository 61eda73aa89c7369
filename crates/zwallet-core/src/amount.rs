//! Monetary amounts
//!
//! Internal arithmetic is done in zatoshis. At the caller boundary amounts are
//! fixed-point decimals with eight fractional digits.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use zwallet_params::{COIN, MAX_MONEY};

/// Number of fractional digits in the decimal rendering
pub const DECIMALS: usize = 8;

/// Non-negative amount in `0..=MAX_MONEY` zatoshis
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u64", into = "u64")]
pub struct Zatoshis(u64);

impl Zatoshis {
    /// Zero
    pub const ZERO: Zatoshis = Zatoshis(0);

    /// Create from a zatoshi count, rejecting values above `MAX_MONEY`
    pub fn from_u64(value: u64) -> Result<Self> {
        if value > MAX_MONEY {
            return Err(Error::AmountOutOfRange);
        }
        Ok(Self(value))
    }

    /// Create from a signed zatoshi count, rejecting negatives
    pub fn from_i64(value: i64) -> Result<Self> {
        let value = u64::try_from(value).map_err(|_| Error::AmountOutOfRange)?;
        Self::from_u64(value)
    }

    /// Whole coins
    pub fn from_coins(coins: u64) -> Result<Self> {
        let value = coins.checked_mul(COIN).ok_or(Error::AmountOutOfRange)?;
        Self::from_u64(value)
    }

    /// Parse a fixed-point decimal ("10", "0.0001", "21000000.00000000")
    pub fn parse_decimal(s: &str) -> Result<Self> {
        Self::from_i64(parse_zats(s)?)
    }

    /// Zatoshi count
    pub const fn into_u64(self) -> u64 {
        self.0
    }

    /// True if zero
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Add, failing past `MAX_MONEY`
    pub fn checked_add(self, other: Zatoshis) -> Option<Zatoshis> {
        self.0
            .checked_add(other.0)
            .filter(|v| *v <= MAX_MONEY)
            .map(Zatoshis)
    }

    /// Subtract, failing below zero
    pub fn checked_sub(self, other: Zatoshis) -> Option<Zatoshis> {
        self.0.checked_sub(other.0).map(Zatoshis)
    }

    /// Sum an iterator of amounts, failing past `MAX_MONEY`
    pub fn checked_sum<I: IntoIterator<Item = Zatoshis>>(iter: I) -> Option<Zatoshis> {
        iter.into_iter()
            .try_fold(Zatoshis::ZERO, |acc, v| acc.checked_add(v))
    }
}

impl TryFrom<u64> for Zatoshis {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self> {
        Self::from_u64(value)
    }
}

impl From<Zatoshis> for u64 {
    fn from(value: Zatoshis) -> Self {
        value.0
    }
}

impl Sum for Zatoshis {
    /// Saturates at `MAX_MONEY`; use [`Zatoshis::checked_sum`] where overflow matters.
    fn sum<I: Iterator<Item = Zatoshis>>(iter: I) -> Self {
        iter.fold(Zatoshis::ZERO, |acc, v| {
            Zatoshis(acc.0.saturating_add(v.0).min(MAX_MONEY))
        })
    }
}

impl fmt::Display for Zatoshis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / COIN, self.0 % COIN)
    }
}

/// Parse a signed fixed-point decimal into zatoshis.
///
/// Used for caller-supplied fees where a negative value must be reported as
/// out of range rather than as a parse failure. More than eight fractional
/// digits or values that overflow `i64` are rejected.
pub fn parse_zats(s: &str) -> Result<i64> {
    let trimmed = s.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    let valid = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !valid(whole) || !valid(frac) {
        return Err(Error::InvalidAmount(s.to_string()));
    }
    if frac.len() > DECIMALS {
        return Err(Error::InvalidAmount(format!("{} has too many decimal places", s)));
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| Error::AmountOutOfRange)?
    };
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<width$}", frac, width = DECIMALS)
            .parse()
            .map_err(|_| Error::InvalidAmount(s.to_string()))?
    };

    let magnitude = whole
        .checked_mul(COIN as i64)
        .and_then(|v| v.checked_add(frac))
        .ok_or(Error::AmountOutOfRange)?;

    Ok(if negative { -magnitude } else { magnitude })
}
