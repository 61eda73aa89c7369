//! Diversifier indices
//!
//! A diversifier index selects one receiver-derivation instance inside an
//! account. Indices are 11 bytes wide, matching the unified address
//! diversifier space.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a diversifier index in bytes
pub const DIVERSIFIER_INDEX_BYTES: usize = 11;

/// Largest representable diversifier index (2^88 - 1)
pub const MAX_DIVERSIFIER_INDEX: u128 = (1u128 << (8 * DIVERSIFIER_INDEX_BYTES)) - 1;

/// Highest index for which a transparent (non-hardened BIP-32 child) receiver exists
pub const MAX_TRANSPARENT_CHILD_INDEX: u128 = (1u128 << 31) - 1;

/// Diversifier index for receiver derivation
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u128", into = "u128")]
pub struct DiversifierIndex(u128);

impl DiversifierIndex {
    /// Index zero
    pub const ZERO: DiversifierIndex = DiversifierIndex(0);

    /// Create new diversifier index, rejecting values beyond 88 bits
    pub fn new(index: u128) -> Result<Self> {
        if index > MAX_DIVERSIFIER_INDEX {
            return Err(Error::KeyDerivation(format!(
                "diversifier index {} exceeds the 88-bit index space",
                index
            )));
        }
        Ok(Self(index))
    }

    /// Get inner value
    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    /// Get next diversifier index, `None` once the index space is exhausted
    pub fn next(&self) -> Option<Self> {
        if self.0 >= MAX_DIVERSIFIER_INDEX {
            None
        } else {
            Some(Self(self.0 + 1))
        }
    }

    /// True if this index lies in the non-hardened transparent child range
    pub const fn is_transparent_child(&self) -> bool {
        self.0 <= MAX_TRANSPARENT_CHILD_INDEX
    }

    /// Serialize to bytes (little-endian)
    pub fn to_bytes(&self) -> [u8; DIVERSIFIER_INDEX_BYTES] {
        let mut out = [0u8; DIVERSIFIER_INDEX_BYTES];
        out.copy_from_slice(&self.0.to_le_bytes()[..DIVERSIFIER_INDEX_BYTES]);
        out
    }

    /// Deserialize from bytes (little-endian)
    pub fn from_bytes(bytes: [u8; DIVERSIFIER_INDEX_BYTES]) -> Self {
        let mut wide = [0u8; 16];
        wide[..DIVERSIFIER_INDEX_BYTES].copy_from_slice(&bytes);
        Self(u128::from_le_bytes(wide))
    }
}

impl From<u32> for DiversifierIndex {
    fn from(value: u32) -> Self {
        Self(u128::from(value))
    }
}

impl From<u64> for DiversifierIndex {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl TryFrom<u128> for DiversifierIndex {
    type Error = Error;

    fn try_from(value: u128) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DiversifierIndex> for u128 {
    fn from(value: DiversifierIndex) -> Self {
        value.0
    }
}

impl fmt::Display for DiversifierIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diversifier_index() {
        let idx = DiversifierIndex::from(5u32);
        assert_eq!(idx.as_u128(), 5);
        assert_eq!(idx.next().unwrap().as_u128(), 6);
        assert_eq!(DiversifierIndex::default(), DiversifierIndex::ZERO);
    }

    #[test]
    fn test_index_space_bounds() {
        let max = DiversifierIndex::new(MAX_DIVERSIFIER_INDEX).unwrap();
        assert!(max.next().is_none());
        assert!(DiversifierIndex::new(MAX_DIVERSIFIER_INDEX + 1).is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let idx = DiversifierIndex::new(0x0102_0304_0506_0708_090a).unwrap();
        let bytes = idx.to_bytes();
        assert_eq!(bytes[0], 0x0a);
        assert_eq!(DiversifierIndex::from_bytes(bytes), idx);
    }

    #[test]
    fn test_transparent_child_range() {
        assert!(DiversifierIndex::from(0x7fff_ffffu32).is_transparent_child());
        assert!(!DiversifierIndex::from(0x8000_0000u32).is_transparent_child());
    }
}
