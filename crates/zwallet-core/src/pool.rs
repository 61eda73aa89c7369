//! Value pools and receiver types

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Note-accounting pool.
///
/// Ordering follows the unified address typecode ordering, so sorted
/// collections of pools list Transparent first and Orchard last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    /// Legacy transparent pool (P2PKH)
    Transparent,
    /// Sapling shielded pool
    Sapling,
    /// Orchard shielded pool
    Orchard,
}

/// Receiver types share the pool variants one-to-one.
pub type ReceiverType = Pool;

impl Pool {
    /// All pools in typecode order
    pub const ALL: [Pool; 3] = [Pool::Transparent, Pool::Sapling, Pool::Orchard];

    /// Unified container typecode
    pub const fn typecode(self) -> u32 {
        match self {
            Pool::Transparent => 0x00,
            Pool::Sapling => 0x02,
            Pool::Orchard => 0x03,
        }
    }

    /// Look up a pool by unified container typecode
    pub const fn from_typecode(typecode: u32) -> Option<Self> {
        match typecode {
            0x00 => Some(Pool::Transparent),
            0x02 => Some(Pool::Sapling),
            0x03 => Some(Pool::Orchard),
            _ => None,
        }
    }

    /// Raw receiver length in bytes
    pub const fn receiver_len(self) -> usize {
        match self {
            Pool::Transparent => 20,
            Pool::Sapling | Pool::Orchard => 43,
        }
    }

    /// True for Sapling and Orchard
    pub const fn is_shielded(self) -> bool {
        !matches!(self, Pool::Transparent)
    }

    /// Lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Pool::Transparent => "transparent",
            Pool::Sapling => "sapling",
            Pool::Orchard => "orchard",
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pool {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "p2pkh" | "transparent" => Ok(Pool::Transparent),
            "sapling" => Ok(Pool::Sapling),
            "orchard" => Ok(Pool::Orchard),
            other => Err(Error::InvalidReceiverTypes(format!(
                "unknown receiver type '{}'",
                other
            ))),
        }
    }
}

/// Resolve a receiver-type request.
///
/// An empty request selects every pool. A request naming only Transparent is
/// rejected because a unified address must carry a shielded receiver.
pub fn resolve_receiver_types(requested: &[ReceiverType]) -> Result<BTreeSet<ReceiverType>> {
    let types: BTreeSet<ReceiverType> = if requested.is_empty() {
        Pool::ALL.into_iter().collect()
    } else {
        requested.iter().copied().collect()
    };

    if !types.iter().any(|t| t.is_shielded()) {
        return Err(Error::InvalidReceiverTypes(
            "at least one shielded receiver type is required".to_string(),
        ));
    }
    Ok(types)
}
