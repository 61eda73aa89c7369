//! Error types for zwallet core
//!
//! Every failure surfaced to callers carries its reason text verbatim.

use std::fmt;

use crate::diversifier::DiversifierIndex;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// zwallet core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Derivation impossible at the requested diversifier index
    #[error("no address at diversifier index {index}: {reason}")]
    InvalidDiversifier {
        /// Index that failed
        index: DiversifierIndex,
        /// Why the key derivation service rejected it
        reason: String,
    },

    /// Address or viewing key failed to decode
    #[error("Invalid address: {0}")]
    MalformedAddress(String),

    /// No local authority for the address or viewing key
    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    /// Receiver type request that cannot be satisfied
    #[error("Invalid receiver types: {0}")]
    InvalidReceiverTypes(String),

    /// Amount negative or above the maximum money supply
    #[error("Amount out of range")]
    AmountOutOfRange,

    /// Amount string that is not a fixed-point decimal
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Selection cap rejected
    #[error("{0}")]
    InvalidLimit(String),

    /// Selector yields nothing spendable
    #[error("{0}")]
    NoEligibleSource(String),

    /// Selected value does not cover the fee
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Asynchronous build or broadcast failure
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// Account index never allocated
    #[error("Unknown account: {0}")]
    UnknownAccount(u32),

    /// Operation id not present in the registry
    #[error("No operation with id {0}")]
    UnknownOperation(String),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Invalid seed or mnemonic
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    /// Transaction building error
    #[error("Transaction build error: {0}")]
    TransactionBuild(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if error is a user-facing error (vs internal error)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidDiversifier { .. }
                | Error::MalformedAddress(_)
                | Error::UnknownAddress(_)
                | Error::InvalidReceiverTypes(_)
                | Error::AmountOutOfRange
                | Error::InvalidAmount(_)
                | Error::InvalidLimit(_)
                | Error::NoEligibleSource(_)
                | Error::InsufficientFunds(_)
                | Error::UnknownAccount(_)
                | Error::UnknownOperation(_)
                | Error::InvalidSeed(_)
        )
    }

    /// True for validation failures that are detected before any lock or
    /// derivation side effect.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Error::AmountOutOfRange
                | Error::InvalidAmount(_)
                | Error::InvalidLimit(_)
                | Error::NoEligibleSource(_)
                | Error::InsufficientFunds(_)
                | Error::MalformedAddress(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::AmountOutOfRange | Error::InvalidAmount(_) | Error::InsufficientFunds(_) => {
                ErrorCategory::Amount
            }
            Error::InvalidDiversifier { .. }
            | Error::MalformedAddress(_)
            | Error::UnknownAddress(_)
            | Error::InvalidReceiverTypes(_) => ErrorCategory::Address,
            Error::InvalidLimit(_) | Error::NoEligibleSource(_) => ErrorCategory::Selection,
            Error::OperationFailed(_) | Error::UnknownOperation(_) | Error::TransactionBuild(_) => {
                ErrorCategory::Operation
            }
            Error::UnknownAccount(_) => ErrorCategory::Account,
            Error::KeyDerivation(_) | Error::InvalidSeed(_) => ErrorCategory::Keys,
            Error::Storage(_) => ErrorCategory::Storage,
            Error::Serialization(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Amount-related errors
    Amount,
    /// Address-related errors
    Address,
    /// UTXO selection errors
    Selection,
    /// Asynchronous operation errors
    Operation,
    /// Account errors
    Account,
    /// Key-related errors
    Keys,
    /// Storage-related errors
    Storage,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Amount => write!(f, "Amount"),
            ErrorCategory::Address => write!(f, "Address"),
            ErrorCategory::Selection => write!(f, "Selection"),
            ErrorCategory::Operation => write!(f, "Operation"),
            ErrorCategory::Account => write!(f, "Account"),
            ErrorCategory::Keys => write!(f, "Keys"),
            ErrorCategory::Storage => write!(f, "Storage"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbatim_messages() {
        assert_eq!(Error::AmountOutOfRange.to_string(), "Amount out of range");
        assert_eq!(
            Error::InvalidLimit("Limit on maximum number of utxos cannot be negative".into())
                .to_string(),
            "Limit on maximum number of utxos cannot be negative"
        );

        let err = Error::InvalidDiversifier {
            index: DiversifierIndex::from(0u32),
            reason: "invalid Sapling diversifier".into(),
        };
        assert!(err.to_string().contains("no address at diversifier index 0"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::AmountOutOfRange.category(), ErrorCategory::Amount);
        assert_eq!(
            Error::NoEligibleSource("x".into()).category(),
            ErrorCategory::Selection
        );
        assert_eq!(Error::UnknownAccount(3).category(), ErrorCategory::Account);
        assert!(Error::InvalidLimit("x".into()).is_validation_error());
        assert!(!Error::OperationFailed("x".into()).is_validation_error());
        assert!(!Error::Storage("x".into()).is_user_error());
    }
}
