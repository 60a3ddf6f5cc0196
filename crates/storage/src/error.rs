//! Storage error types and result alias.
//!
//! This module defines the errors that the two external collaborators of the
//! tier-2 engine (the metadata store and the ledger log service) can produce.
//! Every collaborator implementation maps its internal failures onto these
//! standardized variants so the chain manager can classify them uniformly.
//!
//! # Error Types
//!
//! - [`StorageError::NotFound`] - Metadata record does not exist
//! - [`StorageError::Conflict`] - Conditional write lost against a concurrent modification
//! - [`StorageError::Connection`] - Network or connection-related failures
//! - [`StorageError::Serialization`] - Record encoding/decoding failures
//! - [`StorageError::Internal`] - Backend-specific internal errors
//! - [`StorageError::Timeout`] - Operation exceeded time limit
//! - [`StorageError::LedgerSealed`] - Append rejected because the ledger is sealed
//! - [`StorageError::LedgerNotFound`] - Ledger id unknown to the log service
//! - [`StorageError::LedgerOutOfRange`] - Read past the appended bytes of a ledger
//!
//! # Example
//!
//! ```
//! use segmentstore_storage::{StorageError, StorageResult};
//!
//! fn lookup(key: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::not_found(key))
//! }
//!
//! assert!(!lookup("segments/a").unwrap_err().is_transient());
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::types::LedgerId;

/// A shared error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for collaborator operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to the metadata store or the ledger
/// log service.
///
/// Errors preserve their source chain via the `#[source]` attribute. Sources
/// are reference counted so the error is cheaply [`Clone`]; the chain cache
/// shares one load failure between every caller waiting on the same key.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested metadata record was not found.
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// Conditional write failed because the stored version differs from the
    /// expected one.
    ///
    /// This is not transient: the caller has to re-read the record and
    /// recompute its mutation before trying again.
    #[error("Version conflict")]
    Conflict,

    /// Connection or network error.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation timed out.
    #[error("Operation timeout")]
    Timeout,

    /// The ledger is sealed (or was fenced by another writer) and no longer
    /// accepts appends.
    #[error("Ledger {ledger_id} is sealed")]
    LedgerSealed {
        /// The sealed ledger.
        ledger_id: LedgerId,
    },

    /// The ledger does not exist in the log service.
    #[error("Ledger {ledger_id} not found")]
    LedgerNotFound {
        /// The missing ledger.
        ledger_id: LedgerId,
    },

    /// A read addressed bytes that were never appended to the ledger.
    #[error(
        "Ledger {ledger_id} read [{position}, {position}+{length}) exceeds {available} appended bytes"
    )]
    LedgerOutOfRange {
        /// The ledger that was read.
        ledger_id: LedgerId,
        /// Requested start position.
        position: u64,
        /// Requested length.
        length: u64,
        /// Number of bytes actually appended to the ledger.
        available: u64,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict() -> Self {
        Self::Conflict
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` if retrying the same call may succeed.
    ///
    /// Only connection failures and timeouts are transient. Conflicts need a
    /// fresh read-modify-write cycle, and ledger state errors never heal by
    /// repeating the call.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }

    /// Returns a short, log-friendly description including the source chain.
    #[must_use]
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            detail.push_str(": ");
            detail.push_str(&err.to_string());
            source = err.source();
        }
        detail
    }
}

/// Validation failure of a configuration builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric field is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// The minimum accepted value.
        min: String,
    },

    /// A duration or size must be strictly positive.
    #[error("{field} must be positive, got {value}")]
    MustBePositive {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A field holds a value that is structurally invalid.
    #[error("{field} is invalid: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::connection(StorageError::connection("refused"), true)]
    #[case::timeout(StorageError::timeout(), true)]
    #[case::conflict(StorageError::conflict(), false)]
    #[case::not_found(StorageError::not_found("k"), false)]
    #[case::internal(StorageError::internal("boom"), false)]
    #[case::serialization(StorageError::serialization("bad json"), false)]
    #[case::sealed(StorageError::LedgerSealed { ledger_id: LedgerId(1) }, false)]
    #[case::missing_ledger(StorageError::LedgerNotFound { ledger_id: LedgerId(1) }, false)]
    fn transient_classification(#[case] err: StorageError, #[case] transient: bool) {
        assert_eq!(err.is_transient(), transient, "{err}");
    }

    #[test]
    fn detail_includes_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let err = StorageError::connection_with_source("metadata store unreachable", io);

        let detail = err.detail();
        assert!(detail.contains("metadata store unreachable"));
        assert!(detail.contains("peer reset"));
    }

    #[test]
    fn clone_shares_source() {
        let io = std::io::Error::other("disk gone");
        let err = StorageError::internal_with_source("ledger read failed", io);
        let cloned = err.clone();

        assert_eq!(err.detail(), cloned.detail());
    }

    #[test]
    fn out_of_range_display() {
        let err = StorageError::LedgerOutOfRange {
            ledger_id: LedgerId(7),
            position: 10,
            length: 5,
            available: 12,
        };
        assert_eq!(err.to_string(), "Ledger 7 read [10, 10+5) exceeds 12 appended bytes");
    }

    #[test]
    fn config_error_display() {
        let err =
            ConfigError::BelowMinimum { field: "max_entries", value: "0".into(), min: "1".into() };
        assert_eq!(err.to_string(), "max_entries must be at least 1, got 0");
    }
}
