//! Error types for the ledger-chain segment storage.
//!
//! [`SegmentError`] is the taxonomy surfaced to callers of
//! [`SegmentStorage`](crate::SegmentStorage). Collaborator failures arrive as
//! [`StorageError`] and are wrapped unchanged so their transient/permanent
//! classification survives.

use segmentstore_storage::StorageError;
use thiserror::Error;

/// Result type alias for segment storage operations.
pub type Result<T> = std::result::Result<T, SegmentError>;

/// Errors returned by segment storage operations.
///
/// No variant is fatal to the process; every failure is scoped to one
/// segment and recoverable by re-issuing the operation (after re-opening the
/// segment for [`FencedOut`](SegmentError::FencedOut), or after re-querying
/// its length for [`BadOffset`](SegmentError::BadOffset)).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SegmentError {
    /// No chain descriptor exists for the segment.
    #[error("Segment '{name}' does not exist")]
    NotFound {
        /// Segment name.
        name: String,
    },

    /// A segment with this name already exists.
    #[error("Segment '{name}' already exists")]
    Exists {
        /// Segment name.
        name: String,
    },

    /// The segment is sealed and accepts no further writes.
    #[error("Segment '{name}' is sealed")]
    Sealed {
        /// Segment name.
        name: String,
    },

    /// The operation requires a sealed segment.
    #[error("Segment '{name}' is not sealed")]
    NotSealed {
        /// Segment name.
        name: String,
    },

    /// The caller's write token belongs to a superseded epoch.
    #[error("Segment '{name}' write handle at epoch {epoch} was fenced out by epoch {current_epoch}")]
    FencedOut {
        /// Segment name.
        name: String,
        /// Epoch carried by the caller.
        epoch: u64,
        /// Epoch currently recorded for the segment.
        current_epoch: u64,
    },

    /// The write or concat offset does not equal the current segment length.
    #[error("Segment '{name}' bad offset: expected {expected}, got {actual}")]
    BadOffset {
        /// Segment name.
        name: String,
        /// Current segment length.
        expected: u64,
        /// Offset supplied by the caller.
        actual: u64,
    },

    /// Version conflicts persisted past the retry bound.
    #[error("Segment '{name}' was modified concurrently ({attempts} attempts)")]
    ConcurrentModification {
        /// Segment name.
        name: String,
        /// Number of read-modify-write attempts made.
        attempts: u32,
    },

    /// Buffer arguments do not describe a valid region.
    #[error("Index out of bounds: {message}")]
    OutOfBounds {
        /// What was out of bounds.
        message: String,
    },

    /// A read addressed bytes beyond the segment length.
    #[error("Segment '{name}' read [{offset}, {offset}+{length}) is beyond length {segment_length}")]
    OutOfRange {
        /// Segment name.
        name: String,
        /// Requested offset.
        offset: u64,
        /// Requested length.
        length: u64,
        /// Current segment length.
        segment_length: u64,
    },

    /// A mutating operation was issued through a read-only handle.
    #[error("Handle for segment '{name}' is read-only")]
    ReadOnlyHandle {
        /// Segment name.
        name: String,
    },

    /// An argument violates an operation precondition.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the violation.
        message: String,
    },

    /// A stored chain descriptor failed to decode or violates its invariants.
    #[error("Segment '{name}' metadata is corrupt: {message}")]
    Corrupt {
        /// Segment name.
        name: String,
        /// Description of the corruption.
        message: String,
    },

    /// The storage has not been initialized with a container epoch.
    #[error("Storage is not initialized")]
    NotInitialized,

    /// The storage has been closed.
    #[error("Storage is closed")]
    Closed,

    /// The operation did not complete within its time limit.
    ///
    /// The underlying work keeps running and its outcome is discarded.
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Name of the abandoned operation.
        operation: &'static str,
        /// The time limit in milliseconds.
        timeout_ms: u64,
    },

    /// Failure reported by the metadata store or the ledger log.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SegmentError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates a new `Sealed` error.
    #[must_use]
    pub fn sealed(name: impl Into<String>) -> Self {
        Self::Sealed { name: name.into() }
    }

    /// Creates a new `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Creates a new `OutOfBounds` error.
    #[must_use]
    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        Self::OutOfBounds { message: message.into() }
    }

    /// Creates a new `Corrupt` error.
    #[must_use]
    pub fn corrupt(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt { name: name.into(), message: message.into() }
    }

    /// Returns `true` if re-issuing the same operation from the top may
    /// succeed without any change on the caller's side.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrentModification { .. } | Self::Timeout { .. } => true,
            Self::Storage(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if this is a version conflict from the metadata store.
    pub(crate) fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Conflict))
    }
}
