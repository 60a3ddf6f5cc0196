//! Ledger log service trait definition.
//!
//! A ledger is an append-only unit of durable storage owned by an external,
//! replicated log service. Ledgers are created empty, grow by appends, and
//! become immutable once sealed. The chain manager spreads the bytes of one
//! segment over a sequence of ledgers; this trait is its only window into
//! the log service.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::StorageResult, types::LedgerId};

/// Append-only ledger log.
///
/// # Contract
///
/// - [`create_ledger`](LedgerLog::create_ledger) returns a fresh id, never reused.
/// - [`append`](LedgerLog::append) returns the byte position in the ledger at which
///   the appended bytes start. It fails with
///   [`LedgerSealed`](crate::StorageError::LedgerSealed) once the ledger is sealed.
/// - [`read`](LedgerLog::read) returns exactly `length` bytes or fails with
///   [`LedgerOutOfRange`](crate::StorageError::LedgerOutOfRange).
/// - [`seal`](LedgerLog::seal) is idempotent and returns the final ledger length.
/// - [`delete`](LedgerLog::delete) fails with
///   [`LedgerNotFound`](crate::StorageError::LedgerNotFound) for unknown ids.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use segmentstore_storage::{LedgerLog, MemoryLedgerLog, StorageError};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let log = MemoryLedgerLog::new();
/// let ledger = log.create_ledger().await.unwrap();
///
/// assert_eq!(log.append(ledger, Bytes::from_static(b"hello ")).await.unwrap(), 0);
/// assert_eq!(log.append(ledger, Bytes::from_static(b"world")).await.unwrap(), 6);
/// assert_eq!(log.read(ledger, 6, 5).await.unwrap(), Bytes::from_static(b"world"));
///
/// assert_eq!(log.seal(ledger).await.unwrap(), 11);
/// let rejected = log.append(ledger, Bytes::from_static(b"!")).await;
/// assert!(matches!(rejected, Err(StorageError::LedgerSealed { .. })));
/// # });
/// ```
#[async_trait]
pub trait LedgerLog: Send + Sync {
    /// Creates a new, empty, open ledger.
    #[must_use = "ledger operations may fail and errors must be handled"]
    async fn create_ledger(&self) -> StorageResult<LedgerId>;

    /// Appends `data` to an open ledger and returns its start position.
    #[must_use = "ledger operations may fail and errors must be handled"]
    async fn append(&self, ledger_id: LedgerId, data: Bytes) -> StorageResult<u64>;

    /// Reads `length` bytes starting at `position`.
    #[must_use = "ledger operations may fail and errors must be handled"]
    async fn read(&self, ledger_id: LedgerId, position: u64, length: u64) -> StorageResult<Bytes>;

    /// Seals the ledger and returns its final length.
    #[must_use = "ledger operations may fail and errors must be handled"]
    async fn seal(&self, ledger_id: LedgerId) -> StorageResult<u64>;

    /// Deletes the ledger and releases its storage.
    #[must_use = "ledger operations may fail and errors must be handled"]
    async fn delete(&self, ledger_id: LedgerId) -> StorageResult<()>;
}
