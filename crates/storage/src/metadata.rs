//! Metadata store trait definition.
//!
//! The metadata store is the consistent, externally replicated home of every
//! segment chain descriptor. It offers single-key conditional writes only;
//! there is no cross-key transaction. Everything the chain manager does to
//! stay correct under concurrency is expressed as read-modify-write cycles
//! guarded by the record [`Version`].
//!
//! # Semantics
//!
//! | Method | Precondition | Failure |
//! |--------|--------------|---------|
//! | [`read_record`](MetadataStore::read_record) | none | none |
//! | [`write_record`](MetadataStore::write_record) with `None` | key absent | [`Conflict`](StorageError::Conflict) |
//! | [`write_record`](MetadataStore::write_record) with `Some(v)` | stored version is `v` | [`Conflict`](StorageError::Conflict) |
//! | [`delete_record`](MetadataStore::delete_record) | stored version is `v` | [`Conflict`](StorageError::Conflict) / [`NotFound`](StorageError::NotFound) |
//! | [`list_keys`](MetadataStore::list_keys) | none | none |

use async_trait::async_trait;

use crate::{
    error::{StorageError, StorageResult},
    types::{Record, Version},
};

/// Versioned key-value store holding chain descriptors.
///
/// Implementations must be thread-safe and must make every conditional write
/// atomic with respect to other writes of the same key.
///
/// # Example
///
/// ```
/// use segmentstore_storage::{MemoryMetadataStore, MetadataStore, StorageError};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryMetadataStore::new();
///
/// let v1 = store.write_record(b"segments/a", b"{}".to_vec(), None).await.unwrap();
/// let v2 = store.write_record(b"segments/a", b"{\"x\":1}".to_vec(), Some(v1)).await.unwrap();
///
/// // Writing against the stale version is rejected.
/// let stale = store.write_record(b"segments/a", b"{}".to_vec(), Some(v1)).await;
/// assert!(matches!(stale, Err(StorageError::Conflict)));
///
/// store.delete_record(b"segments/a", v2).await.unwrap();
/// assert!(store.read_record(b"segments/a").await.unwrap().is_none());
/// # });
/// ```
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Reads a record and the version it is stored at.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    #[must_use = "metadata operations may fail and errors must be handled"]
    async fn read_record(&self, key: &[u8]) -> StorageResult<Option<Record>>;

    /// Conditionally writes a record and returns its new version.
    ///
    /// - **`expected: None`**: create-if-absent.
    /// - **`expected: Some(version)`**: update-if-unchanged.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`] if the precondition does not hold.
    #[must_use = "metadata operations may fail and errors must be handled"]
    async fn write_record(
        &self,
        key: &[u8],
        value: Vec<u8>,
        expected: Option<Version>,
    ) -> StorageResult<Version>;

    /// Deletes a record if it is still at `expected`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the key does not exist.
    /// - [`StorageError::Conflict`] if the stored version differs.
    #[must_use = "metadata operations may fail and errors must be handled"]
    async fn delete_record(&self, key: &[u8], expected: Version) -> StorageResult<()>;

    /// Lists every key starting with `prefix`, in ascending byte order.
    #[must_use = "metadata operations may fail and errors must be handled"]
    async fn list_keys(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>>;
}

/// Renders a binary key for error messages and logs.
pub(crate) fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

/// Shorthand used by implementations for a missing-key error.
pub(crate) fn missing(key: &[u8]) -> StorageError {
    StorageError::not_found(display_key(key))
}
