//! In-memory metadata store implementation.
//!
//! This module provides [`MemoryMetadataStore`], an in-memory implementation
//! of [`MetadataStore`] suitable for testing and single-process deployments.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Keys are stored in a [`BTreeMap`] for prefix listing
//! - **Globally unique versions**: Versions come from one increasing counter, so a record that is
//!   deleted and re-created never reuses an older version
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - No replication or distributed features

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    error::{StorageError, StorageResult},
    metadata::{MetadataStore, display_key, missing},
    types::{Record, Version},
};

/// In-memory metadata store using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryMetadataStore` is cheaply cloneable via [`Arc`]. All clones share
/// the same underlying records, which lets tests model several processes
/// talking to one store.
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    records: Arc<RwLock<BTreeMap<Vec<u8>, Record>>>,
    next_version: Arc<AtomicI64>,
}

impl MemoryMetadataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn bump_version(&self) -> Version {
        Version(self.next_version.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl std::fmt::Debug for MemoryMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMetadataStore").field("records", &self.len()).finish()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    #[tracing::instrument(skip_all, fields(key = %display_key(key)))]
    async fn read_record(&self, key: &[u8]) -> StorageResult<Option<Record>> {
        fail_point!("metadata-read", |_| Err(StorageError::connection("injected read failure")));

        Ok(self.records.read().get(key).cloned())
    }

    #[tracing::instrument(skip_all, fields(key = %display_key(key), expected = ?expected))]
    async fn write_record(
        &self,
        key: &[u8],
        value: Vec<u8>,
        expected: Option<Version>,
    ) -> StorageResult<Version> {
        fail_point!("metadata-write", |_| Err(StorageError::connection("injected write failure")));

        let mut records = self.records.write();
        let current = records.get(key).map(|record| record.version);
        if current != expected {
            return Err(StorageError::Conflict);
        }

        let version = self.bump_version();
        records.insert(key.to_vec(), Record::new(Bytes::from(value), version));
        Ok(version)
    }

    #[tracing::instrument(skip_all, fields(key = %display_key(key), expected = %expected))]
    async fn delete_record(&self, key: &[u8], expected: Version) -> StorageResult<()> {
        fail_point!("metadata-delete", |_| Err(StorageError::connection("injected delete failure")));

        let mut records = self.records.write();
        match records.get(key) {
            None => Err(missing(key)),
            Some(record) if record.version != expected => Err(StorageError::Conflict),
            Some(_) => {
                records.remove(key);
                Ok(())
            },
        }
    }

    #[tracing::instrument(skip_all, fields(prefix = %display_key(prefix)))]
    async fn list_keys(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        let records = self.records.read();
        let keys = records
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        Ok(keys)
    }
}
