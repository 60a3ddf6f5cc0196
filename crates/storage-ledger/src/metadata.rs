//! Versioned chain descriptor access.
//!
//! [`ChainMetadata`] is the only path between the chain manager and the
//! metadata store. It owns key encoding, descriptor (de)serialization, the
//! read-through cache and the write-through protocol: a store write must
//! succeed before the cache is updated, and a failed write invalidates the
//! cached entry so the next reader reloads authoritative state.

use std::sync::Arc;

use segmentstore_storage::{MetadataStore, StorageError};
use tracing::{debug, trace, warn};

use crate::{
    cache::ChainCache,
    config::{CasRetryConfig, LedgerStorageConfig, RetryConfig},
    descriptor::ChainDescriptor,
    error::{Result, SegmentError},
    keys,
    retry::{with_cas_retry, with_retry},
};

/// Outcome of a read-modify-write closure passed to
/// [`ChainMetadata::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mutation {
    /// Persist the mutated descriptor.
    Commit,
    /// Leave the stored descriptor untouched.
    Unchanged,
}

/// Segment names found under the namespace by
/// [`ChainMetadata::list_names`].
#[derive(Debug, Default)]
pub(crate) struct NameListing {
    /// Decoded names, in name order.
    pub(crate) names: Vec<String>,
    /// Keys directly under the namespace that do not decode to a name.
    pub(crate) undecodable: usize,
}

pub(crate) struct ChainMetadata {
    store: Arc<dyn MetadataStore>,
    cache: ChainCache,
    namespace: String,
    retry: RetryConfig,
    cas_retry: CasRetryConfig,
}

impl ChainMetadata {
    pub(crate) fn new(config: &LedgerStorageConfig, store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            cache: ChainCache::new(config.cache()),
            namespace: config.namespace().to_owned(),
            retry: config.retry().clone(),
            cas_retry: config.cas_retry().clone(),
        }
    }

    pub(crate) fn cache(&self) -> &ChainCache {
        &self.cache
    }

    /// Reads the stored descriptor of `name`, bypassing the cache.
    ///
    /// Returns `Ok(None)` if no record exists.
    pub(crate) async fn fetch(&self, name: &str) -> Result<Option<ChainDescriptor>> {
        let key = keys::chain_key(&self.namespace, name);
        let record = with_retry(&self.retry, "read_record", || self.store.read_record(&key)).await?;
        record
            .map(|record| ChainDescriptor::decode(name, &record.value, record.version))
            .transpose()
    }

    /// Returns the descriptor of `name`, from the cache when possible.
    pub(crate) async fn load(&self, name: &str) -> Result<Arc<ChainDescriptor>> {
        self.cache
            .get_or_load(name, async {
                self.fetch(name).await?.ok_or_else(|| SegmentError::not_found(name))
            })
            .await
    }

    /// Reloads the descriptor of `name` from the store and refreshes the cache.
    pub(crate) async fn load_fresh(&self, name: &str) -> Result<Arc<ChainDescriptor>> {
        match self.fetch(name).await? {
            Some(descriptor) => {
                let descriptor = Arc::new(descriptor);
                self.cache.put(Arc::clone(&descriptor)).await;
                Ok(descriptor)
            },
            None => {
                self.cache.invalidate(name).await;
                Err(SegmentError::not_found(name))
            },
        }
    }

    /// Persists a new descriptor; fails with `Exists` if the name is taken.
    pub(crate) async fn insert(&self, mut descriptor: ChainDescriptor) -> Result<Arc<ChainDescriptor>> {
        let key = keys::chain_key(&self.namespace, &descriptor.name);
        let value = descriptor.encode()?;
        let written =
            with_retry(&self.retry, "write_record", || self.store.write_record(&key, value.clone(), None))
                .await;
        match written {
            Ok(version) => {
                descriptor.version = Some(version);
                let descriptor = Arc::new(descriptor);
                self.cache.put(Arc::clone(&descriptor)).await;
                Ok(descriptor)
            },
            Err(StorageError::Conflict) => Err(SegmentError::Exists { name: descriptor.name }),
            Err(err) => {
                self.cache.invalidate(&descriptor.name).await;
                Err(err.into())
            },
        }
    }

    /// Conditionally writes `descriptor` over the version it was read at.
    ///
    /// A version mismatch surfaces as a conflict for the caller's CAS loop.
    pub(crate) async fn commit(&self, mut descriptor: ChainDescriptor) -> Result<Arc<ChainDescriptor>> {
        let expected = descriptor.version.ok_or_else(|| {
            SegmentError::corrupt(&descriptor.name, "descriptor was never persisted")
        })?;
        descriptor.validate()?;
        descriptor.touch();

        let key = keys::chain_key(&self.namespace, &descriptor.name);
        let value = descriptor.encode()?;
        let written = with_retry(&self.retry, "write_record", || {
            self.store.write_record(&key, value.clone(), Some(expected))
        })
        .await;
        match written {
            Ok(version) => {
                descriptor.version = Some(version);
                let descriptor = Arc::new(descriptor);
                self.cache.put(Arc::clone(&descriptor)).await;
                Ok(descriptor)
            },
            Err(err) => {
                self.cache.invalidate(&descriptor.name).await;
                Err(err.into())
            },
        }
    }

    /// Deletes the record of `descriptor` at the version it was read at.
    pub(crate) async fn remove(&self, descriptor: &ChainDescriptor) -> Result<()> {
        let expected = descriptor.version.ok_or_else(|| {
            SegmentError::corrupt(&descriptor.name, "descriptor was never persisted")
        })?;
        let key = keys::chain_key(&self.namespace, &descriptor.name);
        let removed =
            with_retry(&self.retry, "delete_record", || self.store.delete_record(&key, expected))
                .await;
        self.cache.invalidate(&descriptor.name).await;
        match removed {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound { .. }) => Err(SegmentError::not_found(&descriptor.name)),
            Err(err) => Err(err.into()),
        }
    }

    /// Read-modify-write of the descriptor of `name` under version checks.
    ///
    /// The first attempt starts from the cached descriptor; every retry
    /// after a conflict starts from a fresh store read, and so does a
    /// recheck when `mutate` rejects the cached copy. `mutate` sees a
    /// private copy and decides whether anything needs persisting. Returns
    /// the descriptor as stored after the call.
    pub(crate) async fn update<F>(&self, name: &str, mutate: F) -> Result<Arc<ChainDescriptor>>
    where
        F: Fn(&mut ChainDescriptor) -> Result<Mutation>,
    {
        let mutate = &mutate;
        with_cas_retry(&self.cas_retry, name, |attempt| async move {
            let mut current =
                if attempt == 0 { self.load(name).await? } else { self.load_fresh(name).await? };
            let mut next = ChainDescriptor::clone(&current);
            let mutation = match mutate(&mut next) {
                Ok(mutation) => mutation,
                Err(err) if attempt == 0 => {
                    // The cached copy may be stale; only a fresh read may reject.
                    trace!(segment = name, error = %err, "rechecking rejected mutation");
                    current = self.load_fresh(name).await?;
                    next = ChainDescriptor::clone(&current);
                    mutate(&mut next)?
                },
                Err(err) => return Err(err),
            };
            match mutation {
                Mutation::Unchanged => Ok(current),
                Mutation::Commit => {
                    let committed = self.commit(next).await;
                    if let Err(err) = &committed
                        && err.is_conflict()
                    {
                        debug!(segment = name, attempt, "descriptor version conflict");
                    }
                    committed
                },
            }
        })
        .await
    }

    /// Removes the record of `name` once `check` accepts it, under version
    /// checks. Returns the removed descriptor.
    ///
    /// Retries follow the same rules as [`update`](Self::update).
    pub(crate) async fn remove_where<F>(&self, name: &str, check: F) -> Result<Arc<ChainDescriptor>>
    where
        F: Fn(&ChainDescriptor) -> Result<()>,
    {
        let check = &check;
        with_cas_retry(&self.cas_retry, name, |attempt| async move {
            let mut current =
                if attempt == 0 { self.load(name).await? } else { self.load_fresh(name).await? };
            if let Err(err) = check(&current) {
                if attempt > 0 {
                    return Err(err);
                }
                trace!(segment = name, error = %err, "rechecking rejected removal");
                current = self.load_fresh(name).await?;
                check(&current)?;
            }
            self.remove(&current).await?;
            Ok(current)
        })
        .await
    }

    /// Lists the names of all segments in the namespace, in name order.
    ///
    /// Keys of nested namespaces are skipped. Undecodable keys are skipped
    /// and counted.
    pub(crate) async fn list_names(&self) -> Result<NameListing> {
        let prefix = keys::namespace_prefix(&self.namespace);
        let keys = with_retry(&self.retry, "list_keys", || self.store.list_keys(&prefix)).await?;

        let mut listing = NameListing::default();
        for key in &keys {
            match keys::name_from_key(&self.namespace, key) {
                Ok(Some(name)) => listing.names.push(name),
                Ok(None) => trace!(key = %String::from_utf8_lossy(key), "skipping nested namespace key"),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable descriptor key");
                    listing.undecodable += 1;
                },
            }
        }
        Ok(listing)
    }
}

impl std::fmt::Debug for ChainMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainMetadata")
            .field("namespace", &self.namespace)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
