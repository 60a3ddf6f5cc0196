//! In-process cache of chain descriptors.
//!
//! [`ChainCache`] wraps a [`moka`] future cache keyed by segment name. It is
//! an optimization only: every mutating path re-validates against the
//! metadata store version before committing, and the cache is updated only
//! after a store write succeeds.
//!
//! # Design
//!
//! - **Lazy population**: [`get_or_load`](ChainCache::get_or_load) reads through on a miss. Loads of
//!   the same key are coalesced, so a reload never races a concurrent eviction into a torn entry.
//! - **Bounded staleness**: entries expire `ttl` after insertion.
//! - **Periodic sweep**: a background task runs moka's pending evictions every `cleanup_interval`.
//!   It stops when the last clone of the cache is dropped or on [`shutdown`](ChainCache::shutdown).

use std::{future::Future, sync::Arc};

use moka::future::Cache;
use tokio::{select, sync::watch, time::interval};
use tracing::trace;

use crate::{
    config::ChainCacheConfig,
    descriptor::ChainDescriptor,
    error::{Result, SegmentError},
};

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the sweep task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Shared cache of chain descriptors.
///
/// Cheaply cloneable; all clones share the same entries and sweep task.
#[derive(Clone)]
pub(crate) struct ChainCache {
    entries: Cache<String, Arc<ChainDescriptor>>,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl ChainCache {
    /// Creates the cache and spawns its sweep task on the current runtime.
    pub(crate) fn new(config: &ChainCacheConfig) -> Self {
        let entries =
            Cache::builder().max_capacity(config.max_entries).time_to_live(config.ttl).build();
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let sweep = entries.clone();
        let period = config.cleanup_interval;
        tokio::spawn(async move {
            sweep_expired(sweep, period, shutdown_rx).await;
        });

        Self { entries, shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }) }
    }

    /// Returns the cached descriptor, if present and unexpired.
    #[cfg(test)]
    pub(crate) async fn get(&self, name: &str) -> Option<Arc<ChainDescriptor>> {
        let hit = self.entries.get(name).await;
        trace!(segment = name, hit = hit.is_some(), "chain cache lookup");
        hit
    }

    /// Returns the cached descriptor or loads it with `load`.
    ///
    /// Concurrent calls for the same name share one load. A failed load
    /// caches nothing.
    pub(crate) async fn get_or_load<F>(&self, name: &str, load: F) -> Result<Arc<ChainDescriptor>>
    where
        F: Future<Output = Result<ChainDescriptor>>,
    {
        self.entries
            .try_get_with_by_ref(name, async {
                trace!(segment = name, "chain cache miss, loading");
                load.await.map(Arc::new)
            })
            .await
            .map_err(|err: Arc<SegmentError>| Arc::unwrap_or_clone(err))
    }

    /// Stores a descriptor that was just persisted.
    pub(crate) async fn put(&self, descriptor: Arc<ChainDescriptor>) {
        self.entries.insert(descriptor.name.clone(), descriptor).await;
    }

    /// Drops the cached descriptor of `name`.
    pub(crate) async fn invalidate(&self, name: &str) {
        self.entries.invalidate(name).await;
    }

    /// Stops the sweep task; entries still expire lazily on access.
    pub(crate) fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    #[cfg(test)]
    async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

impl std::fmt::Debug for ChainCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainCache").field("entries", &self.entries.entry_count()).finish()
    }
}

/// Background task running pending evictions.
///
/// Exits when the shutdown signal is received, i.e. when the watch sender is
/// dropped or [`ChainCache::shutdown`] is called.
async fn sweep_expired(
    entries: Cache<String, Arc<ChainDescriptor>>,
    period: std::time::Duration,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.tick().await;
    loop {
        select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => {
                return;
            }
        }
        entries.run_pending_tasks().await;
        trace!(entries = entries.entry_count(), "chain cache sweep");
    }
}
