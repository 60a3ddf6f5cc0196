//! The ledger-chain manager.
//!
//! [`ChainManager`] owns the two collaborators and implements every chain
//! operation on top of them. The operations are split across modules by
//! concern:
//!
//! | Module | Operations |
//! |--------|------------|
//! | [`fence`](crate::fence) | `fence` |
//! | [`write`](crate::write) | `write` and ledger rollover |
//! | [`read`](crate::read) | `read` |
//! | [`mutation`](crate::mutation) | `seal`, `concat`, `delete` |
//! | [`recovery`](crate::recovery) | `recover` and merge resolution |
//!
//! Every mutation ends in a conditional descriptor write through
//! [`ChainMetadata`]; nothing here holds a lock across collaborator calls.

use std::sync::Arc;

use segmentstore_storage::{LedgerId, LedgerLog, MetadataStore};
use tracing::{debug, warn};

use crate::{
    config::{LedgerStorageConfig, RetryConfig},
    descriptor::{ChainDescriptor, LedgerEntry},
    error::Result,
    metadata::ChainMetadata,
    retry::with_retry,
};

pub(crate) struct ChainManager {
    pub(crate) log: Arc<dyn LedgerLog>,
    pub(crate) metadata: ChainMetadata,
    pub(crate) retry: RetryConfig,
    pub(crate) max_ledger_size: u64,
}

impl ChainManager {
    pub(crate) fn new(
        config: &LedgerStorageConfig,
        log: Arc<dyn LedgerLog>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            log,
            metadata: ChainMetadata::new(config, store),
            retry: config.retry().clone(),
            max_ledger_size: config.max_ledger_size(),
        }
    }

    /// Creates the empty descriptor of a new segment.
    ///
    /// No ledger is opened; the first write creates one.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn create(&self, name: &str) -> Result<Arc<ChainDescriptor>> {
        let created = self.metadata.insert(ChainDescriptor::new(name)).await?;
        debug!(segment = name, "segment created");
        Ok(created)
    }

    /// Returns the descriptor of `name`, possibly from the cache.
    #[cfg(test)]
    pub(crate) async fn describe(&self, name: &str) -> Result<Arc<ChainDescriptor>> {
        self.metadata.load(name).await
    }

    /// Seals `ledger_id` in the log service, logging instead of failing.
    ///
    /// Used after a descriptor commit already made the ledger read-only for
    /// this engine; the log-level seal only stops stale writers earlier.
    pub(crate) async fn seal_ledger_quietly(&self, name: &str, ledger_id: LedgerId) {
        match with_retry(&self.retry, "seal", || self.log.seal(ledger_id)).await {
            Ok(length) => debug!(segment = name, %ledger_id, length, "ledger sealed"),
            Err(err) => warn!(
                segment = name,
                %ledger_id,
                error = %err.detail(),
                "failed to seal ledger in log service",
            ),
        }
    }

    /// Deletes the ledgers of removed entries, logging failures.
    ///
    /// Returns how many ledgers were released.
    pub(crate) async fn release_ledgers(&self, name: &str, entries: &[LedgerEntry]) -> usize {
        let mut released = 0;
        for entry in entries {
            if self.release_ledger(name, entry.ledger_id).await {
                released += 1;
            }
        }
        released
    }

    /// Deletes one unreferenced ledger, logging a failure.
    pub(crate) async fn release_ledger(&self, name: &str, ledger_id: LedgerId) -> bool {
        match with_retry(&self.retry, "delete", || self.log.delete(ledger_id)).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    segment = name,
                    %ledger_id,
                    error = %err.detail(),
                    "failed to release ledger; it is no longer referenced",
                );
                false
            },
        }
    }
}

impl std::fmt::Debug for ChainManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainManager")
            .field("metadata", &self.metadata)
            .field("max_ledger_size", &self.max_ledger_size)
            .finish_non_exhaustive()
    }
}
