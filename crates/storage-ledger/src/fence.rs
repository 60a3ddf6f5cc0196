//! Single-writer fencing.
//!
//! Opening a segment for writing bumps the epoch stored in its descriptor
//! and records a fresh owner token. The pair is handed back as a
//! [`WriteToken`]; every later write, seal or concat presents the token and
//! fails with [`SegmentError::FencedOut`] once a newer epoch is persisted.
//! No lock or lease is held, so a crashed writer never blocks a successor.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    descriptor::ChainDescriptor,
    error::{Result, SegmentError},
    manager::ChainManager,
    metadata::Mutation,
};

/// Write capability for one segment at one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteToken {
    epoch: u64,
    owner: String,
}

impl WriteToken {
    /// Epoch this token was granted at.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Owner identity recorded with the epoch.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Fails with `FencedOut` unless `descriptor` was last fenced by this
    /// token.
    pub(crate) fn check(&self, descriptor: &ChainDescriptor) -> Result<()> {
        if descriptor.epoch == self.epoch && descriptor.owner == self.owner {
            return Ok(());
        }
        Err(SegmentError::FencedOut {
            name: descriptor.name.clone(),
            epoch: self.epoch,
            current_epoch: descriptor.epoch,
        })
    }
}

impl ChainManager {
    /// Takes write ownership of `name` for a process at `container_epoch`.
    ///
    /// Seals the open entry without opening a replacement; the next write
    /// rolls to a new ledger.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::NotFound`] if the segment does not exist
    /// - [`SegmentError::Sealed`] if the segment is sealed
    /// - [`SegmentError::ConcurrentModification`] if version conflicts outlast the retry bound
    #[tracing::instrument(skip(self))]
    pub(crate) async fn fence(&self, name: &str, container_epoch: u64) -> Result<WriteToken> {
        let owner = format!("{container_epoch}:{}", Uuid::new_v4());
        let fenced = self
            .metadata
            .update(name, |descriptor| {
                if descriptor.sealed {
                    return Err(SegmentError::sealed(name));
                }
                descriptor.epoch += 1;
                descriptor.owner.clone_from(&owner);
                descriptor.seal_open_entry();
                Ok(Mutation::Commit)
            })
            .await?;

        info!(segment = name, epoch = fenced.epoch, owner = %owner, "segment fenced");
        self.seal_tail_ledger(&fenced).await;
        Ok(WriteToken { epoch: fenced.epoch, owner })
    }

    /// Seals the ledger of the last entry in the log service, so appends
    /// still in flight from a superseded writer fail at the ledger.
    pub(crate) async fn seal_tail_ledger(&self, descriptor: &Arc<ChainDescriptor>) {
        if let Some(last) = descriptor.entries.last() {
            self.seal_ledger_quietly(&descriptor.name, last.ledger_id).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use segmentstore_storage::{LedgerLog, MemoryLedgerLog, MemoryMetadataStore};

    use super::*;
    use crate::config::LedgerStorageConfig;

    fn manager(log: MemoryLedgerLog) -> ChainManager {
        ChainManager::new(
            &LedgerStorageConfig::default(),
            Arc::new(log),
            Arc::new(MemoryMetadataStore::new()),
        )
    }

    #[tokio::test]
    async fn fence_increments_epoch_and_sets_owner() {
        let mgr = manager(MemoryLedgerLog::new());
        mgr.create("s").await.unwrap();

        let first = mgr.fence("s", 7).await.unwrap();
        let second = mgr.fence("s", 7).await.unwrap();

        assert_eq!(first.epoch(), 1);
        assert_eq!(second.epoch(), 2);
        assert!(second.owner().starts_with("7:"));
        assert_ne!(first.owner(), second.owner());

        let current = mgr.describe("s").await.unwrap();
        assert!(matches!(first.check(&current), Err(SegmentError::FencedOut { epoch: 1, current_epoch: 2, .. })));
        second.check(&current).unwrap();
    }

    #[tokio::test]
    async fn fence_seals_open_ledger() {
        let log = MemoryLedgerLog::new();
        let mgr = manager(log.clone());
        mgr.create("s").await.unwrap();
        let token = mgr.fence("s", 1).await.unwrap();
        mgr.write("s", &token, 0, bytes::Bytes::from_static(b"abc")).await.unwrap();
        let ledger = mgr.describe("s").await.unwrap().open_entry().unwrap().ledger_id;

        mgr.fence("s", 2).await.unwrap();

        let current = mgr.describe("s").await.unwrap();
        assert!(current.open_entry().is_none());
        assert_eq!(log.is_sealed(ledger), Some(true));
        assert!(log.append(ledger, bytes::Bytes::from_static(b"x")).await.is_err());
    }

    #[tokio::test]
    async fn fence_rejects_sealed_and_missing_segments() {
        let mgr = manager(MemoryLedgerLog::new());
        assert!(matches!(mgr.fence("nope", 1).await, Err(SegmentError::NotFound { .. })));

        mgr.create("s").await.unwrap();
        let token = mgr.fence("s", 1).await.unwrap();
        mgr.seal("s", &token).await.unwrap();
        assert!(matches!(mgr.fence("s", 1).await, Err(SegmentError::Sealed { .. })));
    }
}
