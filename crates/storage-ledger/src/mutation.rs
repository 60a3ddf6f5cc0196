//! Seal, concat and delete.
//!
//! Concat moves a sealed source's ledger entries onto a target without
//! copying bytes. The metadata store only offers single-key conditional
//! writes, so the move is a three-step protocol:
//!
//! 0. mark the source `merged_into = target`;
//! 1. extend the target with the re-based source entries and record
//!    `last_concat`;
//! 2. remove the source record without releasing its ledgers.
//!
//! After step 1 the ledgers are referenced by the target; the marker on the
//! source stops a delete from releasing them. A crash between steps leaves
//! a marked source that a retried concat, a delete, or the recovery scan
//! resolves (see [`recovery`](crate::recovery)).

use std::sync::Arc;

use fail::fail_point;
use tracing::{info, warn};

use crate::{
    descriptor::ChainDescriptor,
    error::{Result, SegmentError},
    fence::WriteToken,
    manager::ChainManager,
    metadata::Mutation,
    recovery::MergeResolution,
};

impl ChainManager {
    /// Seals segment `name`; sealing a sealed segment is a no-op.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::NotFound`] if the segment does not exist
    /// - [`SegmentError::FencedOut`] if the segment is unsealed and `token` is superseded
    #[tracing::instrument(skip(self, token), fields(epoch = token.epoch()))]
    pub(crate) async fn seal(&self, name: &str, token: &WriteToken) -> Result<Arc<ChainDescriptor>> {
        let sealed = self
            .metadata
            .update(name, |descriptor| {
                if descriptor.sealed {
                    return Ok(Mutation::Unchanged);
                }
                token.check(descriptor)?;
                descriptor.seal_open_entry();
                descriptor.sealed = true;
                Ok(Mutation::Commit)
            })
            .await?;

        info!(segment = name, length = sealed.length, "segment sealed");
        self.seal_tail_ledger(&sealed).await;
        Ok(sealed)
    }

    /// Appends the whole of sealed segment `source` to `target` at `offset`.
    ///
    /// Retrying a concat that already completed (source gone, target's
    /// last concat recording this source at `offset`) succeeds without
    /// effect; retrying one interrupted after the target was extended only
    /// removes the source record.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::InvalidArgument`] if `source` equals `target` or is empty
    /// - [`SegmentError::NotFound`] if either segment does not exist
    /// - [`SegmentError::NotSealed`] if `source` is not sealed
    /// - [`SegmentError::Sealed`] if `target` is sealed
    /// - [`SegmentError::FencedOut`] if `token` is superseded on `target`
    /// - [`SegmentError::BadOffset`] if `offset` is not the length of `target`
    /// - [`SegmentError::ConcurrentModification`] if `source` is being merged into another segment
    #[tracing::instrument(skip(self, token), fields(epoch = token.epoch()))]
    pub(crate) async fn concat(
        &self,
        target: &str,
        token: &WriteToken,
        offset: u64,
        source: &str,
    ) -> Result<Arc<ChainDescriptor>> {
        if source == target {
            return Err(SegmentError::invalid_argument(format!(
                "cannot concat segment '{source}' onto itself"
            )));
        }

        let Some(found) = self.metadata.fetch(source).await? else {
            let current = self.metadata.load_fresh(target).await?;
            return match current.last_concat() {
                Some(done) if done.source == source && done.target_offset == offset => {
                    info!(target, source, "concat already applied");
                    Ok(current)
                },
                _ => Err(SegmentError::not_found(source)),
            };
        };

        let marked = match found.merged_into() {
            Some(pending) if pending != target => {
                return Err(SegmentError::ConcurrentModification {
                    name: source.to_owned(),
                    attempts: 1,
                });
            },
            Some(_) => {
                let current = self.metadata.load_fresh(target).await?;
                if current.holds_chain_of(&found) {
                    self.finish_concat(&found, target).await?;
                    info!(target, source, "interrupted concat completed");
                    return Ok(current);
                }
                Arc::new(found)
            },
            None => self.mark_merge(source, target).await?,
        };

        let extended = self
            .metadata
            .update(target, |descriptor| {
                let applied = descriptor
                    .last_concat()
                    .is_some_and(|done| done.source == source && done.target_offset == offset);
                if applied && descriptor.holds_chain_of(&marked) {
                    // The extend landed but its acknowledgement was lost.
                    return Ok(Mutation::Unchanged);
                }
                if descriptor.sealed {
                    return Err(SegmentError::sealed(target));
                }
                token.check(descriptor)?;
                if offset != descriptor.length {
                    return Err(SegmentError::BadOffset {
                        name: target.to_owned(),
                        expected: descriptor.length,
                        actual: offset,
                    });
                }
                descriptor.append_chain(&marked);
                Ok(Mutation::Commit)
            })
            .await;

        let extended = match extended {
            Ok(extended) => extended,
            Err(err) => {
                let ambiguous = matches!(&err, SegmentError::Storage(e) if e.is_transient());
                if !ambiguous {
                    self.clear_merge_quietly(source, target).await;
                }
                return Err(err);
            },
        };

        fail_point!("concat-before-source-removal", |_| Err(SegmentError::Storage(
            segmentstore_storage::StorageError::connection("injected failure before source removal")
        )));
        self.finish_concat(&marked, target).await?;
        info!(
            target,
            source,
            target_offset = offset,
            length = marked.length,
            "segments concatenated",
        );
        Ok(extended)
    }

    /// Concat step 0: marks `source` as being merged into `target`.
    async fn mark_merge(&self, source: &str, target: &str) -> Result<Arc<ChainDescriptor>> {
        self.metadata
            .update(source, |descriptor| {
                if !descriptor.sealed {
                    return Err(SegmentError::NotSealed { name: source.to_owned() });
                }
                if descriptor.length == 0 {
                    return Err(SegmentError::invalid_argument(format!(
                        "source segment '{source}' is empty"
                    )));
                }
                match descriptor.merged_into.as_deref() {
                    None => {
                        descriptor.merged_into = Some(target.to_owned());
                        Ok(Mutation::Commit)
                    },
                    Some(pending) if pending == target => Ok(Mutation::Unchanged),
                    Some(_) => Err(SegmentError::ConcurrentModification {
                        name: source.to_owned(),
                        attempts: 1,
                    }),
                }
            })
            .await
    }

    /// Concat step 2: removes the source record, keeping its ledgers.
    pub(crate) async fn finish_concat(&self, source: &ChainDescriptor, target: &str) -> Result<()> {
        let removed = self
            .metadata
            .remove_where(&source.name, |descriptor| {
                if descriptor.merged_into.as_deref() == Some(target) {
                    Ok(())
                } else {
                    Err(SegmentError::ConcurrentModification {
                        name: descriptor.name.clone(),
                        attempts: 1,
                    })
                }
            })
            .await;
        match removed {
            Ok(_) | Err(SegmentError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Clears a merge marker left by a concat whose target was never
    /// extended.
    pub(crate) async fn clear_merge(&self, source: &str, target: &str) -> Result<()> {
        let cleared = self
            .metadata
            .update(source, |descriptor| {
                if descriptor.merged_into.as_deref() != Some(target) {
                    return Ok(Mutation::Unchanged);
                }
                descriptor.merged_into = None;
                Ok(Mutation::Commit)
            })
            .await;
        match cleared {
            Ok(_) | Err(SegmentError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn clear_merge_quietly(&self, source: &str, target: &str) {
        if let Err(err) = self.clear_merge(source, target).await {
            warn!(source, target, error = %err, "failed to clear merge marker");
        }
    }

    /// Deletes segment `name` and releases its ledgers.
    ///
    /// Removing the descriptor is the operation of record. Ledger release is
    /// best effort: a failure is logged and leaves an unreferenced ledger,
    /// never a reachable segment. A segment with a pending merge marker is
    /// resolved first; if its chain already belongs to the merge target,
    /// only the record is removed.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::NotFound`] if the segment does not exist
    /// - [`SegmentError::ConcurrentModification`] if version conflicts outlast the retry bound
    #[tracing::instrument(skip(self))]
    pub(crate) async fn delete(&self, name: &str, container_epoch: u64) -> Result<()> {
        let current = self.metadata.load_fresh(name).await?;
        if current.merged_into.is_some()
            && self.resolve_merge(&current, container_epoch).await? == MergeResolution::Completed
        {
            info!(segment = name, "delete completed a pending concat; ledgers kept by target");
            return Ok(());
        }

        let removed = self
            .metadata
            .remove_where(name, |descriptor| match &descriptor.merged_into {
                None => Ok(()),
                Some(_) => Err(SegmentError::ConcurrentModification {
                    name: descriptor.name.clone(),
                    attempts: 1,
                }),
            })
            .await?;

        let released = self.release_ledgers(name, &removed.entries).await;
        info!(
            segment = name,
            ledgers = removed.entries.len(),
            released,
            "segment deleted",
        );
        Ok(())
    }
}
