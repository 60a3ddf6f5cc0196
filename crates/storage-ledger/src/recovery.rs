//! Resolution of concats interrupted between their metadata writes.
//!
//! A source segment still carrying `merged_into` is in one of two states:
//!
//! - the target already references the source's ledgers: the concat
//!   committed and only the source record removal is missing, so it is
//!   completed;
//! - the target does not reference them: the target is fenced first, so a
//!   concat still in flight with the old token can no longer extend it, and
//!   the marker is then cleared, rolling the concat back.
//!
//! [`ChainManager::recover`] applies this to every segment of the namespace
//! and runs once when the storage is initialized.

use tracing::{info, warn};

use crate::{
    descriptor::ChainDescriptor,
    error::{Result, SegmentError},
    manager::ChainManager,
};

/// How a pending merge marker was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeResolution {
    /// The target held the chain; the source record was removed.
    Completed,
    /// The target never received the chain; the marker was cleared.
    RolledBack,
    /// The segment carried no marker.
    NotPending,
}

/// Outcome of a recovery scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Segments examined.
    pub scanned: usize,
    /// Interrupted concats completed.
    pub completed: usize,
    /// Interrupted concats rolled back.
    pub rolled_back: usize,
    /// Segments skipped because their descriptor or key is corrupt.
    pub corrupt: usize,
}

impl ChainManager {
    /// Scans every segment and resolves pending merge markers.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn recover(&self, container_epoch: u64) -> Result<RecoveryReport> {
        let listing = self.metadata.list_names().await?;
        let mut report = RecoveryReport {
            scanned: listing.names.len(),
            corrupt: listing.undecodable,
            ..RecoveryReport::default()
        };

        for name in &listing.names {
            let descriptor = match self.metadata.fetch(name).await {
                Ok(Some(descriptor)) => descriptor,
                Ok(None) => continue,
                Err(err @ SegmentError::Corrupt { .. }) => {
                    warn!(segment = %name, error = %err, "skipping corrupt descriptor");
                    report.corrupt += 1;
                    continue;
                },
                Err(err) => return Err(err),
            };
            match self.resolve_merge(&descriptor, container_epoch).await? {
                MergeResolution::Completed => report.completed += 1,
                MergeResolution::RolledBack => report.rolled_back += 1,
                MergeResolution::NotPending => {},
            }
        }

        info!(
            scanned = report.scanned,
            completed = report.completed,
            rolled_back = report.rolled_back,
            corrupt = report.corrupt,
            "recovery scan finished",
        );
        Ok(report)
    }

    /// Resolves the merge marker of `source`, if any.
    pub(crate) async fn resolve_merge(
        &self,
        source: &ChainDescriptor,
        container_epoch: u64,
    ) -> Result<MergeResolution> {
        let Some(target) = source.merged_into.as_deref() else {
            return Ok(MergeResolution::NotPending);
        };

        let current = match self.metadata.load_fresh(target).await {
            Ok(current) => current,
            Err(SegmentError::NotFound { .. }) => {
                self.clear_merge(&source.name, target).await?;
                info!(source = %source.name, target, "merge target vanished; marker cleared");
                return Ok(MergeResolution::RolledBack);
            },
            Err(err) => return Err(err),
        };

        let current = if current.holds_chain_of(source) || current.sealed {
            current
        } else {
            match self.fence(target, container_epoch).await {
                Ok(_) | Err(SegmentError::Sealed { .. }) => {},
                Err(err) => return Err(err),
            }
            self.metadata.load_fresh(target).await?
        };

        if current.holds_chain_of(source) {
            self.finish_concat(source, target).await?;
            info!(source = %source.name, target, "interrupted concat completed");
            Ok(MergeResolution::Completed)
        } else {
            self.clear_merge(&source.name, target).await?;
            info!(source = %source.name, target, "interrupted concat rolled back");
            Ok(MergeResolution::RolledBack)
        }
    }
}
