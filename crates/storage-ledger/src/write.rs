//! The write path: sequential appends with ledger rollover.
//!
//! A write is accepted only at the segment's current length and only from
//! the holder of the current [`WriteToken`]. Bytes go to the open ledger;
//! the descriptor records them only after the append is confirmed, so a
//! failed write never advances the segment length.
//!
//! A write never spans ledgers. A new ledger is opened before an append
//! that would grow a non-empty ledger past `max_ledger_size`, so a single
//! larger write gets a ledger of its own.
//!
//! Each entry maps `[0, length)` of its ledger. When an append lands at a
//! position other than the entry's recorded length (bytes left behind by a
//! write whose commit failed, or a retried append that had already
//! succeeded), the entry is sealed at its recorded length and the write is
//! replayed on a fresh ledger.

use std::sync::Arc;

use bytes::Bytes;
use fail::fail_point;
use segmentstore_storage::{LedgerId, StorageError};
use tracing::debug;

use crate::{
    descriptor::ChainDescriptor,
    error::{Result, SegmentError},
    fence::WriteToken,
    manager::ChainManager,
    metadata::Mutation,
    retry::with_retry,
};

/// Upper bound on rollover-and-append rounds for one write.
const MAX_WRITE_ROUNDS: u32 = 4;

/// Checks that `descriptor` accepts a write at `offset` from `token`.
fn check_writable(descriptor: &ChainDescriptor, token: &WriteToken, offset: u64) -> Result<()> {
    if descriptor.sealed {
        return Err(SegmentError::sealed(&descriptor.name));
    }
    token.check(descriptor)?;
    if offset != descriptor.length {
        return Err(SegmentError::BadOffset {
            name: descriptor.name.clone(),
            expected: descriptor.length,
            actual: offset,
        });
    }
    Ok(())
}

/// Whether `descriptor` already records `appended` bytes from `token` at
/// `offset`, landed at `position` of `ledger_id`.
///
/// True when a commit reached the store but its acknowledgement did not.
fn append_recorded(
    descriptor: &ChainDescriptor,
    token: &WriteToken,
    offset: u64,
    ledger_id: LedgerId,
    position: u64,
    appended: u64,
) -> bool {
    !descriptor.sealed
        && token.check(descriptor).is_ok()
        && descriptor.length == offset + appended
        && descriptor
            .open_entry()
            .is_some_and(|entry| entry.ledger_id == ledger_id && entry.length == position + appended)
}

impl ChainManager {
    /// Appends `data` at `offset` of segment `name`.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::Sealed`] if the segment is sealed
    /// - [`SegmentError::FencedOut`] if `token` is superseded
    /// - [`SegmentError::BadOffset`] if `offset` is not the current length
    /// - [`SegmentError::Storage`] if the log service keeps failing past the retry bound
    #[tracing::instrument(skip(self, token, data), fields(epoch = token.epoch(), len = data.len()))]
    pub(crate) async fn write(
        &self,
        name: &str,
        token: &WriteToken,
        offset: u64,
        data: Bytes,
    ) -> Result<Arc<ChainDescriptor>> {
        let mut current = self.metadata.load(name).await?;
        if check_writable(&current, token, offset).is_err() {
            current = self.metadata.load_fresh(name).await?;
            check_writable(&current, token, offset)?;
        }
        if data.is_empty() {
            return Ok(current);
        }

        let appended = data.len() as u64;
        let mut force_roll = false;
        for round in 0..MAX_WRITE_ROUNDS {
            let needs_roll = match current.open_entry() {
                Some(entry) => {
                    force_roll
                        || (entry.length > 0
                            && entry.length.saturating_add(appended) > self.max_ledger_size)
                },
                None => true,
            };
            if needs_roll {
                current = self.roll(name, token, offset).await?;
            }
            let Some(entry) = current.open_entry() else {
                return Err(SegmentError::corrupt(name, "no open entry after rollover"));
            };
            let (ledger_id, expected_position) = (entry.ledger_id, entry.length);

            match with_retry(&self.retry, "append", || self.log.append(ledger_id, data.clone()))
                .await
            {
                Ok(position) if position == expected_position => {
                    fail_point!("write-before-commit", |_| Err(SegmentError::Storage(
                        StorageError::connection("injected failure before append commit")
                    )));
                    return self.record_append(name, token, offset, ledger_id, position, &data).await;
                },
                Ok(position) => {
                    debug!(
                        segment = name,
                        %ledger_id,
                        position,
                        expected_position,
                        round,
                        "append landed past the entry end, rolling over",
                    );
                    force_roll = true;
                },
                Err(StorageError::LedgerSealed { .. }) => {
                    debug!(segment = name, %ledger_id, round, "open ledger was sealed");
                    current = self.metadata.load_fresh(name).await?;
                    check_writable(&current, token, offset)?;
                    force_roll = true;
                },
                Err(err) => return Err(err.into()),
            }
        }

        Err(SegmentError::ConcurrentModification { name: name.to_owned(), attempts: MAX_WRITE_ROUNDS })
    }

    /// Commits an append that landed at `position` of the open ledger.
    async fn record_append(
        &self,
        name: &str,
        token: &WriteToken,
        offset: u64,
        ledger_id: LedgerId,
        position: u64,
        data: &Bytes,
    ) -> Result<Arc<ChainDescriptor>> {
        let appended = data.len() as u64;
        self.metadata
            .update(name, |descriptor| {
                if append_recorded(descriptor, token, offset, ledger_id, position, appended) {
                    debug!(segment = name, %ledger_id, offset, "append commit already applied");
                    return Ok(Mutation::Unchanged);
                }
                check_writable(descriptor, token, offset)?;
                match descriptor.open_entry() {
                    Some(entry) if entry.ledger_id == ledger_id && entry.length == position => {},
                    _ => {
                        return Err(SegmentError::ConcurrentModification {
                            name: name.to_owned(),
                            attempts: 1,
                        });
                    },
                }
                descriptor.record_append(ledger_id, appended)?;
                Ok(Mutation::Commit)
            })
            .await
    }

    /// Seals the open entry, if any, and opens a new ledger after it.
    ///
    /// The new ledger is created before the descriptor references it and is
    /// deleted again if the descriptor write is definitely rejected.
    async fn roll(
        &self,
        name: &str,
        token: &WriteToken,
        offset: u64,
    ) -> Result<Arc<ChainDescriptor>> {
        let ledger_id = with_retry(&self.retry, "create_ledger", || self.log.create_ledger()).await?;

        let rolled = self
            .metadata
            .update(name, |descriptor| {
                check_writable(descriptor, token, offset)?;
                descriptor.seal_open_entry();
                descriptor.push_entry(ledger_id);
                Ok(Mutation::Commit)
            })
            .await;

        match rolled {
            Ok(descriptor) => {
                debug!(segment = name, %ledger_id, start_offset = offset, "rolled over to new ledger");
                if let [.., previous, _] = descriptor.entries.as_slice() {
                    self.seal_ledger_quietly(name, previous.ledger_id).await;
                }
                Ok(descriptor)
            },
            Err(err) => {
                // An ambiguous store failure may have persisted the entry.
                let ambiguous = matches!(&err, SegmentError::Storage(e) if e.is_transient());
                if !ambiguous {
                    self.release_ledger(name, ledger_id).await;
                }
                Err(err)
            },
        }
    }
}
