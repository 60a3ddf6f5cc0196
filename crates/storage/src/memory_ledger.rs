//! In-memory ledger log implementation.
//!
//! [`MemoryLedgerLog`] keeps every ledger as a growable byte buffer plus a
//! sealed flag. It enforces the same contract as a replicated log service:
//! sealed ledgers reject appends, reads never return bytes that were not
//! appended, and ids are handed out in increasing order.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    error::{StorageError, StorageResult},
    ledger::LedgerLog,
    types::LedgerId,
};

#[derive(Debug, Default)]
struct MemoryLedger {
    data: BytesMut,
    sealed: bool,
}

/// In-memory [`LedgerLog`].
///
/// Cheaply cloneable; all clones share the same ledgers.
#[derive(Clone, Default)]
pub struct MemoryLedgerLog {
    ledgers: Arc<RwLock<HashMap<LedgerId, MemoryLedger>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryLedgerLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live (not deleted) ledgers.
    pub fn ledger_count(&self) -> usize {
        self.ledgers.read().len()
    }

    /// Returns `true` if the ledger exists.
    pub fn contains(&self, ledger_id: LedgerId) -> bool {
        self.ledgers.read().contains_key(&ledger_id)
    }

    /// Returns `Some(true)` if the ledger exists and is sealed.
    pub fn is_sealed(&self, ledger_id: LedgerId) -> Option<bool> {
        self.ledgers.read().get(&ledger_id).map(|ledger| ledger.sealed)
    }

    /// Returns the number of bytes appended to the ledger.
    pub fn ledger_len(&self, ledger_id: LedgerId) -> Option<u64> {
        self.ledgers.read().get(&ledger_id).map(|ledger| ledger.data.len() as u64)
    }
}

impl std::fmt::Debug for MemoryLedgerLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedgerLog").field("ledgers", &self.ledger_count()).finish()
    }
}

#[async_trait]
impl LedgerLog for MemoryLedgerLog {
    #[tracing::instrument(skip_all)]
    async fn create_ledger(&self) -> StorageResult<LedgerId> {
        let ledger_id = LedgerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.ledgers.write().insert(ledger_id, MemoryLedger::default());
        Ok(ledger_id)
    }

    #[tracing::instrument(skip_all, fields(ledger_id = %ledger_id, len = data.len()))]
    async fn append(&self, ledger_id: LedgerId, data: Bytes) -> StorageResult<u64> {
        fail_point!("ledger-append", |_| Err(StorageError::connection("injected append failure")));

        let mut ledgers = self.ledgers.write();
        let ledger =
            ledgers.get_mut(&ledger_id).ok_or(StorageError::LedgerNotFound { ledger_id })?;
        if ledger.sealed {
            return Err(StorageError::LedgerSealed { ledger_id });
        }

        let position = ledger.data.len() as u64;
        ledger.data.extend_from_slice(&data);
        Ok(position)
    }

    #[tracing::instrument(skip(self))]
    async fn read(&self, ledger_id: LedgerId, position: u64, length: u64) -> StorageResult<Bytes> {
        fail_point!("ledger-read", |_| Err(StorageError::connection("injected read failure")));

        let ledgers = self.ledgers.read();
        let ledger = ledgers.get(&ledger_id).ok_or(StorageError::LedgerNotFound { ledger_id })?;

        let available = ledger.data.len() as u64;
        let end = position.checked_add(length).filter(|end| *end <= available).ok_or(
            StorageError::LedgerOutOfRange { ledger_id, position, length, available },
        )?;

        Ok(Bytes::copy_from_slice(&ledger.data[position as usize..end as usize]))
    }

    #[tracing::instrument(skip_all, fields(ledger_id = %ledger_id))]
    async fn seal(&self, ledger_id: LedgerId) -> StorageResult<u64> {
        let mut ledgers = self.ledgers.write();
        let ledger =
            ledgers.get_mut(&ledger_id).ok_or(StorageError::LedgerNotFound { ledger_id })?;
        ledger.sealed = true;
        Ok(ledger.data.len() as u64)
    }

    #[tracing::instrument(skip_all, fields(ledger_id = %ledger_id))]
    async fn delete(&self, ledger_id: LedgerId) -> StorageResult<()> {
        self.ledgers
            .write()
            .remove(&ledger_id)
            .map(|_| ())
            .ok_or(StorageError::LedgerNotFound { ledger_id })
    }
}
