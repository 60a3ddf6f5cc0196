//! Shared test utilities for collaborator fault injection.
//!
//! This module provides wrappers that make a [`MetadataStore`] or a
//! [`LedgerLog`] fail on demand, plus small payload helpers. It is
//! feature-gated behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! segmentstore-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use segmentstore_storage::testutil::{FaultKind, FlakyLedgerLog};
//! use segmentstore_storage::MemoryLedgerLog;
//!
//! let log = FlakyLedgerLog::new(MemoryLedgerLog::new());
//! log.appends().fail_next(2, FaultKind::Transient);
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    error::{StorageError, StorageResult},
    ledger::LedgerLog,
    metadata::MetadataStore,
    types::{LedgerId, Record, Version},
};

/// Create a deterministic payload of `len` bytes tagged by `seed`.
///
/// Byte `i` is `(seed + i) % 251`, so payloads written by different calls are
/// distinguishable and any misplaced byte shows up in an equality check.
#[must_use]
pub fn make_payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| ((seed as usize + i) % 251) as u8).collect()
}

/// Which error an injected fault produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// [`StorageError::Connection`], retried by backoff policies.
    Transient,
    /// [`StorageError::Internal`], surfaced immediately.
    Permanent,
    /// The call is applied, then reported as a [`StorageError::Connection`]
    /// as if the acknowledgement was lost in transit.
    LostAck,
}

impl FaultKind {
    fn error(self, operation: &str) -> StorageError {
        match self {
            Self::Transient => StorageError::connection(format!("injected {operation} failure")),
            Self::LostAck => StorageError::connection(format!("{operation} acknowledgement lost")),
            Self::Permanent => StorageError::internal(format!("injected {operation} failure")),
        }
    }
}

/// Countdown of injected failures for one operation.
#[derive(Debug)]
pub struct Fault {
    operation: &'static str,
    skip: AtomicU32,
    remaining: AtomicU32,
    kind: Mutex<FaultKind>,
    calls: AtomicU32,
}

impl Fault {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            skip: AtomicU32::new(0),
            remaining: AtomicU32::new(0),
            kind: Mutex::new(FaultKind::Transient),
            calls: AtomicU32::new(0),
        }
    }

    /// Makes the next `count` calls fail with `kind`.
    pub fn fail_next(&self, count: u32, kind: FaultKind) {
        self.fail_nth(1, count, kind);
    }

    /// Lets `nth - 1` calls through, then makes the following `count`
    /// calls fail with `kind`.
    pub fn fail_nth(&self, nth: u32, count: u32, kind: FaultKind) {
        *self.kind.lock() = kind;
        self.skip.store(nth.saturating_sub(1), Ordering::SeqCst);
        self.remaining.store(count, Ordering::SeqCst);
    }

    /// Cancels any pending injected failures.
    pub fn clear(&self) {
        self.skip.store(0, Ordering::SeqCst);
        self.remaining.store(0, Ordering::SeqCst);
    }

    /// Returns how many calls reached this operation, failed or not.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Counts the call and returns the fault it should suffer, if any.
    fn trip(&self) -> Option<FaultKind> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.skip.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return None;
        }
        let injected = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        injected.then(|| *self.kind.lock())
    }

    /// Runs `call` under this fault's schedule.
    async fn run<T>(&self, call: impl Future<Output = StorageResult<T>>) -> StorageResult<T> {
        match self.trip() {
            None => call.await,
            Some(FaultKind::LostAck) => {
                call.await?;
                Err(FaultKind::LostAck.error(self.operation))
            },
            Some(kind) => Err(kind.error(self.operation)),
        }
    }
}

/// A [`MetadataStore`] wrapper with per-operation fault injection.
#[derive(Debug)]
pub struct FlakyMetadataStore<S> {
    inner: S,
    reads: Fault,
    writes: Fault,
    deletes: Fault,
}

impl<S: MetadataStore> FlakyMetadataStore<S> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: Fault::new("metadata read"),
            writes: Fault::new("metadata write"),
            deletes: Fault::new("metadata delete"),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fault controls for [`MetadataStore::read_record`].
    pub fn reads(&self) -> &Fault {
        &self.reads
    }

    /// Fault controls for [`MetadataStore::write_record`].
    pub fn writes(&self) -> &Fault {
        &self.writes
    }

    /// Fault controls for [`MetadataStore::delete_record`].
    pub fn deletes(&self) -> &Fault {
        &self.deletes
    }
}

#[async_trait]
impl<S: MetadataStore> MetadataStore for FlakyMetadataStore<S> {
    async fn read_record(&self, key: &[u8]) -> StorageResult<Option<Record>> {
        self.reads.run(self.inner.read_record(key)).await
    }

    async fn write_record(
        &self,
        key: &[u8],
        value: Vec<u8>,
        expected: Option<Version>,
    ) -> StorageResult<Version> {
        self.writes.run(self.inner.write_record(key, value, expected)).await
    }

    async fn delete_record(&self, key: &[u8], expected: Version) -> StorageResult<()> {
        self.deletes.run(self.inner.delete_record(key, expected)).await
    }

    async fn list_keys(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        self.inner.list_keys(prefix).await
    }
}

/// A [`LedgerLog`] wrapper with per-operation fault injection.
#[derive(Debug)]
pub struct FlakyLedgerLog<L> {
    inner: L,
    creates: Fault,
    appends: Fault,
    reads: Fault,
    deletes: Fault,
}

impl<L: LedgerLog> FlakyLedgerLog<L> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            creates: Fault::new("ledger create"),
            appends: Fault::new("ledger append"),
            reads: Fault::new("ledger read"),
            deletes: Fault::new("ledger delete"),
        }
    }

    /// Returns the wrapped log.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Fault controls for [`LedgerLog::create_ledger`].
    pub fn creates(&self) -> &Fault {
        &self.creates
    }

    /// Fault controls for [`LedgerLog::append`].
    pub fn appends(&self) -> &Fault {
        &self.appends
    }

    /// Fault controls for [`LedgerLog::read`].
    pub fn reads(&self) -> &Fault {
        &self.reads
    }

    /// Fault controls for [`LedgerLog::delete`].
    pub fn deletes(&self) -> &Fault {
        &self.deletes
    }
}

#[async_trait]
impl<L: LedgerLog> LedgerLog for FlakyLedgerLog<L> {
    async fn create_ledger(&self) -> StorageResult<LedgerId> {
        self.creates.run(self.inner.create_ledger()).await
    }

    async fn append(&self, ledger_id: LedgerId, data: Bytes) -> StorageResult<u64> {
        self.appends.run(self.inner.append(ledger_id, data)).await
    }

    async fn read(&self, ledger_id: LedgerId, position: u64, length: u64) -> StorageResult<Bytes> {
        self.reads.run(self.inner.read(ledger_id, position, length)).await
    }

    async fn seal(&self, ledger_id: LedgerId) -> StorageResult<u64> {
        self.inner.seal(ledger_id).await
    }

    async fn delete(&self, ledger_id: LedgerId) -> StorageResult<()> {
        self.deletes.run(self.inner.delete(ledger_id)).await
    }
}
