//! Integration tests for `LedgerChainStorage` over the in-memory
//! collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use segmentstore_storage::{
    LedgerId, LedgerLog, MemoryLedgerLog, MemoryMetadataStore, MetadataStore, StorageResult,
    testutil::{FaultKind, FlakyLedgerLog, FlakyMetadataStore, make_payload},
};
use segmentstore_storage_ledger::{
    LedgerChainStorage, LedgerStorageConfig, RecoveryReport, RetryConfig, SegmentError,
    SegmentHandle, SegmentStorage,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn fast_retry() -> RetryConfig {
    RetryConfig::builder()
        .max_retries(3)
        .initial_backoff(Duration::from_millis(1))
        .max_backoff(Duration::from_millis(5))
        .build()
        .expect("valid retry config")
}

fn config(max_ledger_size: u64) -> LedgerStorageConfig {
    LedgerStorageConfig::builder()
        .max_ledger_size(max_ledger_size)
        .retry(fast_retry())
        .build()
        .expect("valid config")
}

async fn started(
    config: LedgerStorageConfig,
    log: Arc<dyn LedgerLog>,
    store: Arc<dyn MetadataStore>,
    epoch: u64,
) -> LedgerChainStorage {
    let storage = LedgerChainStorage::new(config, log, store).expect("storage");
    storage.initialize(epoch).await.expect("initialize");
    storage
}

async fn memory_storage(max_ledger_size: u64) -> (LedgerChainStorage, MemoryLedgerLog) {
    let log = MemoryLedgerLog::new();
    let storage = started(
        config(max_ledger_size),
        Arc::new(log.clone()),
        Arc::new(MemoryMetadataStore::new()),
        1,
    )
    .await;
    (storage, log)
}

async fn written(storage: &LedgerChainStorage, name: &str, data: &[u8]) -> SegmentHandle {
    storage.create(name).await.expect("create");
    let handle = storage.open_write(name).await.expect("open_write");
    storage
        .write(&handle, 0, Bytes::copy_from_slice(data), data.len())
        .await
        .expect("write");
    handle
}

async fn read_all(storage: &LedgerChainStorage, name: &str) -> Vec<u8> {
    let length = storage.get_stream_segment_info(name).await.expect("info").length;
    let handle = storage.open_read(name).await.expect("open_read");
    let mut buffer = vec![0u8; usize::try_from(length).unwrap()];
    let buffer_len = buffer.len();
    let read = storage.read(&handle, 0, &mut buffer, 0, buffer_len).await.expect("read");
    assert_eq!(read, buffer.len());
    buffer
}

/// A ledger log whose appends take `delay` to complete.
struct SlowLedgerLog {
    inner: MemoryLedgerLog,
    delay: Duration,
}

#[async_trait]
impl LedgerLog for SlowLedgerLog {
    async fn create_ledger(&self) -> StorageResult<LedgerId> {
        self.inner.create_ledger().await
    }

    async fn append(&self, ledger_id: LedgerId, data: Bytes) -> StorageResult<u64> {
        tokio::time::sleep(self.delay).await;
        self.inner.append(ledger_id, data).await
    }

    async fn read(&self, ledger_id: LedgerId, position: u64, length: u64) -> StorageResult<Bytes> {
        self.inner.read(ledger_id, position, length).await
    }

    async fn seal(&self, ledger_id: LedgerId) -> StorageResult<u64> {
        self.inner.seal(ledger_id).await
    }

    async fn delete(&self, ledger_id: LedgerId) -> StorageResult<()> {
        self.inner.delete(ledger_id).await
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_create_then_info_reports_empty_segment() {
    let (storage, _) = memory_storage(1024).await;

    let created = storage.create("s").await.expect("create");
    assert_eq!(created.name, "s");
    assert_eq!(created.length, 0);
    assert!(!created.sealed);

    let info = storage.get_stream_segment_info("s").await.expect("info");
    assert_eq!(info.length, 0);
    assert!(storage.exists("s").await.unwrap());
}

#[tokio::test]
async fn test_create_existing_segment_fails() {
    let (storage, _) = memory_storage(1024).await;
    storage.create("s").await.unwrap();

    assert!(matches!(storage.create("s").await, Err(SegmentError::Exists { .. })));
}

#[tokio::test]
async fn test_missing_segment_is_not_found() {
    let (storage, _) = memory_storage(1024).await;

    assert!(!storage.exists("missing").await.unwrap());
    assert!(matches!(storage.open_read("missing").await, Err(SegmentError::NotFound { .. })));
    assert!(matches!(storage.open_write("missing").await, Err(SegmentError::NotFound { .. })));
    assert!(matches!(
        storage.get_stream_segment_info("missing").await,
        Err(SegmentError::NotFound { .. })
    ));
}

// ============================================================================
// Write and Read
// ============================================================================

#[tokio::test]
async fn test_sequential_writes_read_back_across_ledgers() {
    let (storage, log) = memory_storage(8).await;
    storage.create("s").await.unwrap();
    let handle = storage.open_write("s").await.unwrap();

    let mut expected = Vec::new();
    for seed in 0..5u8 {
        let chunk = make_payload(seed, 7);
        storage
            .write(&handle, expected.len() as u64, Bytes::from(chunk.clone()), chunk.len())
            .await
            .expect("write");
        expected.extend_from_slice(&chunk);
    }

    assert_eq!(read_all(&storage, "s").await, expected);
    assert!(log.ledger_count() > 1, "writes should have rolled over");
    assert_eq!(storage.get_stream_segment_info("s").await.unwrap().length, 35);
}

#[tokio::test]
async fn test_read_into_buffer_offset() {
    let (storage, _) = memory_storage(1024).await;
    let handle = written(&storage, "s", b"0123456789").await;

    let mut buffer = [b'.'; 8];
    let read = storage.read(&handle, 4, &mut buffer, 2, 5).await.unwrap();
    assert_eq!(read, 5);
    assert_eq!(&buffer, b"..45678.");
}

#[tokio::test]
async fn test_write_uses_only_requested_length() {
    let (storage, _) = memory_storage(1024).await;
    storage.create("s").await.unwrap();
    let handle = storage.open_write("s").await.unwrap();

    storage.write(&handle, 0, Bytes::from_static(b"abcdef"), 3).await.unwrap();
    assert_eq!(read_all(&storage, "s").await, b"abc");
}

#[tokio::test]
async fn test_write_at_wrong_offset_is_bad_offset() {
    let (storage, _) = memory_storage(1024).await;
    let handle = written(&storage, "s", b"abc").await;

    let result = storage.write(&handle, 1, Bytes::from_static(b"x"), 1).await;
    assert!(matches!(result, Err(SegmentError::BadOffset { expected: 3, actual: 1, .. })));
    assert_eq!(read_all(&storage, "s").await, b"abc");
}

#[tokio::test]
async fn test_read_past_end_is_out_of_range() {
    let (storage, _) = memory_storage(1024).await;
    let handle = written(&storage, "s", b"abc").await;

    let mut buffer = [0u8; 8];
    let result = storage.read(&handle, 2, &mut buffer, 0, 4).await;
    assert!(matches!(result, Err(SegmentError::OutOfRange { segment_length: 3, .. })));
}

#[tokio::test]
async fn test_argument_bounds_are_checked_before_io() {
    let (storage, _) = memory_storage(1024).await;
    let handle = written(&storage, "s", b"abc").await;

    let mut buffer = [0u8; 4];
    let result = storage.read(&handle, 0, &mut buffer, 2, 3).await;
    assert!(matches!(result, Err(SegmentError::OutOfBounds { .. })));
    let result = storage.read(&handle, 0, &mut buffer, usize::MAX, 1).await;
    assert!(matches!(result, Err(SegmentError::OutOfBounds { .. })));

    let result = storage.write(&handle, 3, Bytes::from_static(b"xy"), 3).await;
    assert!(matches!(result, Err(SegmentError::OutOfBounds { .. })));
}

#[tokio::test]
async fn test_read_only_handle_cannot_mutate() {
    let (storage, _) = memory_storage(1024).await;
    written(&storage, "s", b"abc").await;
    let reader = storage.open_read("s").await.unwrap();
    assert!(reader.is_read_only());

    let write = storage.write(&reader, 3, Bytes::from_static(b"x"), 1).await;
    assert!(matches!(write, Err(SegmentError::ReadOnlyHandle { .. })));
    assert!(matches!(storage.seal(&reader).await, Err(SegmentError::ReadOnlyHandle { .. })));
    assert!(matches!(
        storage.concat(&reader, 3, "other").await,
        Err(SegmentError::ReadOnlyHandle { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_writes_at_same_offset_admit_one() {
    let (storage, _) = memory_storage(1024).await;
    storage.create("s").await.unwrap();
    let handle = storage.open_write("s").await.unwrap();

    let tasks: Vec<_> = (0..4u8)
        .map(|seed| {
            let storage = storage.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                storage.write(&handle, 0, Bytes::from(make_payload(seed, 5)), 5).await
            })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(SegmentError::BadOffset { expected: 5, .. }) => {},
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(storage.get_stream_segment_info("s").await.unwrap().length, 5);
}

// ============================================================================
// Fencing
// ============================================================================

#[tokio::test]
async fn test_second_writer_fences_out_first() {
    let log: Arc<dyn LedgerLog> = Arc::new(MemoryLedgerLog::new());
    let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
    let old = started(config(1024), Arc::clone(&log), Arc::clone(&store), 1).await;
    let new = started(config(1024), log, store, 2).await;

    let stale = written(&old, "s", b"abc").await;
    let current = new.open_write("s").await.unwrap();
    assert!(current.token().unwrap().epoch() > stale.token().unwrap().epoch());

    let result = old.write(&stale, 3, Bytes::from_static(b"lost"), 4).await;
    assert!(matches!(result, Err(SegmentError::FencedOut { .. })));
    assert!(matches!(old.seal(&stale).await, Err(SegmentError::FencedOut { .. })));

    new.write(&current, 3, Bytes::from_static(b"kept"), 4).await.unwrap();
    assert_eq!(read_all(&old, "s").await, b"abckept");
}

#[tokio::test]
async fn test_racing_open_write_leaves_one_valid_token() {
    let log: Arc<dyn LedgerLog> = Arc::new(MemoryLedgerLog::new());
    let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
    let a = started(config(1024), Arc::clone(&log), Arc::clone(&store), 1).await;
    let b = started(config(1024), log, store, 2).await;
    a.create("s").await.unwrap();

    let (ha, hb) = tokio::join!(a.open_write("s"), b.open_write("s"));
    let (ha, hb) = (ha.unwrap(), hb.unwrap());
    assert_ne!(ha.token().unwrap().epoch(), hb.token().unwrap().epoch());

    let wa = a.write(&ha, 0, Bytes::from_static(b"a"), 1).await;
    let wb = b.write(&hb, 0, Bytes::from_static(b"b"), 1).await;
    let fenced = [&wa, &wb]
        .iter()
        .filter(|result| matches!(result, Err(SegmentError::FencedOut { .. })))
        .count();
    assert_eq!(fenced, 1, "exactly one writer must be fenced: {wa:?} {wb:?}");
    assert_eq!(b.get_stream_segment_info("s").await.unwrap().length, 1);
}

// ============================================================================
// Seal, Concat, Delete
// ============================================================================

#[tokio::test]
async fn test_seal_is_idempotent_and_blocks_writes() {
    let (storage, _) = memory_storage(1024).await;
    let handle = written(&storage, "s", b"abc").await;

    storage.seal(&handle).await.unwrap();
    storage.seal(&handle).await.unwrap();

    let info = storage.get_stream_segment_info("s").await.unwrap();
    assert!(info.sealed);
    let result = storage.write(&handle, 3, Bytes::from_static(b"x"), 1).await;
    assert!(matches!(result, Err(SegmentError::Sealed { .. })));
    assert!(matches!(storage.open_write("s").await, Err(SegmentError::Sealed { .. })));
    assert_eq!(read_all(&storage, "s").await, b"abc");
}

#[tokio::test]
async fn test_concat_appends_source_and_removes_it() {
    let (storage, _) = memory_storage(1024).await;
    let source_bytes = make_payload(1, 10);
    let target_bytes = make_payload(2, 20);

    let a = written(&storage, "a", &source_bytes).await;
    storage.seal(&a).await.unwrap();
    let b = written(&storage, "b", &target_bytes).await;

    storage.concat(&b, 20, "a").await.unwrap();

    let mut expected = target_bytes.clone();
    expected.extend_from_slice(&source_bytes);
    assert_eq!(read_all(&storage, "b").await, expected);
    assert!(!storage.exists("a").await.unwrap());

    // Writes continue after the concatenated bytes.
    storage.write(&b, 30, Bytes::from_static(b"!"), 1).await.unwrap();
    assert_eq!(storage.get_stream_segment_info("b").await.unwrap().length, 31);
}

#[tokio::test]
async fn test_concat_retry_after_success_is_noop() {
    let (storage, _) = memory_storage(1024).await;
    let a = written(&storage, "a", b"tail").await;
    storage.seal(&a).await.unwrap();
    let b = written(&storage, "b", b"head").await;

    storage.concat(&b, 4, "a").await.unwrap();
    storage.concat(&b, 4, "a").await.expect("repeated concat should succeed");
    assert_eq!(read_all(&storage, "b").await, b"headtail");

    let result = storage.concat(&b, 8, "a").await;
    assert!(matches!(result, Err(SegmentError::NotFound { .. })));
}

#[tokio::test]
async fn test_concat_preconditions() {
    let (storage, _) = memory_storage(1024).await;
    let a = written(&storage, "a", b"open").await;
    let b = written(&storage, "b", b"head").await;

    assert!(matches!(storage.concat(&b, 4, "a").await, Err(SegmentError::NotSealed { .. })));
    storage.seal(&a).await.unwrap();
    assert!(matches!(
        storage.concat(&b, 3, "a").await,
        Err(SegmentError::BadOffset { expected: 4, .. })
    ));
    assert!(matches!(
        storage.concat(&b, 4, "b").await,
        Err(SegmentError::InvalidArgument { .. })
    ));
    assert!(matches!(storage.concat(&b, 4, "zzz").await, Err(SegmentError::NotFound { .. })));

    // Failed attempts leave the source untouched and concatenable.
    assert!(storage.describe("a").await.unwrap().merged_into().is_none());
    storage.concat(&b, 4, "a").await.unwrap();
    assert_eq!(read_all(&storage, "b").await, b"headopen");
}

#[tokio::test]
async fn test_concat_onto_sealed_target_fails() {
    let (storage, _) = memory_storage(1024).await;
    let a = written(&storage, "a", b"aa").await;
    storage.seal(&a).await.unwrap();
    let b = written(&storage, "b", b"bb").await;
    storage.seal(&b).await.unwrap();

    assert!(matches!(storage.concat(&b, 2, "a").await, Err(SegmentError::Sealed { .. })));
    assert!(storage.exists("a").await.unwrap());
    assert!(storage.describe("a").await.unwrap().merged_into().is_none());
}

#[tokio::test]
async fn test_delete_releases_ledgers() {
    let (storage, log) = memory_storage(4).await;
    let handle = written(&storage, "s", &make_payload(0, 4)).await;
    for seed in 1..4u8 {
        let offset = u64::from(seed) * 4;
        storage.write(&handle, offset, Bytes::from(make_payload(seed, 4)), 4).await.unwrap();
    }
    assert_eq!(log.ledger_count(), 4);

    let reader = storage.open_read("s").await.unwrap();
    storage.delete(&reader).await.unwrap();

    assert!(!storage.exists("s").await.unwrap());
    assert_eq!(log.ledger_count(), 0);
    assert!(matches!(storage.delete(&reader).await, Err(SegmentError::NotFound { .. })));
}

#[tokio::test]
async fn test_delete_after_concat_releases_moved_ledgers_once() {
    let (storage, log) = memory_storage(4).await;
    let a = written(&storage, "a", &make_payload(0, 6)).await;
    storage.seal(&a).await.unwrap();
    let b = written(&storage, "b", &make_payload(1, 6)).await;
    storage.concat(&b, 6, "a").await.unwrap();
    let ledgers = log.ledger_count();
    assert_eq!(storage.describe("b").await.unwrap().entries().len(), ledgers);

    storage.delete(&b).await.unwrap();
    assert_eq!(log.ledger_count(), 0);
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test]
async fn test_reinitialize_completes_interrupted_concat() {
    let log: Arc<dyn LedgerLog> = Arc::new(MemoryLedgerLog::new());
    let store = Arc::new(FlakyMetadataStore::new(MemoryMetadataStore::new()));
    let first = started(config(1024), Arc::clone(&log), store.clone(), 1).await;

    let a = written(&first, "a", b"tail").await;
    first.seal(&a).await.unwrap();
    let b = written(&first, "b", b"head").await;
    store.deletes().fail_next(1, FaultKind::Permanent);
    assert!(first.concat(&b, 4, "a").await.is_err());
    first.close();

    let second = started(config(1024), log, store, 2).await;
    assert_eq!(
        second.recovery_report(),
        Some(RecoveryReport { scanned: 2, completed: 1, rolled_back: 0, corrupt: 0 })
    );
    assert!(!second.exists("a").await.unwrap());
    assert_eq!(read_all(&second, "b").await, b"headtail");
}

#[tokio::test]
async fn test_retrying_interrupted_concat_finishes_it() {
    let log: Arc<dyn LedgerLog> = Arc::new(MemoryLedgerLog::new());
    let store = Arc::new(FlakyMetadataStore::new(MemoryMetadataStore::new()));
    let storage = started(config(1024), log, store.clone(), 1).await;

    let a = written(&storage, "a", b"tail").await;
    storage.seal(&a).await.unwrap();
    let b = written(&storage, "b", b"head").await;
    store.deletes().fail_next(1, FaultKind::Permanent);
    assert!(storage.concat(&b, 4, "a").await.is_err());

    storage.concat(&b, 4, "a").await.expect("retry should finish the concat");
    assert!(!storage.exists("a").await.unwrap());
    assert_eq!(read_all(&storage, "b").await, b"headtail");
}

#[tokio::test]
async fn test_concat_with_lost_acknowledgement_keeps_one_owner() {
    let log: Arc<dyn LedgerLog> = Arc::new(MemoryLedgerLog::new());
    let store = Arc::new(FlakyMetadataStore::new(MemoryMetadataStore::new()));
    let storage = started(config(1024), log, store.clone(), 1).await;

    let a = written(&storage, "a", b"tail").await;
    storage.seal(&a).await.unwrap();
    let b = written(&storage, "b", b"head").await;

    // The target extend is the second metadata write of the concat.
    store.writes().fail_nth(2, 1, FaultKind::LostAck);
    storage.concat(&b, 4, "a").await.expect("concat should report the applied extend");
    assert!(!storage.exists("a").await.unwrap());

    // The source is gone, so deleting it cannot release the target's ledgers.
    assert!(matches!(storage.delete(&a).await, Err(SegmentError::NotFound { .. })));
    assert_eq!(read_all(&storage, "b").await, b"headtail");
}

#[tokio::test]
async fn test_initialize_ignores_nested_namespace() {
    let log: Arc<dyn LedgerLog> = Arc::new(MemoryLedgerLog::new());
    let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
    let namespaced = |namespace: &str| {
        LedgerStorageConfig::builder()
            .namespace(namespace)
            .retry(fast_retry())
            .build()
            .expect("valid config")
    };

    let child = started(namespaced("tier2/container-7"), Arc::clone(&log), Arc::clone(&store), 1).await;
    written(&child, "x", b"x").await;

    let parent = started(namespaced("tier2"), log, store, 1).await;
    assert_eq!(parent.recovery_report(), Some(RecoveryReport::default()));
    assert!(!parent.exists("x").await.unwrap());
    assert!(child.exists("x").await.unwrap());
}

// ============================================================================
// Retry Bounds and Timeouts
// ============================================================================

#[tokio::test]
async fn test_transient_append_failures_are_retried() {
    let log = Arc::new(FlakyLedgerLog::new(MemoryLedgerLog::new()));
    let storage =
        started(config(1024), log.clone(), Arc::new(MemoryMetadataStore::new()), 1).await;
    storage.create("s").await.unwrap();
    let handle = storage.open_write("s").await.unwrap();

    log.appends().fail_next(2, FaultKind::Transient);
    storage.write(&handle, 0, Bytes::from_static(b"abc"), 3).await.expect("write");
    assert_eq!(log.appends().calls(), 3);
    assert_eq!(read_all(&storage, "s").await, b"abc");
}

#[tokio::test]
async fn test_exhausted_retries_surface_retryable_error() {
    let log = Arc::new(FlakyLedgerLog::new(MemoryLedgerLog::new()));
    let storage =
        started(config(1024), log.clone(), Arc::new(MemoryMetadataStore::new()), 1).await;
    storage.create("s").await.unwrap();
    let handle = storage.open_write("s").await.unwrap();

    log.appends().fail_next(u32::MAX, FaultKind::Transient);
    let err = storage.write(&handle, 0, Bytes::from_static(b"abc"), 3).await.unwrap_err();
    assert!(err.is_retryable(), "expected a retryable error, got {err}");
    assert_eq!(log.appends().calls(), 4);
    assert_eq!(storage.get_stream_segment_info("s").await.unwrap().length, 0);

    log.appends().clear();
    storage.write(&handle, 0, Bytes::from_static(b"abc"), 3).await.expect("write after recovery");
    assert_eq!(read_all(&storage, "s").await, b"abc");
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let log = Arc::new(FlakyLedgerLog::new(MemoryLedgerLog::new()));
    let storage =
        started(config(1024), log.clone(), Arc::new(MemoryMetadataStore::new()), 1).await;
    storage.create("s").await.unwrap();
    let handle = storage.open_write("s").await.unwrap();

    log.creates().fail_next(1, FaultKind::Permanent);
    let err = storage.write(&handle, 0, Bytes::from_static(b"abc"), 3).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(log.creates().calls(), 1);
}

#[tokio::test]
async fn test_timeout_leaves_operation_running() {
    let config = LedgerStorageConfig::builder()
        .operation_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let log = Arc::new(SlowLedgerLog { inner: MemoryLedgerLog::new(), delay: Duration::from_millis(200) });
    let storage = started(config, log, Arc::new(MemoryMetadataStore::new()), 1).await;
    storage.create("s").await.unwrap();
    let handle = storage.open_write("s").await.unwrap();

    let result = storage.write(&handle, 0, Bytes::from_static(b"late"), 4).await;
    assert!(matches!(result, Err(SegmentError::Timeout { operation: "write", timeout_ms: 50 })));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(storage.get_stream_segment_info("s").await.unwrap().length, 4);
}

// ============================================================================
// Property Tests
// ============================================================================

mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn sequential_writes_read_back(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..24), 1..12),
            max_ledger_size in 1u64..40,
            window in (0usize..256, 0usize..64),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let (storage, _) = memory_storage(max_ledger_size).await;
                storage.create("s").await.unwrap();
                let handle = storage.open_write("s").await.unwrap();

                let mut expected = Vec::new();
                for chunk in &chunks {
                    storage
                        .write(&handle, expected.len() as u64, Bytes::from(chunk.clone()), chunk.len())
                        .await
                        .unwrap();
                    expected.extend_from_slice(chunk);
                }
                prop_assert_eq!(read_all(&storage, "s").await, expected.clone());

                let start = window.0.min(expected.len());
                let length = window.1.min(expected.len() - start);
                let mut buffer = vec![0u8; length];
                storage.read(&handle, start as u64, &mut buffer, 0, length).await.unwrap();
                prop_assert_eq!(&buffer[..], &expected[start..start + length]);
                Ok(())
            })?;
        }
    }
}
