//! Conformance test suite for [`MetadataStore`] and [`LedgerLog`]
//! implementations.
//!
//! The chain manager relies on a small set of collaborator guarantees:
//! conditional writes that reject stale versions, versions that are never
//! reused, prefix-bounded ordered listings, and ledgers that report append
//! positions and refuse appends once sealed. Every implementation, in-memory
//! or networked, can run the same checks.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each function with a fresh
//! instance:
//!
//! ```ignore
//! use segmentstore_storage::{MemoryMetadataStore, conformance};
//!
//! #[tokio::test]
//! async fn metadata_create_if_absent() {
//!     conformance::metadata_create_if_absent(&MemoryMetadataStore::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Functions | Contract aspect |
//! |----------|-----------|-----------------|
//! | Metadata | 6 tests | Conditional write, delete and listing semantics |
//! | Ledger | 6 tests | Append positions, sealing, bounded reads, deletion |
//! | Concurrent | 2 tests | Exactly-one-winner under parallel conditional writes |

use std::sync::Arc;

use bytes::Bytes;

use crate::{error::StorageError, ledger::LedgerLog, metadata::MetadataStore};

// ============================================================================
// Metadata: conditional writes and listings
// ============================================================================

/// A write with no expected version creates the record once.
pub async fn metadata_create_if_absent<S: MetadataStore>(store: &S) {
    let version =
        store.write_record(b"c/a", b"one".to_vec(), None).await.expect("first create succeeds");
    let again = store.write_record(b"c/a", b"two".to_vec(), None).await;
    assert!(matches!(again, Err(StorageError::Conflict)), "second create must conflict: {again:?}");

    let record = store.read_record(b"c/a").await.expect("read").expect("record exists");
    assert_eq!(record.value, Bytes::from_static(b"one"));
    assert_eq!(record.version, version);
}

/// An update must present the stored version.
pub async fn metadata_update_requires_current_version<S: MetadataStore>(store: &S) {
    let v1 = store.write_record(b"u/a", b"1".to_vec(), None).await.expect("create");
    let v2 = store.write_record(b"u/a", b"2".to_vec(), Some(v1)).await.expect("update");
    assert_ne!(v1, v2, "an update must produce a new version");

    let stale = store.write_record(b"u/a", b"3".to_vec(), Some(v1)).await;
    assert!(matches!(stale, Err(StorageError::Conflict)), "stale update must conflict: {stale:?}");
    let record = store.read_record(b"u/a").await.expect("read").expect("record exists");
    assert_eq!(record.value, Bytes::from_static(b"2"));
}

/// Updating a key that does not exist is a conflict, not a create.
pub async fn metadata_update_of_missing_key_conflicts<S: MetadataStore>(store: &S) {
    let v1 = store.write_record(b"m/a", b"1".to_vec(), None).await.expect("create");
    let result = store.write_record(b"m/b", b"1".to_vec(), Some(v1)).await;
    assert!(matches!(result, Err(StorageError::Conflict)), "got {result:?}");
    assert!(store.read_record(b"m/b").await.expect("read").is_none());
}

/// A deleted and recreated record never gets a version seen before.
pub async fn metadata_versions_are_not_reused<S: MetadataStore>(store: &S) {
    let v1 = store.write_record(b"r/a", b"1".to_vec(), None).await.expect("create");
    store.delete_record(b"r/a", v1).await.expect("delete");
    let v2 = store.write_record(b"r/a", b"2".to_vec(), None).await.expect("recreate");
    assert_ne!(v1, v2, "recreated record reused version {v1}");

    let stale = store.delete_record(b"r/a", v1).await;
    assert!(matches!(stale, Err(StorageError::Conflict)), "got {stale:?}");
}

/// Deletes are conditional and report missing keys.
pub async fn metadata_delete_semantics<S: MetadataStore>(store: &S) {
    let missing = store.delete_record(b"d/none", crate::Version(1)).await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })), "got {missing:?}");

    let v1 = store.write_record(b"d/a", b"1".to_vec(), None).await.expect("create");
    store.delete_record(b"d/a", v1).await.expect("delete");
    assert!(store.read_record(b"d/a").await.expect("read").is_none());
}

/// Listings return exactly the keys under the prefix, in byte order.
pub async fn metadata_list_is_prefix_bounded_and_ordered<S: MetadataStore>(store: &S) {
    for key in [&b"ns/b"[..], b"ns/a", b"ns/c", b"nt/a", b"n", b"ns"] {
        store.write_record(key, Vec::new(), None).await.expect("create");
    }
    let keys = store.list_keys(b"ns/").await.expect("list");
    assert_eq!(keys, vec![b"ns/a".to_vec(), b"ns/b".to_vec(), b"ns/c".to_vec()]);
    assert!(store.list_keys(b"zz/").await.expect("list").is_empty());
}

// ============================================================================
// Ledger: append positions, sealing, reads
// ============================================================================

/// Created ledgers get distinct ids and start empty.
pub async fn ledger_ids_are_distinct<L: LedgerLog>(log: &L) {
    let a = log.create_ledger().await.expect("create");
    let b = log.create_ledger().await.expect("create");
    assert_ne!(a, b);
    assert_eq!(log.read(a, 0, 0).await.expect("empty read"), Bytes::new());
}

/// Appends report the position where their bytes start.
pub async fn ledger_append_returns_start_position<L: LedgerLog>(log: &L) {
    let id = log.create_ledger().await.expect("create");
    assert_eq!(log.append(id, Bytes::from_static(b"abc")).await.expect("append"), 0);
    assert_eq!(log.append(id, Bytes::from_static(b"de")).await.expect("append"), 3);
    assert_eq!(log.read(id, 2, 3).await.expect("read"), Bytes::from_static(b"cde"));
}

/// A sealed ledger refuses appends; sealing again reports the same length.
pub async fn ledger_seal_is_final<L: LedgerLog>(log: &L) {
    let id = log.create_ledger().await.expect("create");
    log.append(id, Bytes::from_static(b"abcd")).await.expect("append");
    assert_eq!(log.seal(id).await.expect("seal"), 4);
    assert_eq!(log.seal(id).await.expect("second seal"), 4);

    let result = log.append(id, Bytes::from_static(b"x")).await;
    assert!(matches!(result, Err(StorageError::LedgerSealed { .. })), "got {result:?}");
    assert_eq!(log.read(id, 0, 4).await.expect("read"), Bytes::from_static(b"abcd"));
}

/// Reads past the end fail instead of returning short data.
pub async fn ledger_read_is_bounded<L: LedgerLog>(log: &L) {
    let id = log.create_ledger().await.expect("create");
    log.append(id, Bytes::from_static(b"abc")).await.expect("append");

    let result = log.read(id, 2, 2).await;
    assert!(matches!(result, Err(StorageError::LedgerOutOfRange { .. })), "got {result:?}");
    let result = log.read(id, u64::MAX, 2).await;
    assert!(matches!(result, Err(StorageError::LedgerOutOfRange { .. })), "got {result:?}");
}

/// Deleted ledgers are gone for every operation.
pub async fn ledger_delete_is_final<L: LedgerLog>(log: &L) {
    let id = log.create_ledger().await.expect("create");
    log.delete(id).await.expect("delete");

    let read = log.read(id, 0, 0).await;
    assert!(matches!(read, Err(StorageError::LedgerNotFound { .. })), "got {read:?}");
    let append = log.append(id, Bytes::from_static(b"x")).await;
    assert!(matches!(append, Err(StorageError::LedgerNotFound { .. })), "got {append:?}");
    let again = log.delete(id).await;
    assert!(matches!(again, Err(StorageError::LedgerNotFound { .. })), "got {again:?}");
}

/// Ledgers are independent of each other.
pub async fn ledger_ledgers_are_isolated<L: LedgerLog>(log: &L) {
    let a = log.create_ledger().await.expect("create");
    let b = log.create_ledger().await.expect("create");
    log.append(a, Bytes::from_static(b"aaaa")).await.expect("append");
    log.seal(a).await.expect("seal");

    assert_eq!(log.append(b, Bytes::from_static(b"b")).await.expect("append"), 0);
    assert_eq!(log.read(b, 0, 1).await.expect("read"), Bytes::from_static(b"b"));
}

// ============================================================================
// Concurrent conditional writes
// ============================================================================

/// Of many racing creates of one key, exactly one succeeds.
pub async fn concurrent_creates_have_one_winner<S: MetadataStore + 'static>(store: Arc<S>) {
    let tasks: Vec<_> = (0..16u8)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.write_record(b"race/key", vec![i], None).await })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(_) => winners += 1,
            Err(StorageError::Conflict) => {},
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(winners, 1);
}

/// Of many racing updates from the same version, exactly one succeeds.
pub async fn concurrent_updates_have_one_winner<S: MetadataStore + 'static>(store: Arc<S>) {
    let base = store.write_record(b"race/upd", vec![0], None).await.expect("create");
    let tasks: Vec<_> = (1..=16u8)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.write_record(b"race/upd", vec![i], Some(base)).await })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        if task.await.expect("task panicked").is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

/// Runs every metadata check against fresh stores from `make`.
pub async fn run_metadata_suite<S, F>(make: F)
where
    S: MetadataStore + 'static,
    F: Fn() -> S,
{
    metadata_create_if_absent(&make()).await;
    metadata_update_requires_current_version(&make()).await;
    metadata_update_of_missing_key_conflicts(&make()).await;
    metadata_versions_are_not_reused(&make()).await;
    metadata_delete_semantics(&make()).await;
    metadata_list_is_prefix_bounded_and_ordered(&make()).await;
    concurrent_creates_have_one_winner(Arc::new(make())).await;
    concurrent_updates_have_one_winner(Arc::new(make())).await;
}

/// Runs every ledger check against fresh logs from `make`.
pub async fn run_ledger_suite<L, F>(make: F)
where
    L: LedgerLog,
    F: Fn() -> L,
{
    ledger_ids_are_distinct(&make()).await;
    ledger_append_returns_start_position(&make()).await;
    ledger_seal_is_final(&make()).await;
    ledger_read_is_bounded(&make()).await;
    ledger_delete_is_final(&make()).await;
    ledger_ledgers_are_isolated(&make()).await;
}
