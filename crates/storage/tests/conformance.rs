//! Conformance suite runs for the in-memory collaborators.
//!
//! Each test function corresponds to a single conformance check, providing
//! fine-grained failure reporting. The `run_*_suite` tests exercise the full
//! suites to verify no check is accidentally omitted.

#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use segmentstore_storage::{
    MemoryLedgerLog, MemoryMetadataStore, conformance,
    testutil::{FlakyLedgerLog, FlakyMetadataStore},
};

// ============================================================================
// Metadata store
// ============================================================================

#[tokio::test]
async fn metadata_create_if_absent() {
    conformance::metadata_create_if_absent(&MemoryMetadataStore::new()).await;
}

#[tokio::test]
async fn metadata_update_requires_current_version() {
    conformance::metadata_update_requires_current_version(&MemoryMetadataStore::new()).await;
}

#[tokio::test]
async fn metadata_update_of_missing_key_conflicts() {
    conformance::metadata_update_of_missing_key_conflicts(&MemoryMetadataStore::new()).await;
}

#[tokio::test]
async fn metadata_versions_are_not_reused() {
    conformance::metadata_versions_are_not_reused(&MemoryMetadataStore::new()).await;
}

#[tokio::test]
async fn metadata_delete_semantics() {
    conformance::metadata_delete_semantics(&MemoryMetadataStore::new()).await;
}

#[tokio::test]
async fn metadata_list_is_prefix_bounded_and_ordered() {
    conformance::metadata_list_is_prefix_bounded_and_ordered(&MemoryMetadataStore::new()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_have_one_winner() {
    conformance::concurrent_creates_have_one_winner(Arc::new(MemoryMetadataStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_have_one_winner() {
    conformance::concurrent_updates_have_one_winner(Arc::new(MemoryMetadataStore::new())).await;
}

// ============================================================================
// Ledger log
// ============================================================================

#[tokio::test]
async fn ledger_ids_are_distinct() {
    conformance::ledger_ids_are_distinct(&MemoryLedgerLog::new()).await;
}

#[tokio::test]
async fn ledger_append_returns_start_position() {
    conformance::ledger_append_returns_start_position(&MemoryLedgerLog::new()).await;
}

#[tokio::test]
async fn ledger_seal_is_final() {
    conformance::ledger_seal_is_final(&MemoryLedgerLog::new()).await;
}

#[tokio::test]
async fn ledger_read_is_bounded() {
    conformance::ledger_read_is_bounded(&MemoryLedgerLog::new()).await;
}

#[tokio::test]
async fn ledger_delete_is_final() {
    conformance::ledger_delete_is_final(&MemoryLedgerLog::new()).await;
}

#[tokio::test]
async fn ledger_ledgers_are_isolated() {
    conformance::ledger_ledgers_are_isolated(&MemoryLedgerLog::new()).await;
}

// ============================================================================
// Full suites, including the fault-injecting wrappers with no faults armed
// ============================================================================

#[tokio::test]
async fn run_metadata_suite() {
    conformance::run_metadata_suite(MemoryMetadataStore::new).await;
    conformance::run_metadata_suite(|| FlakyMetadataStore::new(MemoryMetadataStore::new())).await;
}

#[tokio::test]
async fn run_ledger_suite() {
    conformance::run_ledger_suite(MemoryLedgerLog::new).await;
    conformance::run_ledger_suite(|| FlakyLedgerLog::new(MemoryLedgerLog::new())).await;
}
