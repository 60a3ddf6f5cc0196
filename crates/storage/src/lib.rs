//! Collaborator contracts for tier-2 segment storage.
//!
//! The ledger-chain storage engine sits between two external services it does
//! not own: a replicated, append-only **ledger log** that holds segment bytes,
//! and a consistent **metadata store** that holds the chain descriptors
//! mapping segments onto ledgers. This crate defines both contracts, the
//! canonical error type they report, and in-memory implementations used for
//! tests and single-process deployments.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 segmentstore-storage-ledger                 │
//! │   LedgerChainStorage facade │ chain manager │ chain cache   │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │       MetadataStore          │          LedgerLog           │
//! │ (versioned chain descriptors)│  (append-only ledger units)  │
//! ├──────────────────────────────┼──────────────────────────────┤
//! │   MemoryMetadataStore        │      MemoryLedgerLog         │
//! │   (testing) / external store │ (testing) / external service │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use bytes::Bytes;
//! use segmentstore_storage::{LedgerLog, MemoryLedgerLog, MemoryMetadataStore, MetadataStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let log = MemoryLedgerLog::new();
//!     let ledger = log.create_ledger().await?;
//!     log.append(ledger, Bytes::from_static(b"payload")).await?;
//!
//!     let store = MemoryMetadataStore::new();
//!     let version = store.write_record(b"segments/a", b"{}".to_vec(), None).await?;
//!     let record = store.read_record(b"segments/a").await?.expect("record exists");
//!     assert_eq!(record.version, version);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with fault-injecting collaborator wrappers and
//!   payload helpers. Enable this in `[dev-dependencies]` for integration tests.
//! - **`failpoints`**: Activates `fail` injection sites inside the in-memory implementations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Contract checks shared by collaborator implementations.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod memory_ledger;
pub mod metadata;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use error::{BoxError, ConfigError, StorageError, StorageResult};
pub use ledger::LedgerLog;
pub use memory::MemoryMetadataStore;
pub use memory_ledger::MemoryLedgerLog;
pub use metadata::MetadataStore;
pub use types::{LedgerId, Record, Version};
