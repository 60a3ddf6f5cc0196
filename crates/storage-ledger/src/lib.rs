//! Tier-2 segment storage over a ledger log.
//!
//! This crate provides [`LedgerChainStorage`], an implementation of
//! [`SegmentStorage`] that stores every segment as an ordered chain of
//! ledgers. Bytes are appended to ledgers of a [`LedgerLog`]; which ledgers
//! make up a segment, and which slice of each, is recorded in a descriptor
//! kept in a [`MetadataStore`] and changed only through conditional writes.
//!
//! # Features
//!
//! - **Fencing**: `open_write` bumps a per-segment epoch, so a stale writer
//!   fails instead of interleaving bytes with its successor
//! - **Zero-copy concat**: a sealed segment's ledgers are moved onto the
//!   target by rewriting descriptors, never by copying bytes
//! - **Crash safety**: interrupted concats are completed or rolled back by
//!   the recovery scan run at `initialize`
//! - **Bounded retries**: transient collaborator failures are retried with
//!   jittered backoff; version conflicts are retried against a fresh
//!   descriptor
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Segment containers                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  LedgerChainStorage                         │
//! │   (implements SegmentStorage; per-segment locks, timeouts)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  Chain manager                              │
//! │   fence │ write/rollover │ read │ seal │ concat │ recovery  │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  Chain metadata + cache      │  LedgerLog                   │
//! │  (CAS on MetadataStore)      │  (create/append/read/seal)   │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use segmentstore_storage::{MemoryLedgerLog, MemoryMetadataStore};
//! use segmentstore_storage_ledger::{LedgerChainStorage, LedgerStorageConfig, SegmentStorage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LedgerStorageConfig::builder().namespace("tier2/container-7").build()?;
//!     let storage = LedgerChainStorage::new(
//!         config,
//!         Arc::new(MemoryLedgerLog::new()),
//!         Arc::new(MemoryMetadataStore::new()),
//!     )?;
//!     storage.initialize(7).await?;
//!
//!     storage.create("a").await?;
//!     let a = storage.open_write("a").await?;
//!     storage.write(&a, 0, Bytes::from_static(b"tail"), 4).await?;
//!     storage.seal(&a).await?;
//!
//!     storage.create("b").await?;
//!     let b = storage.open_write("b").await?;
//!     storage.write(&b, 0, Bytes::from_static(b"head-"), 5).await?;
//!     storage.concat(&b, 5, "a").await?;
//!
//!     let mut buffer = vec![0u8; 9];
//!     storage.read(&b, 0, &mut buffer, 0, 9).await?;
//!     assert_eq!(buffer, b"head-tail");
//!     assert!(!storage.exists("a").await?);
//!     Ok(())
//! }
//! ```
//!
//! # Descriptor Keys
//!
//! Descriptors live under `{namespace}/{hex(segment name)}`, so any segment
//! name is a valid key and a namespace listing returns exactly the segments
//! of that namespace.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod chain_storage;
mod config;
mod descriptor;
mod error;
mod fence;
mod keys;
mod locks;
mod manager;
mod metadata;
mod mutation;
mod read;
mod recovery;
mod retry;
mod storage;
mod write;

/// Ledger-chain segment storage.
pub use chain_storage::LedgerChainStorage;
/// Configuration types and default constants.
pub use config::{
    CasRetryConfig, ChainCacheConfig, DEFAULT_MAX_LEDGER_SIZE, DEFAULT_NAMESPACE,
    DEFAULT_OPERATION_TIMEOUT, LedgerStorageConfig, RetryConfig,
};
/// Chain descriptor types.
pub use descriptor::{ChainDescriptor, ConcatMarker, LedgerEntry, SegmentProperties};
/// Segment error type and result alias.
pub use error::{Result, SegmentError};
/// Write capability granted by `open_write`.
pub use fence::WriteToken;
/// Outcome of the recovery scan.
pub use recovery::RecoveryReport;
/// Configuration validation error type.
pub use segmentstore_storage::ConfigError;
/// The segment storage contract.
pub use storage::{SegmentHandle, SegmentStorage};
