//! The segment storage contract consumed by segment containers.
//!
//! [`SegmentStorage`] is the surface upstream code programs against; it is
//! implemented by [`LedgerChainStorage`](crate::LedgerChainStorage).
//! Handles returned by `open_read` and `open_write` are plain values: a
//! write handle carries the [`WriteToken`] granted when it was opened and
//! stops working once another `open_write` fences it out.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    descriptor::SegmentProperties,
    error::{Result, SegmentError},
    fence::WriteToken,
};

/// A handle to an opened segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHandle {
    name: String,
    token: Option<WriteToken>,
}

impl SegmentHandle {
    pub(crate) fn read_only(name: impl Into<String>) -> Self {
        Self { name: name.into(), token: None }
    }

    pub(crate) fn writable(name: impl Into<String>, token: WriteToken) -> Self {
        Self { name: name.into(), token: Some(token) }
    }

    /// Name of the segment.
    #[must_use]
    pub fn segment_name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the handle was opened with `open_read`.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.token.is_none()
    }

    /// Write token of a handle opened with `open_write`.
    #[must_use]
    pub fn token(&self) -> Option<&WriteToken> {
        self.token.as_ref()
    }

    pub(crate) fn require_token(&self) -> Result<&WriteToken> {
        self.token.as_ref().ok_or_else(|| SegmentError::ReadOnlyHandle { name: self.name.clone() })
    }
}

/// Tier-2 storage of named, append-only segments.
///
/// Every operation completes asynchronously and fails with a typed
/// [`SegmentError`]; no failure is fatal to the process. Abandoning a
/// returned future does not abort work already handed to the collaborators,
/// and an abandoned operation never leaves a partially applied descriptor.
#[async_trait]
pub trait SegmentStorage: Send + Sync {
    /// Makes the storage usable by a container at `container_epoch`.
    ///
    /// Resolves concats interrupted by an earlier crash. Must be called
    /// exactly once, before any other operation.
    async fn initialize(&self, container_epoch: u64) -> Result<()>;

    /// Returns `true` if segment `name` exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Creates an empty, unsealed segment.
    async fn create(&self, name: &str) -> Result<SegmentProperties>;

    /// Opens an existing segment for reading.
    async fn open_read(&self, name: &str) -> Result<SegmentHandle>;

    /// Opens an existing segment for writing, fencing out earlier writers.
    async fn open_write(&self, name: &str) -> Result<SegmentHandle>;

    /// Reads `length` bytes at `offset` into `buffer[buffer_offset..]`.
    ///
    /// Returns the number of bytes read.
    async fn read(
        &self,
        handle: &SegmentHandle,
        offset: u64,
        buffer: &mut [u8],
        buffer_offset: usize,
        length: usize,
    ) -> Result<usize>;

    /// Appends the first `length` bytes of `data` at `offset`, which must be
    /// the current segment length.
    async fn write(&self, handle: &SegmentHandle, offset: u64, data: Bytes, length: usize)
    -> Result<()>;

    /// Seals the segment. Sealing a sealed segment succeeds.
    async fn seal(&self, handle: &SegmentHandle) -> Result<()>;

    /// Appends sealed segment `source` to the handle's segment at `offset`,
    /// which must be the target's current length, and removes `source`.
    async fn concat(&self, target: &SegmentHandle, offset: u64, source: &str) -> Result<()>;

    /// Deletes the segment and releases its storage.
    async fn delete(&self, handle: &SegmentHandle) -> Result<()>;

    /// Returns the current properties of segment `name`.
    async fn get_stream_segment_info(&self, name: &str) -> Result<SegmentProperties>;
}
