//! [`LedgerChainStorage`], the [`SegmentStorage`] implementation over a
//! ledger log and a metadata store.

use std::{
    future::Future,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use segmentstore_storage::{ConfigError, LedgerLog, MetadataStore, StorageError};
use tracing::{Instrument, Span, info, warn};

use crate::{
    config::LedgerStorageConfig,
    descriptor::{ChainDescriptor, SegmentProperties},
    error::{Result, SegmentError},
    locks::WriteLocks,
    manager::ChainManager,
    recovery::RecoveryReport,
    storage::{SegmentHandle, SegmentStorage},
};

/// Segment storage that keeps each segment as a chain of ledgers.
///
/// Segment bytes live in ledgers of a [`LedgerLog`]; the ordered list of
/// ledgers that makes up a segment is a descriptor record in a
/// [`MetadataStore`], updated only by conditional writes. Any number of
/// instances may share the same collaborators and namespace: ownership of a
/// segment is decided by fencing, not by the process that created it.
///
/// Cloning is cheap; clones share state, including the initialized epoch.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use bytes::Bytes;
/// use segmentstore_storage::{MemoryLedgerLog, MemoryMetadataStore};
/// use segmentstore_storage_ledger::{LedgerChainStorage, LedgerStorageConfig, SegmentStorage};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = LedgerChainStorage::new(
///     LedgerStorageConfig::default(),
///     Arc::new(MemoryLedgerLog::new()),
///     Arc::new(MemoryMetadataStore::new()),
/// )?;
/// storage.initialize(1).await?;
///
/// storage.create("orders/0").await?;
/// let handle = storage.open_write("orders/0").await?;
/// storage.write(&handle, 0, Bytes::from_static(b"hello"), 5).await?;
///
/// let mut buffer = [0u8; 5];
/// storage.read(&handle, 0, &mut buffer, 0, 5).await?;
/// assert_eq!(&buffer, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LedgerChainStorage {
    inner: Arc<Inner>,
}

struct Inner {
    manager: ChainManager,
    locks: WriteLocks,
    operation_timeout: Duration,
    container_epoch: OnceLock<u64>,
    recovery: OnceLock<RecoveryReport>,
    initializing: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for LedgerChainStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerChainStorage")
            .field("manager", &self.inner.manager)
            .field("container_epoch", &self.inner.container_epoch.get())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl LedgerChainStorage {
    /// Creates the storage over `log` and `store`.
    ///
    /// The instance is unusable until [`initialize`](SegmentStorage::initialize)
    /// completes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime; the descriptor cache spawns
    /// its sweep task on the current runtime.
    pub fn new(
        config: LedgerStorageConfig,
        log: Arc<dyn LedgerLog>,
        store: Arc<dyn MetadataStore>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let manager = ChainManager::new(&config, log, store);
        Ok(Self {
            inner: Arc::new(Inner {
                manager,
                locks: WriteLocks::default(),
                operation_timeout: config.operation_timeout(),
                container_epoch: OnceLock::new(),
                recovery: OnceLock::new(),
                initializing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Container epoch passed to `initialize`, if it completed.
    #[must_use]
    pub fn container_epoch(&self) -> Option<u64> {
        self.inner.container_epoch.get().copied()
    }

    /// Outcome of the recovery scan run by `initialize`.
    #[must_use]
    pub fn recovery_report(&self) -> Option<RecoveryReport> {
        self.inner.recovery.get().copied()
    }

    /// Returns the persisted descriptor of segment `name`.
    ///
    /// # Errors
    ///
    /// Fails like [`get_stream_segment_info`](SegmentStorage::get_stream_segment_info).
    pub async fn describe(&self, name: &str) -> Result<ChainDescriptor> {
        let name = name.to_owned();
        self.run("describe", move |inner, _| async move {
            let descriptor = inner.manager.metadata.load_fresh(&name).await?;
            Ok(ChainDescriptor::clone(&descriptor))
        })
        .await
    }

    /// Stops the instance.
    ///
    /// Every later operation fails with [`SegmentError::Closed`]. Operations
    /// already running complete normally. Closing twice has no effect.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.manager.metadata.cache().shutdown();
            info!("segment storage closed");
        }
    }

    fn ready(&self) -> Result<u64> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(SegmentError::Closed);
        }
        self.inner.container_epoch.get().copied().ok_or(SegmentError::NotInitialized)
    }

    /// Runs `operation` as a spawned task bounded by the operation timeout.
    ///
    /// On timeout the task is left running; only the caller stops waiting.
    async fn run<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(Arc<Inner>, u64) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let epoch = self.ready()?;
        let task = tokio::spawn(f(Arc::clone(&self.inner), epoch).instrument(Span::current()));

        let timeout = self.inner.operation_timeout;
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(SegmentError::Storage(StorageError::internal(format!(
                "{operation} task failed: {join_err}"
            )))),
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(operation, timeout_ms, "operation timed out; it continues in the background");
                Err(SegmentError::Timeout { operation, timeout_ms })
            },
        }
    }
}

fn require_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SegmentError::invalid_argument("segment name must not be empty"));
    }
    Ok(())
}

#[async_trait]
impl SegmentStorage for LedgerChainStorage {
    #[tracing::instrument(skip(self))]
    async fn initialize(&self, container_epoch: u64) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(SegmentError::Closed);
        }
        if self.inner.initializing.swap(true, Ordering::AcqRel) {
            return Err(SegmentError::invalid_argument("storage is already initialized"));
        }

        let report = match self.inner.manager.recover(container_epoch).await {
            Ok(report) => report,
            Err(err) => {
                self.inner.initializing.store(false, Ordering::Release);
                return Err(err);
            },
        };
        let _ = self.inner.recovery.set(report);
        let _ = self.inner.container_epoch.set(container_epoch);
        info!(container_epoch, "segment storage initialized");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn exists(&self, name: &str) -> Result<bool> {
        let name = name.to_owned();
        self.run("exists", move |inner, _| async move {
            match inner.manager.metadata.load_fresh(&name).await {
                Ok(_) => Ok(true),
                Err(SegmentError::NotFound { .. }) => Ok(false),
                Err(err) => Err(err),
            }
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn create(&self, name: &str) -> Result<SegmentProperties> {
        require_name(name)?;
        let name = name.to_owned();
        self.run("create", move |inner, _| async move {
            let created = inner.manager.create(&name).await?;
            Ok(SegmentProperties::from(created.as_ref()))
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn open_read(&self, name: &str) -> Result<SegmentHandle> {
        let name = name.to_owned();
        self.run("open_read", move |inner, _| async move {
            inner.manager.metadata.load_fresh(&name).await?;
            Ok(SegmentHandle::read_only(name))
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn open_write(&self, name: &str) -> Result<SegmentHandle> {
        let name = name.to_owned();
        self.run("open_write", move |inner, epoch| async move {
            let _guard = inner.locks.acquire(&name).await;
            let token = inner.manager.fence(&name, epoch).await?;
            Ok(SegmentHandle::writable(name, token))
        })
        .await
    }

    #[tracing::instrument(skip(self, handle, buffer), fields(segment = handle.segment_name()))]
    async fn read(
        &self,
        handle: &SegmentHandle,
        offset: u64,
        buffer: &mut [u8],
        buffer_offset: usize,
        length: usize,
    ) -> Result<usize> {
        let end = match buffer_offset.checked_add(length) {
            Some(end) if end <= buffer.len() => end,
            _ => {
                return Err(SegmentError::out_of_bounds(format!(
                    "buffer of {} bytes cannot hold {length} bytes at {buffer_offset}",
                    buffer.len()
                )));
            },
        };

        let name = handle.segment_name().to_owned();
        let bytes = self
            .run("read", move |inner, _| async move {
                inner.manager.read(&name, offset, length as u64).await
            })
            .await?;
        buffer[buffer_offset..end].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    #[tracing::instrument(skip(self, handle, data), fields(segment = handle.segment_name()))]
    async fn write(
        &self,
        handle: &SegmentHandle,
        offset: u64,
        data: Bytes,
        length: usize,
    ) -> Result<()> {
        let token = handle.require_token()?.clone();
        if length > data.len() {
            return Err(SegmentError::out_of_bounds(format!(
                "length {length} exceeds the {} bytes supplied",
                data.len()
            )));
        }
        let data = data.slice(..length);

        let name = handle.segment_name().to_owned();
        self.run("write", move |inner, _| async move {
            let _guard = inner.locks.acquire(&name).await;
            inner.manager.write(&name, &token, offset, data).await.map(|_| ())
        })
        .await
    }

    #[tracing::instrument(skip(self, handle), fields(segment = handle.segment_name()))]
    async fn seal(&self, handle: &SegmentHandle) -> Result<()> {
        let token = handle.require_token()?.clone();
        let name = handle.segment_name().to_owned();
        self.run("seal", move |inner, _| async move {
            let _guard = inner.locks.acquire(&name).await;
            inner.manager.seal(&name, &token).await.map(|_| ())
        })
        .await
    }

    #[tracing::instrument(skip(self, target), fields(segment = target.segment_name()))]
    async fn concat(&self, target: &SegmentHandle, offset: u64, source: &str) -> Result<()> {
        let token = target.require_token()?.clone();
        let name = target.segment_name().to_owned();
        let source = source.to_owned();
        self.run("concat", move |inner, _| async move {
            if source == name {
                // Locking the same name twice would deadlock; the manager
                // rejects the call with a typed error.
                return inner.manager.concat(&name, &token, offset, &source).await.map(|_| ());
            }
            let _guards = inner.locks.acquire_pair(&name, &source).await;
            inner.manager.concat(&name, &token, offset, &source).await.map(|_| ())
        })
        .await
    }

    #[tracing::instrument(skip(self, handle), fields(segment = handle.segment_name()))]
    async fn delete(&self, handle: &SegmentHandle) -> Result<()> {
        let name = handle.segment_name().to_owned();
        self.run("delete", move |inner, epoch| async move {
            let _guard = inner.locks.acquire(&name).await;
            inner.manager.delete(&name, epoch).await
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_stream_segment_info(&self, name: &str) -> Result<SegmentProperties> {
        let name = name.to_owned();
        self.run("get_stream_segment_info", move |inner, _| async move {
            let descriptor = inner.manager.metadata.load_fresh(&name).await?;
            Ok(SegmentProperties::from(descriptor.as_ref()))
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use segmentstore_storage::{MemoryLedgerLog, MemoryMetadataStore};

    use super::*;

    fn storage() -> LedgerChainStorage {
        LedgerChainStorage::new(
            LedgerStorageConfig::default(),
            Arc::new(MemoryLedgerLog::new()),
            Arc::new(MemoryMetadataStore::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn operations_before_initialize_fail() {
        let storage = storage();
        assert!(matches!(storage.exists("a").await, Err(SegmentError::NotInitialized)));
        assert!(matches!(storage.create("a").await, Err(SegmentError::NotInitialized)));
        assert_eq!(storage.container_epoch(), None);
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let storage = storage();
        storage.initialize(3).await.unwrap();
        assert!(matches!(storage.initialize(4).await, Err(SegmentError::InvalidArgument { .. })));
        assert_eq!(storage.container_epoch(), Some(3));
        assert_eq!(storage.recovery_report(), Some(RecoveryReport::default()));
    }

    #[tokio::test]
    async fn closed_storage_rejects_everything() {
        let storage = storage();
        storage.initialize(1).await.unwrap();
        storage.create("a").await.unwrap();
        storage.close();
        storage.close();

        assert!(matches!(storage.exists("a").await, Err(SegmentError::Closed)));
        assert!(matches!(storage.open_read("a").await, Err(SegmentError::Closed)));
        assert!(matches!(storage.initialize(2).await, Err(SegmentError::Closed)));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let storage = storage();
        storage.initialize(1).await.unwrap();
        assert!(matches!(storage.create("").await, Err(SegmentError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = LedgerStorageConfig::default();
        config.max_ledger_size = 0;
        let result = LedgerChainStorage::new(
            config,
            Arc::new(MemoryLedgerLog::new()),
            Arc::new(MemoryMetadataStore::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let storage = storage();
        let clone = storage.clone();
        storage.initialize(1).await.unwrap();
        clone.create("a").await.unwrap();
        assert!(storage.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn describe_returns_persisted_chain() {
        let storage = storage();
        storage.initialize(1).await.unwrap();
        storage.create("a").await.unwrap();
        let handle = storage.open_write("a").await.unwrap();
        storage.write(&handle, 0, Bytes::from_static(b"abc"), 3).await.unwrap();

        let chain = storage.describe("a").await.unwrap();
        assert_eq!(chain.length(), 3);
        assert_eq!(chain.entries().len(), 1);
        assert_eq!(chain.epoch(), handle.token().unwrap().epoch());
    }
}
