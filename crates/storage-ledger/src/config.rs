//! Configuration for the ledger-chain segment storage.
//!
//! [`LedgerStorageConfig`] collects every tunable of the storage: where chain
//! descriptors live in the metadata store, when ledgers roll over, how long
//! an operation may run, and how transient failures and version conflicts
//! are retried. All builders validate their input and return
//! [`ConfigError`] on rejection; configurations loaded through serde are
//! checked with [`LedgerStorageConfig::validate`].

use std::time::Duration;

use segmentstore_storage::ConfigError;
use serde::{Deserialize, Serialize};

/// Default metadata namespace for chain descriptors.
pub const DEFAULT_NAMESPACE: &str = "segmentstore/tier2";

/// Default rollover threshold (1 GiB).
pub const DEFAULT_MAX_LEDGER_SIZE: u64 = 1024 * 1024 * 1024;

/// Default per-operation time limit (30 seconds).
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

const DEFAULT_CAS_MAX_RETRIES: u32 = 5;
const DEFAULT_CAS_BASE_DELAY: Duration = Duration::from_millis(10);

const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

fn positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::MustBePositive { field, value: format!("{value:?}") });
    }
    Ok(())
}

/// Backoff policy for transient collaborator failures.
///
/// Delays grow as `initial_backoff * 2^attempt`, are capped at
/// `max_backoff`, and carry 0–50% random jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Upper bound on any single delay, before jitter.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[bon::bon]
impl RetryConfig {
    /// Creates a validated retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `initial_backoff` is zero or `max_backoff`
    /// is shorter than `initial_backoff`.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RETRIES)] max_retries: u32,
        #[builder(default = DEFAULT_INITIAL_BACKOFF)] initial_backoff: Duration,
        #[builder(default = DEFAULT_MAX_BACKOFF)] max_backoff: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_retries, initial_backoff, max_backoff };
        config.validate()?;
        Ok(config)
    }

    /// Checks the policy invariants.
    ///
    /// # Errors
    ///
    /// See [`RetryConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("retry.initial_backoff", self.initial_backoff)?;
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::BelowMinimum {
                field: "retry.max_backoff",
                value: format!("{:?}", self.max_backoff),
                min: format!("{:?}", self.initial_backoff),
            });
        }
        Ok(())
    }
}

/// Retry policy for version conflicts in read-modify-write cycles.
///
/// Each retry waits `base_delay` plus a random jitter of up to `base_delay`.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CasRetryConfig {
    /// Retries after the first attempt.
    #[builder(default = DEFAULT_CAS_MAX_RETRIES)]
    pub max_retries: u32,

    /// Fixed part of the delay between attempts.
    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_CAS_BASE_DELAY)]
    pub base_delay: Duration,
}

impl Default for CasRetryConfig {
    fn default() -> Self {
        Self { max_retries: DEFAULT_CAS_MAX_RETRIES, base_delay: DEFAULT_CAS_BASE_DELAY }
    }
}

/// Settings of the in-process chain descriptor cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ChainCacheConfig {
    /// Maximum number of cached descriptors.
    pub max_entries: u64,

    /// Time after insertion at which a descriptor is evicted.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Interval of the background eviction sweep.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for ChainCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl: DEFAULT_CACHE_TTL,
            cleanup_interval: DEFAULT_CACHE_CLEANUP_INTERVAL,
        }
    }
}

#[bon::bon]
impl ChainCacheConfig {
    /// Creates a validated cache configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `max_entries` is zero or either duration
    /// is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_CACHE_MAX_ENTRIES)] max_entries: u64,
        #[builder(default = DEFAULT_CACHE_TTL)] ttl: Duration,
        #[builder(default = DEFAULT_CACHE_CLEANUP_INTERVAL)] cleanup_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_entries, ttl, cleanup_interval };
        config.validate()?;
        Ok(config)
    }

    /// Checks the cache invariants.
    ///
    /// # Errors
    ///
    /// See [`ChainCacheConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries < 1 {
            return Err(ConfigError::BelowMinimum {
                field: "cache.max_entries",
                value: self.max_entries.to_string(),
                min: "1".into(),
            });
        }
        positive("cache.ttl", self.ttl)?;
        positive("cache.cleanup_interval", self.cleanup_interval)
    }
}

/// Configuration for [`LedgerChainStorage`](crate::LedgerChainStorage).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use segmentstore_storage_ledger::{LedgerStorageConfig, RetryConfig};
///
/// let config = LedgerStorageConfig::builder()
///     .namespace("tier2/segments")
///     .max_ledger_size(64 * 1024 * 1024)
///     .operation_timeout(Duration::from_secs(10))
///     .retry(RetryConfig::builder().max_retries(5).build()?)
///     .build()?;
/// assert_eq!(config.max_ledger_size(), 64 * 1024 * 1024);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerStorageConfig {
    /// Key prefix of chain descriptors in the metadata store.
    #[serde(default = "default_namespace")]
    pub(crate) namespace: String,

    /// Ledger size at which writes roll over to a new ledger.
    #[serde(default = "default_max_ledger_size")]
    pub(crate) max_ledger_size: u64,

    /// Time limit of one facade operation.
    #[serde(with = "humantime_serde", default = "default_operation_timeout")]
    pub(crate) operation_timeout: Duration,

    /// Backoff policy for transient failures.
    #[serde(default)]
    pub(crate) retry: RetryConfig,

    /// Retry policy for version conflicts.
    #[serde(default)]
    pub(crate) cas_retry: CasRetryConfig,

    /// Chain descriptor cache settings.
    #[serde(default)]
    pub(crate) cache: ChainCacheConfig,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_owned()
}

fn default_max_ledger_size() -> u64 {
    DEFAULT_MAX_LEDGER_SIZE
}

fn default_operation_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

impl Default for LedgerStorageConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            max_ledger_size: DEFAULT_MAX_LEDGER_SIZE,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            retry: RetryConfig::default(),
            cas_retry: CasRetryConfig::default(),
            cache: ChainCacheConfig::default(),
        }
    }
}

#[bon::bon]
impl LedgerStorageConfig {
    /// Creates a new configuration, validating every field.
    ///
    /// # Optional Fields
    ///
    /// * `namespace` - Metadata key prefix (default: `segmentstore/tier2`).
    /// * `max_ledger_size` - Rollover threshold in bytes (default: 1 GiB).
    /// * `operation_timeout` - Per-operation time limit (default: 30 seconds).
    /// * `retry` - Transient failure backoff (default: [`RetryConfig::default`]).
    /// * `cas_retry` - Version conflict retries (default: [`CasRetryConfig::default`]).
    /// * `cache` - Descriptor cache settings (default: [`ChainCacheConfig::default`]).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `namespace` is empty or ends with `/`
    /// - `max_ledger_size` is zero
    /// - `operation_timeout` is zero
    /// - a nested configuration is invalid
    #[builder]
    pub fn new(
        #[builder(into, default = default_namespace())] namespace: String,
        #[builder(default = DEFAULT_MAX_LEDGER_SIZE)] max_ledger_size: u64,
        #[builder(default = DEFAULT_OPERATION_TIMEOUT)] operation_timeout: Duration,
        #[builder(default)] retry: RetryConfig,
        #[builder(default)] cas_retry: CasRetryConfig,
        #[builder(default)] cache: ChainCacheConfig,
    ) -> Result<Self, ConfigError> {
        let config =
            Self { namespace, max_ledger_size, operation_timeout, retry, cas_retry, cache };
        config.validate()?;
        Ok(config)
    }

    /// Checks every field, including nested configurations.
    ///
    /// Call this on configurations obtained through deserialization.
    ///
    /// # Errors
    ///
    /// See [`LedgerStorageConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: "must not be empty".into(),
            });
        }
        if self.namespace.ends_with('/') {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: format!("'{}' must not end with '/'", self.namespace),
            });
        }
        if self.max_ledger_size < 1 {
            return Err(ConfigError::BelowMinimum {
                field: "max_ledger_size",
                value: self.max_ledger_size.to_string(),
                min: "1".into(),
            });
        }
        positive("operation_timeout", self.operation_timeout)?;
        self.retry.validate()?;
        self.cache.validate()
    }

    /// Returns the metadata key prefix.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the rollover threshold in bytes.
    #[must_use]
    pub fn max_ledger_size(&self) -> u64 {
        self.max_ledger_size
    }

    /// Returns the per-operation time limit.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Returns the transient failure backoff policy.
    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the version conflict retry policy.
    #[must_use]
    pub fn cas_retry(&self) -> &CasRetryConfig {
        &self.cas_retry
    }

    /// Returns the descriptor cache settings.
    #[must_use]
    pub fn cache(&self) -> &ChainCacheConfig {
        &self.cache
    }
}
