//! Retry logic for transient collaborator failures and version conflicts.
//!
//! [`with_retry`] wraps a single ledger log or metadata store call and
//! retries it on transient errors (connection failures, timeouts).
//! Non-transient errors (conflict, sealed ledger, not-found) are returned
//! immediately.
//!
//! [`with_cas_retry`] wraps a whole read-modify-write cycle and re-runs it
//! when the conditional write loses a version race.
//!
//! # Backoff Strategy
//!
//! Retries use exponential backoff with jitter:
//! - Base delay doubles with each attempt: `initial_backoff * 2^attempt`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added so that writers contending on one ledger
//!   service do not retry in lockstep

use std::{future::Future, time::Duration};

use fail::fail_point;
use rand::Rng;
use segmentstore_storage::{StorageError, StorageResult};

use crate::{
    config::{CasRetryConfig, RetryConfig},
    error::{Result, SegmentError},
};

/// Executes `operation` with automatic retry on transient errors.
///
/// Returns the result of the first successful call, or the last error
/// if all retry attempts are exhausted.
///
/// # Retry Eligibility
///
/// Only errors where [`StorageError::is_transient`] returns `true` are
/// retried. All other errors are propagated immediately.
#[tracing::instrument(skip(config, operation), fields(max_retries = config.max_retries))]
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let mut last_error: Option<StorageError> = None;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry",
                    );
                }
                return Ok(value);
            },
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = compute_backoff(config, attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying after backoff",
                );
                fail_point!("retry-before-sleep");
                tokio::time::sleep(delay).await;
                last_error = Some(err);
            },
            Err(err) => {
                if attempt > 0 && err.is_transient() {
                    tracing::warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err.detail(),
                        "retries exhausted",
                    );
                }
                return Err(err);
            },
        }
    }

    Err(last_error
        .unwrap_or_else(|| StorageError::internal("retry loop completed without result or error")))
}

/// Retries a read-modify-write cycle on version conflict.
///
/// The `operation` closure performs the full cycle for segment `name`:
/// read the current descriptor, compute the mutation, and write it back
/// conditionally. It receives the zero-based attempt number so the first
/// attempt may start from a cached descriptor while later ones reload.
/// On a [`StorageError::Conflict`] the closure is re-invoked up to
/// `config.max_retries` times with jitter between attempts.
///
/// Non-conflict errors are returned immediately without retry.
///
/// Returns [`SegmentError::ConcurrentModification`] when every attempt
/// conflicts.
#[tracing::instrument(skip(config, operation), fields(max_retries = config.max_retries))]
pub(crate) async fn with_cas_retry<F, Fut, T>(
    config: &CasRetryConfig,
    name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 0..=config.max_retries {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_conflict() && attempt < config.max_retries => {
                let delay = cas_delay(config);
                tracing::debug!(
                    segment = name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "version conflict, retrying after jitter",
                );
                fail_point!("cas-retry-before-sleep");
                tokio::time::sleep(delay).await;
            },
            Err(err) if err.is_conflict() => break,
            Err(err) => return Err(err),
        }
    }

    Err(SegmentError::ConcurrentModification {
        name: name.to_owned(),
        attempts: config.max_retries + 1,
    })
}

fn cas_delay(config: &CasRetryConfig) -> Duration {
    let range = config.base_delay.as_millis() as u64;
    let jitter = if range > 0 {
        Duration::from_millis(rand::rng().random_range(0..=range))
    } else {
        Duration::ZERO
    };
    config.base_delay + jitter
}

/// Computes the backoff duration for the given attempt number.
///
/// Uses exponential backoff with jitter:
/// `min(initial_backoff * 2^attempt, max_backoff) + random(0..50% of delay)`
fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = base.min(config.max_backoff);

    let jitter_range = capped.as_millis() as u64 / 2;
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_millis(jitter)
    } else {
        capped
    }
}
