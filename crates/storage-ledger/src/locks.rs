//! Per-segment serialization of mutating operations.
//!
//! Writes, seals, concats and deletes of one segment run one at a time
//! inside a process; different segments never share a lock. Locks are
//! created on demand and dropped with their last guard.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub(crate) struct WriteLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl WriteLocks {
    /// Waits for exclusive access to segment `name`.
    ///
    /// The returned guard is owned, so it can move into a spawned task.
    pub(crate) async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        self.lock_for(name).lock_owned().await
    }

    /// Waits for exclusive access to two segments, in name order.
    pub(crate) async fn acquire_pair(
        &self,
        first: &str,
        second: &str,
    ) -> (OwnedMutexGuard<()>, OwnedMutexGuard<()>) {
        let (low, high) = if first <= second { (first, second) } else { (second, first) };
        let low_guard = self.acquire(low).await;
        let high_guard = self.acquire(high).await;
        if first <= second { (low_guard, high_guard) } else { (high_guard, low_guard) }
    }

    fn lock_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(name).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(name.to_owned(), Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}
