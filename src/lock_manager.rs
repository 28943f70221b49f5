// =============================================================================
// Lock Manager — per-account exclusive section
// =============================================================================
//
// Guarantees exactly-once state promotion under concurrent events targeting
// the same account: every event acquires this lock before mutating the
// target's window, running L1, reading state, and possibly transitioning —
// and releases it before any L2 arbitrator call is made.
//
// Locks are created lazily and kept for the lifetime of the process (bounded
// by the number of distinct accounts ever seen), mirroring the `setdefault`
// race-free creation in the Python prototype.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutex, one per account. Acquiring the guard for `user_id`
/// serialises every event-processing critical section for that account.
pub struct LockManager {
    locks: SyncMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the per-account lock, blocking until it is available. The
    /// returned guard must be dropped before any L2 arbitrator call so the
    /// critical section stays short.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(user_id);
        lock.lock_owned().await
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn concurrent_events_for_same_user_are_serialised() {
        let manager = Arc::new(LockManager::new());
        let counter = Arc::new(AtomicU32::new(0));
        let max_concurrent = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let manager = manager.clone();
            let counter = counter.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                let _guard = manager.acquire("victim").await;
                let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_users_do_not_contend() {
        let manager = Arc::new(LockManager::new());
        let a = manager.acquire("a").await;
        let b = manager.acquire("b").await;
        drop(a);
        drop(b);
    }
}
