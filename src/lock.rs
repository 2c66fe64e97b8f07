//! Advisory locks keyed by tenant and resource name.
//!
//! The document store has no transactions, so mutations that must not
//! interleave (session expiry and last-seen refresh) take an advisory lock
//! first. The lock is an explicit capability handed to the code paths that
//! need it; nothing in the crate locks implicitly.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held lock. Dropping the guard releases the lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    _inner: Box<dyn Send + Sync>,
}

impl LockGuard {
    /// Wrap an implementation-specific guard.
    pub fn new<G: Send + Sync + 'static>(guard: G) -> Self {
        Self {
            _inner: Box::new(guard),
        }
    }
}

/// Cooperative mutual exclusion scoped by `(tenant, resource)`.
#[async_trait]
pub trait AdvisoryLock: Send + Sync {
    /// Block until the lock is held.
    async fn acquire(&self, tenant: &str, resource: &str) -> LockGuard;
}

type LockKey = (String, String);

/// In-process [`AdvisoryLock`].
///
/// Suitable for a single server; a cluster needs a lock shared through an
/// external service.
#[derive(Default, Clone)]
pub struct MemoryLocks {
    locks: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

impl MemoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked (held or waited on).
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

struct MemoryGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
    key: LockKey,
}

impl Drop for MemoryGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still references the mutex: nobody holds or waits on it.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[async_trait]
impl AdvisoryLock for MemoryLocks {
    async fn acquire(&self, tenant: &str, resource: &str) -> LockGuard {
        let key = (tenant.to_string(), resource.to_string());
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        LockGuard::new(MemoryGuard {
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
            key,
        })
    }
}
