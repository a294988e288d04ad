//! Named mutual-exclusion leases with TTL and owner identity (spec §4.2).
//!
//! The trait is deliberately narrow so a Redis/DynamoDB-backed
//! implementation is a drop-in replacement for `InMemoryLockManager`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out waiting for lock {key} after {waited_ms}ms")]
    LockTimeout { key: String, waited_ms: u128 },
}

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Non-blocking. `true` iff `key` is free or already held by `owner`
    /// (in which case the TTL is extended).
    async fn acquire(&self, key: &str, ttl: Duration, owner: &str) -> bool;

    /// `true` iff `owner` held the lease.
    async fn release(&self, key: &str, owner: &str) -> bool;

    async fn extend(&self, key: &str, owner: &str, ttl: Duration) -> bool;

    async fn is_locked(&self, key: &str) -> bool;

    /// Reclaim every lease whose TTL has elapsed. Called lazily on every
    /// access and may also be driven by a periodic sweeper task.
    async fn sweep_expired(&self);
}

struct Lease {
    owner: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryLockManager {
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(&self, key: &str, ttl: Duration, owner: &str) -> bool {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        reap_expired(&mut leases, now);

        match leases.get(key) {
            Some(lease) if lease.owner == owner => {
                leases.insert(
                    key.to_string(),
                    Lease {
                        owner: owner.to_string(),
                        expires_at: now + ttl,
                    },
                );
                true
            }
            Some(_) => false,
            None => {
                leases.insert(
                    key.to_string(),
                    Lease {
                        owner: owner.to_string(),
                        expires_at: now + ttl,
                    },
                );
                true
            }
        }
    }

    async fn release(&self, key: &str, owner: &str) -> bool {
        let mut leases = self.leases.lock().await;
        match leases.get(key) {
            Some(lease) if lease.owner == owner => {
                leases.remove(key);
                true
            }
            _ => false,
        }
    }

    async fn extend(&self, key: &str, owner: &str, ttl: Duration) -> bool {
        let mut leases = self.leases.lock().await;
        match leases.get_mut(key) {
            Some(lease) if lease.owner == owner => {
                lease.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        }
    }

    async fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        reap_expired(&mut leases, now);
        leases.contains_key(key)
    }

    async fn sweep_expired(&self) {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        reap_expired(&mut leases, now);
    }
}

fn reap_expired(leases: &mut HashMap<String, Lease>, now: Instant) {
    leases.retain(|_, lease| lease.expires_at > now);
}

/// Polls `acquire` until it succeeds or `max_wait` elapses, runs `f`, and
/// always releases the lease afterward — even if `f` returns an error.
pub async fn with_lock<F, Fut, T, E>(
    manager: &dyn LockManager,
    key: &str,
    owner: &str,
    ttl: Duration,
    max_wait: Duration,
    retry_interval: Duration,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let start = Instant::now();
    loop {
        if manager.acquire(key, ttl, owner).await {
            break;
        }
        if start.elapsed() >= max_wait {
            return Err(LockError::LockTimeout {
                key: key.to_string(),
                waited_ms: start.elapsed().as_millis(),
            }
            .into());
        }
        sleep(retry_interval).await;
    }

    let result = f().await;
    manager.release(key, owner).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_succeeds_when_free_and_blocks_other_owners() {
        let mgr = InMemoryLockManager::new();
        assert!(mgr.acquire("k", Duration::from_secs(5), "owner-a").await);
        assert!(!mgr.acquire("k", Duration::from_secs(5), "owner-b").await);
        assert!(mgr.acquire("k", Duration::from_secs(5), "owner-a").await);
    }

    #[tokio::test]
    async fn release_only_succeeds_for_the_owner() {
        let mgr = InMemoryLockManager::new();
        mgr.acquire("k", Duration::from_secs(5), "owner-a").await;
        assert!(!mgr.release("k", "owner-b").await);
        assert!(mgr.release("k", "owner-a").await);
        assert!(!mgr.is_locked("k").await);
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimed_lazily() {
        let mgr = InMemoryLockManager::new();
        mgr.acquire("k", Duration::from_millis(10), "owner-a").await;
        sleep(Duration::from_millis(30)).await;
        assert!(mgr.acquire("k", Duration::from_secs(5), "owner-b").await);
    }

    #[tokio::test]
    async fn with_lock_runs_closure_and_releases_afterward() {
        let mgr = InMemoryLockManager::new();
        let result: Result<i32, LockError> = with_lock(
            &mgr,
            "k",
            "owner-a",
            Duration::from_secs(5),
            Duration::from_secs(1),
            Duration::from_millis(10),
            || async { Ok(42) },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert!(!mgr.is_locked("k").await);
    }

    #[tokio::test]
    async fn with_lock_times_out_when_held_by_someone_else() {
        let mgr = InMemoryLockManager::new();
        mgr.acquire("k", Duration::from_secs(5), "owner-a").await;

        let result: Result<i32, LockError> = with_lock(
            &mgr,
            "k",
            "owner-b",
            Duration::from_secs(5),
            Duration::from_millis(50),
            Duration::from_millis(10),
            || async { Ok(42) },
        )
        .await;

        assert!(matches!(result, Err(LockError::LockTimeout { .. })));
    }
}
