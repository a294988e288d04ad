//! `executeIdempotent` (spec §4.4): wraps an arbitrary fallible operation so
//! that repeated calls under the same key either replay the first response
//! or run exactly once at a time.

use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::record::{IdempotencyRecord, IdempotencyState};
use super::store::IdempotencyStore;
use crate::locking::{with_lock, LockError, LockManager};

#[derive(Error, Debug)]
pub enum IdempotencyError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("idempotency store error: {0}")]
    Storage(String),

    #[error("fingerprint mismatch for key {key}: request body differs from the original call")]
    FingerprintMismatch { key: String },

    #[error("underlying operation failed: {0}")]
    Execution(String),

    #[error("cached failure for key {key}: {reason}")]
    CachedFailure { key: String, reason: String },

    #[error("timed out after {attempts} polls waiting for key {key} to reach a terminal state")]
    IdempotencyTimeout { key: String, attempts: u32 },
}

impl From<crate::error::RepositoryError> for IdempotencyError {
    fn from(e: crate::error::RepositoryError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Hashes the canonical-JSON form of `body` with SHA-256. `serde_json`
/// serializes object keys in sorted order by default (no
/// `preserve_order` feature), so two structurally equal bodies always
/// produce the same fingerprint regardless of field order.
pub fn fingerprint(body: &serde_json::Value) -> String {
    let canonical = serde_json::to_vec(body).expect("Value serialization is infallible");
    let digest = Sha256::digest(&canonical);
    hex::encode(digest)
}

/// What the locked branch of `execute` decided, before the distributed
/// lock is released. `Poll` defers the rest of the decision to after
/// the lock is dropped, matching spec §4.4 step 3's "Exists, PROCESSING
/// → release local lock; poll the store".
enum Decision {
    Done(Result<serde_json::Value, IdempotencyError>),
    Poll,
}

pub struct IdempotencyEngine {
    store: Arc<dyn IdempotencyStore>,
    lock_manager: Arc<dyn LockManager>,
    lock_timeout: Duration,
    max_wait: Duration,
    retry_interval: Duration,
    ttl: Duration,
    max_retries: u32,
}

impl IdempotencyEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        lock_manager: Arc<dyn LockManager>,
        lock_timeout: Duration,
        max_wait: Duration,
        retry_interval: Duration,
        ttl: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            lock_manager,
            lock_timeout,
            max_wait,
            retry_interval,
            ttl,
            max_retries,
        }
    }

    /// Runs `op` under the named-lock protection of `key` (spec §4.4). A
    /// first call runs the operation and caches its outcome; a replay
    /// with a matching fingerprint returns the cached response or cached
    /// error without re-running `op`; a replay that lands on an
    /// in-flight record polls for the other caller's outcome instead of
    /// racing it. Records older than `ttl` are treated as absent.
    pub async fn execute<F, Fut, E>(
        &self,
        key: &str,
        body: &serde_json::Value,
        op: F,
    ) -> Result<serde_json::Value, IdempotencyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, E>>,
        E: std::fmt::Display,
    {
        let fp = fingerprint(body);
        let owner = Uuid::new_v4().to_string();
        let store = Arc::clone(&self.store);
        let key_owned = key.to_string();
        let ttl = self.ttl;

        let decision = with_lock(
            self.lock_manager.as_ref(),
            key,
            &owner,
            self.lock_timeout,
            self.max_wait,
            self.retry_interval,
            move || async move {
                let existing = store.get(&key_owned).await?;
                let existing = existing.filter(|r| !r.is_expired(ttl));

                match existing {
                    Some(existing) if existing.fingerprint != fp => Ok(Decision::Done(Err(
                        IdempotencyError::FingerprintMismatch { key: key_owned },
                    ))),
                    Some(existing) if existing.state == IdempotencyState::Completed => Ok(
                        Decision::Done(Ok(existing.response.unwrap_or(serde_json::Value::Null))),
                    ),
                    Some(existing) if existing.state == IdempotencyState::Failed => {
                        Ok(Decision::Done(Err(IdempotencyError::CachedFailure {
                            key: key_owned,
                            reason: existing.error.unwrap_or_default(),
                        })))
                    }
                    Some(_) => Ok(Decision::Poll),
                    None => {
                        store
                            .put(IdempotencyRecord::processing(key_owned.clone(), fp.clone()))
                            .await?;

                        match op().await {
                            Ok(response) => {
                                let mut record =
                                    IdempotencyRecord::processing(key_owned.clone(), fp.clone());
                                record.mark_completed(response.clone());
                                store.put(record).await?;
                                Ok(Decision::Done(Ok(response)))
                            }
                            Err(e) => {
                                let reason = e.to_string();
                                let mut record =
                                    IdempotencyRecord::processing(key_owned.clone(), fp.clone());
                                record.mark_failed(reason.clone());
                                store.put(record).await?;
                                Ok(Decision::Done(Err(IdempotencyError::Execution(reason))))
                            }
                        }
                    }
                }
            },
        )
        .await?;

        match decision {
            Decision::Done(result) => result,
            Decision::Poll => self.poll_for_terminal_state(key).await,
        }
    }

    /// Polls the store every `retry_interval`, up to `max_retries` times,
    /// for the in-flight record to reach COMPLETED or FAILED. Run without
    /// holding the distributed lock, since the owner that is actually
    /// running the operation holds it.
    async fn poll_for_terminal_state(
        &self,
        key: &str,
    ) -> Result<serde_json::Value, IdempotencyError> {
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_interval).await;
            }
            if let Some(record) = self.store.get(key).await? {
                match record.state {
                    IdempotencyState::Completed => {
                        return Ok(record.response.unwrap_or(serde_json::Value::Null))
                    }
                    IdempotencyState::Failed => {
                        return Err(IdempotencyError::CachedFailure {
                            key: key.to_string(),
                            reason: record.error.unwrap_or_default(),
                        })
                    }
                    IdempotencyState::Processing => continue,
                }
            }
        }
        Err(IdempotencyError::IdempotencyTimeout {
            key: key.to_string(),
            attempts: self.max_retries,
        })
    }
}
