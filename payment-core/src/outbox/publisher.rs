//! Background publisher: polls for pending outbox rows, publishes each to
//! the event bus, retries transient failures with full-jitter backoff, and
//! periodically sweeps old published rows (spec §4.3).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::entry::OutboxEntry;
use super::store::OutboxStore;
use crate::config::OutboxConfig;
use crate::eventbus::EventBus;

pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventBus>,
    config: OutboxConfig,
}

impl OutboxPublisher {
    pub fn new(store: Arc<dyn OutboxStore>, bus: Arc<dyn EventBus>, config: OutboxConfig) -> Self {
        Self { store, bus, config }
    }

    /// Spawns the polling loop plus, if enabled, a separate cleanup loop,
    /// returning a handle whose `stop` cancels both and waits for any
    /// in-flight tick to finish (spec §4.3: "start/stop are idempotent").
    pub fn spawn(self: Arc<Self>) -> Arc<OutboxPublisherHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = vec![self.clone().spawn_poll_loop(shutdown_rx.clone())];
        if self.config.enable_cleanup {
            tasks.push(self.clone().spawn_cleanup_loop(shutdown_rx));
        }
        Arc::new(OutboxPublisherHandle {
            shutdown_tx,
            tasks: AsyncMutex::new(tasks),
        })
    }

    fn spawn_poll_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_once().await {
                            error!(error = %e, "outbox poll cycle failed");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    }

    fn spawn_cleanup_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.cleanup_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let age = chrono::Duration::from_std(self.config.cleanup_age)
                            .unwrap_or(chrono::Duration::zero());
                        match self.store.cleanup_published_older_than(age).await {
                            Ok(removed) if removed > 0 => {
                                info!(removed, "cleaned up published outbox entries")
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "outbox cleanup failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    }

    pub async fn poll_once(&self) -> Result<(), crate::error::RepositoryError> {
        let pending = self.store.fetch_pending(self.config.batch_size).await?;
        if pending.is_empty() {
            return Ok(());
        }
        debug!(count = pending.len(), "publishing pending outbox entries");

        for entry in pending {
            self.process_entry(entry).await;
        }
        Ok(())
    }

    async fn process_entry(&self, entry: OutboxEntry) {
        match self.store.mark_processing(entry.id).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                error!(error = %e, entry_id = %entry.id, "failed to claim outbox entry");
                return;
            }
        }

        match self.bus.publish(&entry.event).await {
            Ok(()) => {
                if let Err(e) = self.store.mark_published(entry.id).await {
                    error!(error = %e, entry_id = %entry.id, "failed to mark outbox entry published");
                }
            }
            Err(publish_err) => {
                let attempt = entry.attempts + 1;
                if attempt >= self.config.max_retries {
                    warn!(
                        entry_id = %entry.id,
                        attempt,
                        "outbox entry exhausted its retry budget, marking permanently failed"
                    );
                    if let Err(e) = self.store.mark_failed(entry.id, &publish_err.0).await {
                        error!(error = %e, entry_id = %entry.id, "failed to mark outbox entry failed");
                    }
                    return;
                }

                let delay = next_retry_delay(&self.config, entry.attempts);
                let next_retry_at = chrono::Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                debug!(
                    entry_id = %entry.id,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "outbox publish failed, scheduling retry"
                );
                if let Err(e) = self
                    .store
                    .schedule_retry(entry.id, &publish_err.0, next_retry_at)
                    .await
                {
                    error!(error = %e, entry_id = %entry.id, "failed to schedule outbox retry");
                }
            }
        }
    }
}

/// `min(base * 2^attempts, max_delay)` (spec §4.3), persisted as
/// `next_retry_at` rather than slept inline so one slow retry doesn't
/// stall the whole poll tick.
fn next_retry_delay(config: &OutboxConfig, attempts: u32) -> Duration {
    let base_ms = config.retry_base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(2u64.saturating_pow(attempts.min(32)));
    Duration::from_millis(exp_ms.min(config.retry_max_delay.as_millis() as u64))
}

/// Handle returned by [`OutboxPublisher::spawn`]. `stop` is safe to call
/// more than once: the shutdown signal is idempotent to send, and once
/// the background tasks have been joined the task list is empty so a
/// repeat call is a no-op.
pub struct OutboxPublisherHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl OutboxPublisherHandle {
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "outbox background task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventType, PaymentEvent, PaymentId};
    use crate::eventbus::{EventBusError, InMemoryEventBus};
    use crate::outbox::store::InMemoryOutboxStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sample_entry() -> OutboxEntry {
        OutboxEntry::new(PaymentEvent::new(
            PaymentId::new(),
            EventType::PaymentInitiated,
            1,
            json!({}),
            None,
        ))
    }

    #[tokio::test]
    async fn successful_publish_marks_entry_published() {
        let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let entry = sample_entry();
        let id = entry.id;
        store.write(entry).await.unwrap();

        let publisher = OutboxPublisher::new(store.clone(), bus, OutboxConfig::default());
        publisher.poll_once().await.unwrap();

        let pending = store.fetch_pending(10).await.unwrap();
        assert!(pending.iter().all(|e| e.id != id));
    }

    struct FlakyBus {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn publish(&self, _event: &PaymentEvent) -> Result<(), EventBusError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(EventBusError("transient failure".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn transient_failure_leaves_entry_pending_for_retry() {
        let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(FlakyBus {
            failures_left: AtomicU32::new(1),
        });
        let entry = sample_entry();
        let id = entry.id;
        store.write(entry).await.unwrap();

        let mut config = OutboxConfig::default();
        config.retry_base_delay = Duration::from_millis(1);
        config.retry_max_delay = Duration::from_millis(5);
        let publisher = OutboxPublisher::new(store.clone(), bus, config);

        publisher.poll_once().await.unwrap();
        let pending = store.fetch_pending(10).await.unwrap();
        assert!(pending.iter().all(|e| e.id != id), "entry not yet eligible again before next_retry_at");

        tokio::time::sleep(Duration::from_millis(10)).await;
        let pending = store.fetch_pending(10).await.unwrap();
        assert!(pending.iter().any(|e| e.id == id && e.attempts == 1));

        publisher.poll_once().await.unwrap();
        let pending = store.fetch_pending(10).await.unwrap();
        assert!(pending.iter().all(|e| e.id != id));
    }

    #[tokio::test]
    async fn exhausting_retry_budget_marks_entry_permanently_failed() {
        let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(FlakyBus {
            failures_left: AtomicU32::new(100),
        });
        let entry = sample_entry();
        let id = entry.id;
        store.write(entry).await.unwrap();

        let mut config = OutboxConfig::default();
        config.max_retries = 1;
        config.retry_base_delay = Duration::from_millis(1);
        config.retry_max_delay = Duration::from_millis(2);
        let publisher = OutboxPublisher::new(store.clone(), bus, config);

        publisher.poll_once().await.unwrap();

        let pending = store.fetch_pending(10).await.unwrap();
        assert!(pending.iter().all(|e| e.id != id));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_waits_for_in_flight_tick() {
        let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let mut config = OutboxConfig::default();
        config.poll_interval = Duration::from_millis(5);
        config.enable_cleanup = false;
        let publisher = Arc::new(OutboxPublisher::new(store, bus, config));

        let handle = publisher.spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.stop().await;
        handle.stop().await;
    }
}
