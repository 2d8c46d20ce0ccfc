//! Coalescing, retrying save queue in front of a [`StateStore`].
//!
//! At most one write is in flight. Documents saved while a write is
//! pending or running replace each other in a single slot, so a burst of
//! edits costs one write plus at most one follow-up carrying the latest
//! document.

use crate::config::{BackoffKind, TimeslicerConfig};
use crate::model::AppState;
use crate::scheduler::deferred::Deferred;
use crate::store::StateStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Retry and debounce policy for writes.
#[derive(Debug, Clone, PartialEq)]
pub struct SavePolicy {
    /// Attempts per document before it is dropped. At least 1.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub backoff: BackoffKind,
    /// Delay between the first queued save and the write.
    pub debounce: Duration,
    /// Bound on a single write attempt.
    pub attempt_timeout: Duration,
}

impl Default for SavePolicy {
    fn default() -> Self {
        Self::from_config(&TimeslicerConfig::default())
    }
}

impl SavePolicy {
    pub fn from_config(config: &TimeslicerConfig) -> Self {
        Self {
            max_attempts: config.sync.max_save_attempts.max(1),
            retry_delay: Duration::from_millis(config.sync.retry_delay_ms),
            backoff: config.sync.backoff,
            debounce: config.sync.save_debounce(),
            attempt_timeout: config.request_timeout(),
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay(self.retry_delay, attempt)
    }
}

/// Write counters since the client was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    pub completed: u64,
    pub failed_attempts: u64,
    /// Documents given up on after exhausting their attempts.
    pub dropped: u64,
}

#[derive(Default)]
struct SaveSlot {
    saving: bool,
    pending: Option<AppState>,
}

struct Inner {
    store: Arc<dyn StateStore>,
    policy: SavePolicy,
    slot: Mutex<SaveSlot>,
    flush_timer: Deferred,
    busy_tx: watch::Sender<bool>,
    completed: AtomicU64,
    failed_attempts: AtomicU64,
    dropped: AtomicU64,
}

/// Handle to the save queue. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct PersistenceClient {
    inner: Arc<Inner>,
}

impl PersistenceClient {
    pub fn new(store: Arc<dyn StateStore>, policy: SavePolicy) -> Self {
        let (busy_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                policy,
                slot: Mutex::new(SaveSlot::default()),
                flush_timer: Deferred::new(),
                busy_tx,
                completed: AtomicU64::new(0),
                failed_attempts: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.inner.store
    }

    pub fn policy(&self) -> &SavePolicy {
        &self.inner.policy
    }

    /// Queue `state` for writing, replacing any document not yet written.
    ///
    /// Must be called from within a tokio runtime.
    pub fn save(&self, state: AppState) {
        let start_worker = {
            let mut slot = self.inner.lock_slot();
            let replaced = slot.pending.replace(state).is_some();
            if replaced {
                debug!("coalesced pending save");
            }
            if slot.saving {
                false
            } else {
                slot.saving = true;
                self.inner.busy_tx.send_replace(true);
                true
            }
        };

        if start_worker {
            let inner = Arc::clone(&self.inner);
            self.inner
                .flush_timer
                .arm(self.inner.policy.debounce, async move { inner.drain().await });
        }
    }

    /// Whether a write is running or a document is waiting to be written.
    pub fn is_save_in_progress(&self) -> bool {
        let slot = self.inner.lock_slot();
        slot.saving || slot.pending.is_some()
    }

    /// Skip the debounce for anything queued and wait until the queue is
    /// empty (written or dropped).
    pub async fn flush(&self) {
        if self.inner.flush_timer.cancel() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.drain().await });
        }
        self.wait_idle().await;
    }

    /// Wait until no write is running or queued.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.busy_tx.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    pub fn stats(&self) -> SaveStats {
        SaveStats {
            completed: self.inner.completed.load(Ordering::SeqCst),
            failed_attempts: self.inner.failed_attempts.load(Ordering::SeqCst),
            dropped: self.inner.dropped.load(Ordering::SeqCst),
        }
    }
}

impl Inner {
    fn lock_slot(&self) -> std::sync::MutexGuard<'_, SaveSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write pending documents one at a time until none remain.
    async fn drain(&self) {
        loop {
            let next = {
                let mut slot = self.lock_slot();
                match slot.pending.take() {
                    Some(doc) => doc,
                    None => {
                        slot.saving = false;
                        self.busy_tx.send_replace(false);
                        return;
                    }
                }
            };
            self.write_with_retry(&next).await;
        }
    }

    async fn write_with_retry(&self, doc: &AppState) {
        let max = self.policy.max_attempts.max(1);
        for attempt in 1..=max {
            let result =
                tokio::time::timeout(self.policy.attempt_timeout, self.store.save(doc)).await;
            match result {
                Ok(Ok(())) => {
                    self.completed.fetch_add(1, Ordering::SeqCst);
                    debug!(attempt, store = %self.store.describe(), "state saved");
                    return;
                }
                Ok(Err(e)) => {
                    warn!(attempt, max, error = %e, "state save failed");
                }
                Err(_) => {
                    warn!(
                        attempt,
                        max,
                        timeout_ms = self.policy.attempt_timeout.as_millis() as u64,
                        "state save timed out"
                    );
                }
            }
            self.failed_attempts.fetch_add(1, Ordering::SeqCst);

            if attempt < max {
                tokio::time::sleep(self.policy.delay_after(attempt)).await;
            }
        }

        self.dropped.fetch_add(1, Ordering::SeqCst);
        error!(
            attempts = max,
            store = %self.store.describe(),
            "giving up on state save; document dropped"
        );
    }
}
