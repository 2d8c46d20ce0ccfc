//! In-process state store.
//!
//! Holds the document as raw JSON so tests can seed payloads the engine
//! would never write itself (wrong version, string-embedded state). It also
//! records every write and can inject latency and failures.

use crate::error::{Result, TimeslicerError};
use crate::model::AppState;
use crate::store::{StateStore, accept_loaded};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    document: Mutex<Option<Value>>,
    writes: Mutex<Vec<AppState>>,
    latency: Mutex<Duration>,
    fail_saves: AtomicU32,
    fail_loads: AtomicBool,
    loads: AtomicUsize,
    save_attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `state`.
    pub fn with_document(state: &AppState) -> Self {
        let store = Self::new();
        store.seed(state);
        store
    }

    /// Replace the stored document without recording a write.
    pub fn seed(&self, state: &AppState) {
        match serde_json::to_value(state) {
            Ok(value) => self.seed_raw(value),
            Err(e) => tracing::warn!(error = %e, "cannot seed memory store"),
        }
    }

    /// Replace the stored payload with arbitrary JSON.
    pub fn seed_raw(&self, value: Value) {
        *lock(&self.document) = Some(value);
    }

    /// Every successfully written document, oldest first.
    pub fn writes(&self) -> Vec<AppState> {
        lock(&self.writes).clone()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Write attempts including failed ones.
    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }

    /// Highest number of writes observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Decoded current document, if any.
    pub fn current(&self) -> Option<AppState> {
        let value = lock(&self.document).clone()?;
        AppState::from_value(value).ok()
    }

    /// Make the next `n` writes fail with a transport error.
    pub fn fail_next_saves(&self, n: u32) {
        self.fail_saves.store(n, Ordering::SeqCst);
    }

    /// Make every load fail until reset.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Delay applied to every load and write.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    async fn delay(&self) {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<AppState>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(TimeslicerError::Transport("injected load failure".to_owned()));
        }
        let value = lock(&self.document).clone();
        Ok(value.and_then(|v| accept_loaded(v, "memory")))
    }

    async fn save(&self, state: &AppState) -> Result<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        self.delay().await;

        let failing = self
            .fail_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TimeslicerError::Status(503));
        }

        let value = serde_json::to_value(state)
            .map_err(|e| TimeslicerError::Store(format!("cannot serialize state: {e}")))?;
        *lock(&self.document) = Some(value);
        lock(&self.writes).push(state.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}
