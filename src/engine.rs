//! Reconciliation engine.
//!
//! Owns the in-memory document and decides when local commits are written
//! and when a remote document may replace local state.
//!
//! # Ordering rules
//!
//! - Commits apply in issue order under a mutex that is never held across
//!   an await. The resulting document is queued for saving before that
//!   mutex is released.
//! - Nothing is written before hydration has finished.
//! - A remote read is dropped if a save is queued or running when it
//!   completes, or if a commit happened within the reconcile window of the
//!   read starting.

use crate::clock::{Clock, SystemClock};
use crate::config::TimeslicerConfig;
use crate::error::Result;
use crate::model::{AppState, Task, TaskId, TaskKind};
use crate::mutations;
use crate::persistence::{PersistenceClient, SavePolicy};
use crate::rollover::rollover;
use crate::store::StateStore;
use crate::timekey::TimeKeys;
use crate::transfer::{export_state_json, import_state_json};
use chrono_tz::Tz;
use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of [`SyncEngine::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The mutator did not change the document.
    Unchanged,
    /// Applied in memory only; the engine has not hydrated yet.
    LocalOnly,
    /// Applied and queued for writing.
    Scheduled,
}

impl CommitOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Result of [`SyncEngine::hydrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateOutcome {
    /// A stored document was adopted.
    Loaded,
    /// Nothing usable was stored; started from an empty document.
    NotFound,
    /// The load failed; started from an empty document.
    Failed,
    AlreadyHydrated,
}

/// Why a remote reload was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotHydrated,
    SaveInProgress,
    RecentCommit,
}

/// Result of [`SyncEngine::reconcile_from_remote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The remote document replaced local state.
    Applied,
    /// The remote document matched local state.
    UpToDate,
    /// Nothing usable is stored remotely; local state kept.
    NotFound,
    /// Not fetched.
    Skipped(SkipReason),
    /// Fetched, then dropped by a staleness guard.
    Discarded(SkipReason),
    /// The load failed; local state kept.
    Failed,
}

struct EngineState {
    doc: AppState,
    hydrated: bool,
    hydration_started: bool,
    last_commit: Option<Instant>,
}

pub struct SyncEngine {
    persistence: PersistenceClient,
    clock: Arc<dyn Clock>,
    zone: Tz,
    reconcile_window: Duration,
    load_timeout: Duration,
    inner: Mutex<EngineState>,
}

impl SyncEngine {
    /// Create an engine over `store` using the system clock.
    ///
    /// # Errors
    ///
    /// Returns a config error if the configured time zone is unknown.
    pub fn new(store: Arc<dyn StateStore>, config: &TimeslicerConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit wall clock.
    ///
    /// # Errors
    ///
    /// Returns a config error if the configured time zone is unknown.
    pub fn with_clock(
        store: Arc<dyn StateStore>,
        config: &TimeslicerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let zone = config.time.zone()?;
        let keys = TimeKeys::at(clock.now(), zone);
        Ok(Self {
            persistence: PersistenceClient::new(store, SavePolicy::from_config(config)),
            clock,
            zone,
            reconcile_window: config.sync.reconcile_debounce(),
            load_timeout: config.request_timeout(),
            inner: Mutex::new(EngineState {
                doc: AppState::blank(&keys),
                hydrated: false,
                hydration_started: false,
                last_commit: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `mutator` to the current document.
    ///
    /// A borrowed result, or an owned one equal to the current document,
    /// changes nothing and writes nothing.
    pub fn commit<F>(&self, mutator: F) -> CommitOutcome
    where
        F: for<'a> FnOnce(&'a AppState) -> Cow<'a, AppState>,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let next = match mutator(&inner.doc) {
            Cow::Borrowed(_) => return CommitOutcome::Unchanged,
            Cow::Owned(next) => next,
        };
        if next == inner.doc {
            return CommitOutcome::Unchanged;
        }
        inner.doc = next;
        inner.last_commit = Some(Instant::now());
        if !inner.hydrated {
            debug!("commit before hydration kept local");
            return CommitOutcome::LocalOnly;
        }

        // Queue while still holding the guard so saves reach the slot in
        // commit order. Lock order is engine, then save slot.
        self.persistence.save(inner.doc.clone());
        CommitOutcome::Scheduled
    }

    /// Load the stored document once per engine.
    ///
    /// Never fails: anything other than a usable stored document leaves the
    /// engine on an empty document for the current period. If the returned
    /// future is dropped before the load finishes, a later call starts over.
    pub async fn hydrate(&self) -> HydrateOutcome {
        {
            let mut inner = self.lock();
            if inner.hydration_started {
                return HydrateOutcome::AlreadyHydrated;
            }
            inner.hydration_started = true;
        }
        let attempt = HydrationAttempt {
            engine: self,
            finished: false,
        };

        let store = self.persistence.store();
        let loaded = tokio::time::timeout(self.load_timeout, store.load()).await;
        let (doc, outcome) = match loaded {
            Ok(Ok(Some(doc))) => (doc.normalized(), HydrateOutcome::Loaded),
            Ok(Ok(None)) => (self.blank(), HydrateOutcome::NotFound),
            Ok(Err(e)) => {
                error!(store = %store.describe(), error = %e, "initial state load failed");
                (self.blank(), HydrateOutcome::Failed)
            }
            Err(_) => {
                error!(store = %store.describe(), "initial state load timed out");
                (self.blank(), HydrateOutcome::Failed)
            }
        };

        {
            let mut inner = self.lock();
            inner.doc = doc;
            inner.hydrated = true;
        }
        attempt.finish();
        info!(outcome = ?outcome, store = %store.describe(), "hydrated");

        tokio::task::yield_now().await;
        self.run_rollover_check();
        outcome
    }

    /// Reload the stored document and adopt it if no local edit could be
    /// overwritten.
    pub async fn reconcile_from_remote(&self) -> ReconcileOutcome {
        if !self.is_hydrated() {
            return ReconcileOutcome::Skipped(SkipReason::NotHydrated);
        }
        if self.persistence.is_save_in_progress() {
            debug!("reload skipped: save in progress");
            return ReconcileOutcome::Skipped(SkipReason::SaveInProgress);
        }

        let fetch_start = Instant::now();
        let store = self.persistence.store();
        let incoming = match tokio::time::timeout(self.load_timeout, store.load()).await {
            Ok(Ok(Some(doc))) => doc,
            Ok(Ok(None)) => {
                debug!("reload found nothing stored");
                return ReconcileOutcome::NotFound;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "state reload failed");
                return ReconcileOutcome::Failed;
            }
            Err(_) => {
                warn!("state reload timed out");
                return ReconcileOutcome::Failed;
            }
        };

        let outcome = {
            let mut inner = self.lock();
            if self.persistence.is_save_in_progress() {
                ReconcileOutcome::Discarded(SkipReason::SaveInProgress)
            } else if inner
                .last_commit
                .is_some_and(|at| at + self.reconcile_window > fetch_start)
            {
                ReconcileOutcome::Discarded(SkipReason::RecentCommit)
            } else {
                let incoming = incoming.normalized();
                if incoming == inner.doc {
                    ReconcileOutcome::UpToDate
                } else {
                    inner.doc = incoming;
                    ReconcileOutcome::Applied
                }
            }
        };

        match outcome {
            ReconcileOutcome::Applied => {
                info!("applied remote state");
                self.run_rollover_check();
            }
            ReconcileOutcome::UpToDate => {
                self.run_rollover_check();
            }
            ReconcileOutcome::Discarded(reason) => {
                warn!(reason = ?reason, "discarded remote state");
            }
            _ => {}
        }
        outcome
    }

    /// Roll the document over to the current day and week if needed.
    pub fn run_rollover_check(&self) -> CommitOutcome {
        let keys = self.current_keys();
        let outcome = self.commit(|state| rollover(state, &keys));
        if outcome.changed() {
            info!(day = %keys.day, week = %keys.week, "rolled over");
        }
        outcome
    }

    /// Regained focus or became visible: rollover check, then reload.
    pub async fn on_focus(&self) -> ReconcileOutcome {
        self.run_rollover_check();
        self.reconcile_from_remote().await
    }

    /// Add a task. Returns its id, or `None` for a blank title.
    pub fn add_task(&self, title: &str, kind: TaskKind) -> Option<TaskId> {
        let task = Task::new(title, kind, self.clock.now())?;
        let id = task.id.clone();
        self.commit(move |state| mutations::add_task(state, task))
            .changed()
            .then_some(id)
    }

    pub fn update_task_title(&self, id: &str, title: &str) -> CommitOutcome {
        self.commit(|state| mutations::update_task_title(state, id, title))
    }

    pub fn delete_task(&self, id: &str) -> CommitOutcome {
        self.commit(|state| mutations::delete_task(state, id))
    }

    pub fn toggle_daily_done(&self, id: &str) -> CommitOutcome {
        self.commit(|state| mutations::toggle_daily_done(state, id))
    }

    pub fn add_weekly_minutes(&self, id: &str, delta_min: i64) -> CommitOutcome {
        self.commit(|state| mutations::add_weekly_minutes(state, id, delta_min))
    }

    pub fn set_weekly_target(&self, id: &str, target_min: i64) -> CommitOutcome {
        self.commit(|state| mutations::set_weekly_target(state, id, target_min))
    }

    /// Replace the document with exported JSON.
    ///
    /// # Errors
    ///
    /// Returns an import error for malformed text or an unsupported
    /// version; the document is left untouched.
    pub fn import_json(&self, text: &str) -> Result<CommitOutcome> {
        let incoming = import_state_json(text, &self.current_keys())?;
        Ok(self.commit(move |state| mutations::replace_document(state, incoming)))
    }

    /// # Errors
    ///
    /// Returns a decode error if the document cannot be serialized.
    pub fn export_json(&self) -> Result<String> {
        export_state_json(&self.snapshot())
    }

    pub fn snapshot(&self) -> AppState {
        self.lock().doc.clone()
    }

    pub fn is_hydrated(&self) -> bool {
        self.lock().hydrated
    }

    pub fn is_save_in_progress(&self) -> bool {
        self.persistence.is_save_in_progress()
    }

    /// Write anything queued now and wait for the queue to empty.
    pub async fn flush(&self) {
        self.persistence.flush().await;
    }

    pub fn persistence(&self) -> &PersistenceClient {
        &self.persistence
    }

    pub fn current_keys(&self) -> TimeKeys {
        TimeKeys::at(self.clock.now(), self.zone)
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Reference zone for day and week keys.
    pub fn zone(&self) -> Tz {
        self.zone
    }

    fn blank(&self) -> AppState {
        AppState::blank(&self.current_keys())
    }
}

/// Clears `hydration_started` if a hydrate future is dropped mid-load.
struct HydrationAttempt<'a> {
    engine: &'a SyncEngine,
    finished: bool,
}

impl HydrationAttempt<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for HydrationAttempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("hydration abandoned before the load finished");
            self.engine.lock().hydration_started = false;
        }
    }
}
