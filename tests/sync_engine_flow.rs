//! End-to-end sync engine flows over the in-memory store.
//!
//! Most tests run on paused tokio time so debounce, backoff, and the reload
//! window are deterministic. The concurrent-commit tests use a real
//! multi-threaded runtime.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use timeslicer::engine::{CommitOutcome, HydrateOutcome, ReconcileOutcome, SkipReason};
use timeslicer::store::{MemoryStateStore, StateStore};
use timeslicer::{AppState, Clock, ManualClock, SyncEngine, TaskKind, TimeKeys, TimeslicerConfig};

struct Fixture {
    store: Arc<MemoryStateStore>,
    clock: Arc<ManualClock>,
    engine: Arc<SyncEngine>,
}

/// Wednesday 2024-03-06, 10:00 in Los Angeles.
fn wednesday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 6, 18, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("valid timestamp"))
}

fn engine_over(store: &Arc<MemoryStateStore>, clock: &Arc<ManualClock>) -> Arc<SyncEngine> {
    let engine = SyncEngine::with_clock(
        Arc::clone(store) as Arc<dyn StateStore>,
        &TimeslicerConfig::default(),
        Arc::clone(clock) as Arc<dyn Clock>,
    )
    .unwrap_or_else(|e| panic!("engine: {e}"));
    Arc::new(engine)
}

fn fixture_with(store: MemoryStateStore) -> Fixture {
    let store = Arc::new(store);
    let clock = Arc::new(ManualClock::new(wednesday_morning()));
    let engine = engine_over(&store, &clock);
    Fixture {
        store,
        clock,
        engine,
    }
}

fn fixture() -> Fixture {
    fixture_with(MemoryStateStore::new())
}

fn keys(day: &str, week: &str) -> TimeKeys {
    TimeKeys {
        day: day.to_owned(),
        week: week.to_owned(),
    }
}

/// A stored document for `keys` with one daily task marked done and one
/// weekly task with some time logged.
fn stored_doc(keys: &TimeKeys) -> AppState {
    let mut doc = AppState::blank(keys);
    let daily = timeslicer::Task::new("Stretch", TaskKind::Daily, wednesday_morning())
        .unwrap_or_else(|| panic!("task"));
    let weekly = timeslicer::Task::new("Study", TaskKind::Weekly, wednesday_morning())
        .unwrap_or_else(|| panic!("task"));
    doc.daily_done.insert(daily.id.clone(), true);
    doc.weekly_target_min.insert(weekly.id.clone(), 300);
    doc.weekly_spent_min.insert(weekly.id.clone(), 120);
    doc.tasks.push(daily);
    doc.tasks.push(weekly);
    doc
}

// ────────────────────────────────────────────────────────────────────────────
// Hydration
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn hydrate_adopts_stored_document_without_writing() {
    let doc = stored_doc(&keys("2024-03-06", "2024-W10"));
    let f = fixture_with(MemoryStateStore::with_document(&doc));

    assert_eq!(f.engine.hydrate().await, HydrateOutcome::Loaded);
    f.engine.flush().await;

    assert_eq!(f.engine.snapshot(), doc);
    assert_eq!(f.store.save_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_load_starts_from_empty_document() {
    let f = fixture();
    f.store.set_fail_loads(true);

    assert_eq!(f.engine.hydrate().await, HydrateOutcome::Failed);
    assert!(f.engine.is_hydrated());
    assert_eq!(
        f.engine.snapshot(),
        AppState::blank(&keys("2024-03-06", "2024-W10"))
    );
}

#[tokio::test(start_paused = true)]
async fn unsupported_stored_version_starts_from_empty_document() {
    let f = fixture();
    f.store
        .seed_raw(serde_json::json!({ "version": 2, "tasks": [{"id": "x", "title": "X"}] }));

    assert_eq!(f.engine.hydrate().await, HydrateOutcome::NotFound);
    assert!(f.engine.snapshot().tasks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn commits_before_hydration_stay_local_and_are_superseded() {
    let stored = stored_doc(&keys("2024-03-06", "2024-W10"));
    let f = fixture_with(MemoryStateStore::with_document(&stored));

    let outcome = f.engine.commit(|state| {
        let mut next = state.clone();
        next.today_key = "scratch".to_owned();
        std::borrow::Cow::Owned(next)
    });
    assert_eq!(outcome, CommitOutcome::LocalOnly);
    assert!(!f.engine.is_save_in_progress());

    f.engine.hydrate().await;
    f.engine.flush().await;
    assert_eq!(f.engine.snapshot(), stored);
    assert_eq!(f.store.save_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn hydration_rolls_over_a_stale_day() {
    let yesterday = stored_doc(&keys("2024-03-05", "2024-W10"));
    let f = fixture_with(MemoryStateStore::with_document(&yesterday));

    f.engine.hydrate().await;
    let doc = f.engine.snapshot();
    assert_eq!(doc.today_key, "2024-03-06");
    assert!(doc.daily_done.is_empty());
    assert_eq!(doc.weekly_spent_min, yesterday.weekly_spent_min);

    f.engine.flush().await;
    assert_eq!(f.store.writes(), vec![doc]);
}

#[tokio::test(start_paused = true)]
async fn hydration_rolls_over_a_stale_week_and_keeps_targets() {
    let last_week = stored_doc(&keys("2024-03-01", "2024-W09"));
    let f = fixture_with(MemoryStateStore::with_document(&last_week));

    f.engine.hydrate().await;
    let doc = f.engine.snapshot();
    assert_eq!(doc.week_key, "2024-W10");
    assert!(doc.daily_done.is_empty());
    assert!(doc.weekly_spent_min.is_empty());
    assert_eq!(doc.weekly_target_min, last_week.weekly_target_min);
}

// ────────────────────────────────────────────────────────────────────────────
// Commits and saves
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn no_op_commit_is_not_written() {
    let f = fixture();
    f.engine.hydrate().await;

    assert_eq!(
        f.engine.toggle_daily_done("no-such-task"),
        CommitOutcome::Unchanged
    );
    assert_eq!(f.engine.update_task_title("no-such-task", "x"), CommitOutcome::Unchanged);
    f.engine.flush().await;
    assert_eq!(f.store.save_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn removing_minutes_at_zero_is_unchanged() {
    let f = fixture();
    f.engine.hydrate().await;
    let id = f
        .engine
        .add_task("Study", TaskKind::Weekly)
        .unwrap_or_else(|| panic!("task added"));
    f.engine.flush().await;

    assert_eq!(f.engine.add_weekly_minutes(&id, -15), CommitOutcome::Unchanged);
    f.engine.flush().await;
    assert_eq!(f.store.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn weekly_task_is_written_with_default_target() {
    let f = fixture();
    f.engine.hydrate().await;

    let id = f
        .engine
        .add_task("Study", TaskKind::Weekly)
        .unwrap_or_else(|| panic!("task added"));
    f.engine.flush().await;

    let stored = f.store.current().unwrap_or_else(|| panic!("stored"));
    assert_eq!(stored.target_min(&id), 600);
    assert_eq!(stored.weekly_spent_min.get(&id), Some(&0));
    assert_eq!(stored, f.engine.snapshot());
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_costs_one_write() {
    let f = fixture();
    f.engine.hydrate().await;

    let id = f
        .engine
        .add_task("Study", TaskKind::Weekly)
        .unwrap_or_else(|| panic!("task added"));
    for minutes in [15, 30, 60, -15] {
        f.engine.add_weekly_minutes(&id, minutes);
    }
    f.engine.persistence().wait_idle().await;

    assert_eq!(f.store.write_count(), 1);
    assert_eq!(f.store.current().map(|d| d.spent_min(&id)), Some(90));
}

#[tokio::test(start_paused = true)]
async fn failed_save_never_rolls_back_local_document() {
    let f = fixture();
    f.engine.hydrate().await;
    f.store.fail_next_saves(3);

    let id = f
        .engine
        .add_task("Stretch", TaskKind::Daily)
        .unwrap_or_else(|| panic!("task added"));
    f.engine.flush().await;

    assert!(f.engine.snapshot().task(&id).is_some());
    assert!(f.store.current().is_none());
    assert_eq!(f.engine.persistence().stats().dropped, 1);

    // The next edit carries the whole document, including the lost one.
    f.engine.toggle_daily_done(&id);
    f.engine.flush().await;
    assert_eq!(f.store.current(), Some(f.engine.snapshot()));
}

// ────────────────────────────────────────────────────────────────────────────
// Concurrent commits (real threads)
// ────────────────────────────────────────────────────────────────────────────

/// Several tasks committing on a multi-threaded runtime must leave the
/// store holding exactly the engine's document once the queue is idle.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn store_matches_engine_after_concurrent_commits() {
    for round in 0..20 {
        let f = fixture();
        f.engine.hydrate().await;

        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let engine = Arc::clone(&f.engine);
                tokio::spawn(async move {
                    for n in 0..50 {
                        engine
                            .add_task(&format!("round {round} task {writer}-{n}"), TaskKind::Weekly)
                            .unwrap_or_else(|| panic!("task added"));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap_or_else(|e| panic!("writer: {e}"));
        }
        f.engine.flush().await;

        assert!(!f.engine.is_save_in_progress(), "round {round}: still saving");
        let snapshot = f.engine.snapshot();
        assert_eq!(snapshot.tasks.len(), 200, "round {round}");
        assert_eq!(f.store.current(), Some(snapshot), "round {round}: store diverged");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_logging_and_toggling_is_fully_persisted() {
    let f = fixture();
    f.engine.hydrate().await;
    let weekly = f
        .engine
        .add_task("Study", TaskKind::Weekly)
        .unwrap_or_else(|| panic!("task added"));
    let daily = f
        .engine
        .add_task("Stretch", TaskKind::Daily)
        .unwrap_or_else(|| panic!("task added"));

    let loggers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&f.engine);
            let id = weekly.clone();
            tokio::spawn(async move {
                for _ in 0..25 {
                    engine.add_weekly_minutes(&id, 15);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    let toggler = {
        let engine = Arc::clone(&f.engine);
        let id = daily.clone();
        tokio::spawn(async move {
            for _ in 0..11 {
                engine.toggle_daily_done(&id);
                tokio::task::yield_now().await;
            }
        })
    };
    for logger in loggers {
        logger.await.unwrap_or_else(|e| panic!("logger: {e}"));
    }
    toggler.await.unwrap_or_else(|e| panic!("toggler: {e}"));
    f.engine.flush().await;

    let stored = f.store.current().unwrap_or_else(|| panic!("stored"));
    assert_eq!(stored.spent_min(&weekly), 4 * 25 * 15);
    assert!(stored.is_done_today(&daily));
    assert_eq!(stored, f.engine.snapshot());
}

// ────────────────────────────────────────────────────────────────────────────
// Reconcile
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reconcile_before_hydration_is_ignored() {
    let f = fixture();
    assert_eq!(
        f.engine.reconcile_from_remote().await,
        ReconcileOutcome::Skipped(SkipReason::NotHydrated)
    );
    assert_eq!(f.store.load_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconcile_skips_fetch_while_save_queued() {
    let f = fixture();
    f.engine.hydrate().await;
    let loads = f.store.load_count();

    f.engine.add_task("Stretch", TaskKind::Daily);
    let before = f.engine.snapshot();
    assert_eq!(
        f.engine.reconcile_from_remote().await,
        ReconcileOutcome::Skipped(SkipReason::SaveInProgress)
    );
    assert_eq!(f.store.load_count(), loads);
    assert_eq!(f.engine.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn reload_is_discarded_when_save_starts_during_fetch() {
    let f = fixture();
    f.engine.hydrate().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    f.store.set_latency(Duration::from_secs(1));
    f.store.seed(&stored_doc(&keys("2024-03-06", "2024-W10")));

    let engine = Arc::clone(&f.engine);
    let edit = async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.add_task("Local edit", TaskKind::Daily)
    };
    let (outcome, added) = tokio::join!(f.engine.reconcile_from_remote(), edit);

    assert_eq!(
        outcome,
        ReconcileOutcome::Discarded(SkipReason::SaveInProgress)
    );
    let id = added.unwrap_or_else(|| panic!("task added"));
    assert!(f.engine.snapshot().task(&id).is_some());
}

#[tokio::test(start_paused = true)]
async fn reload_within_window_of_commit_is_discarded() {
    let f = fixture();
    f.engine.hydrate().await;
    let id = f
        .engine
        .add_task("Local edit", TaskKind::Daily)
        .unwrap_or_else(|| panic!("task added"));
    f.engine.flush().await;

    // Another device overwrote the document right after our write.
    f.store.seed(&stored_doc(&keys("2024-03-06", "2024-W10")));

    assert_eq!(
        f.engine.reconcile_from_remote().await,
        ReconcileOutcome::Discarded(SkipReason::RecentCommit)
    );
    assert!(f.engine.snapshot().task(&id).is_some());
}

#[tokio::test(start_paused = true)]
async fn reload_after_window_applies_remote_document() {
    let f = fixture();
    f.engine.hydrate().await;
    f.engine.add_task("Local edit", TaskKind::Daily);
    f.engine.flush().await;

    let remote = stored_doc(&keys("2024-03-06", "2024-W10"));
    f.store.seed(&remote);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(
        f.engine.reconcile_from_remote().await,
        ReconcileOutcome::Applied
    );
    assert_eq!(f.engine.snapshot(), remote);
    assert_eq!(
        f.engine.reconcile_from_remote().await,
        ReconcileOutcome::UpToDate
    );
}

#[tokio::test(start_paused = true)]
async fn reload_failure_keeps_local_state() {
    let f = fixture();
    f.engine.hydrate().await;
    f.engine.add_task("Stretch", TaskKind::Daily);
    f.engine.flush().await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    let before = f.engine.snapshot();
    f.store.set_fail_loads(true);
    assert_eq!(
        f.engine.reconcile_from_remote().await,
        ReconcileOutcome::Failed
    );
    assert_eq!(f.engine.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn focus_after_midnight_rolls_over_then_reloads() {
    let f = fixture();
    f.engine.hydrate().await;
    let id = f
        .engine
        .add_task("Stretch", TaskKind::Daily)
        .unwrap_or_else(|| panic!("task added"));
    f.engine.toggle_daily_done(&id);
    f.engine.flush().await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    f.clock.advance(TimeDelta::days(1));
    let outcome = f.engine.on_focus().await;

    // The rollover commit queues a save, so the reload is not attempted.
    assert!(
        matches!(
            outcome,
            ReconcileOutcome::Skipped(SkipReason::SaveInProgress)
        ),
        "got {outcome:?}"
    );
    let doc = f.engine.snapshot();
    assert_eq!(doc.today_key, "2024-03-07");
    assert!(!doc.is_done_today(&id));

    f.engine.flush().await;
    assert_eq!(f.store.current(), Some(doc));
}

// ────────────────────────────────────────────────────────────────────────────
// Import / export
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn import_replaces_and_persists_document() {
    let f = fixture();
    f.engine.hydrate().await;
    f.engine.add_task("Old", TaskKind::Daily);

    let incoming = stored_doc(&keys("2024-03-06", "2024-W10"));
    let text = serde_json::to_string(&incoming).unwrap_or_else(|e| panic!("{e}"));
    let outcome = f
        .engine
        .import_json(&text)
        .unwrap_or_else(|e| panic!("import: {e}"));
    assert_eq!(outcome, CommitOutcome::Scheduled);

    f.engine.flush().await;
    assert_eq!(f.engine.snapshot(), incoming);
    assert_eq!(f.store.current(), Some(incoming));

    let exported = f.engine.export_json().unwrap_or_else(|e| panic!("export: {e}"));
    assert_eq!(AppState::from_json(&exported).ok(), Some(f.engine.snapshot()));
}

// ────────────────────────────────────────────────────────────────────────────
// Known limitation
// ────────────────────────────────────────────────────────────────────────────

/// Two devices sharing one identity: the later write wins and the earlier
/// device's edit is lost. Documented behavior, not a bug.
#[tokio::test(start_paused = true)]
async fn concurrent_devices_last_writer_wins() {
    let store = Arc::new(MemoryStateStore::new());
    let clock = Arc::new(ManualClock::new(wednesday_morning()));
    let laptop = engine_over(&store, &clock);
    let phone = engine_over(&store, &clock);
    laptop.hydrate().await;
    phone.hydrate().await;

    laptop.add_task("From laptop", TaskKind::Daily);
    laptop.flush().await;
    phone.add_task("From phone", TaskKind::Daily);
    phone.flush().await;

    let stored = store.current().unwrap_or_else(|| panic!("stored"));
    let titles: Vec<&str> = stored.tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["From phone"]);
}
