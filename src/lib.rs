//! Timeslicer: daily and weekly task tracking with optimistic state sync.
//!
//! The whole user state is one document stored remotely per client
//! identity. Local edits apply immediately and are written behind the
//! user's back:
//!
//! Commit → in-memory document → coalescing save queue → remote store
//!
//! # Architecture
//!
//! - **Model**: [`model::AppState`] and the pure [`mutations`] over it
//! - **Time keys**: day/week keys in a fixed reference zone ([`timekey`]),
//!   and the [`rollover`] policy that resets completions and spent time
//! - **Store**: HTTP, local-file, and in-memory [`store::StateStore`]s
//! - **Persistence**: [`persistence::PersistenceClient`], one write in
//!   flight, latest-wins queue, bounded retry
//! - **Engine**: [`engine::SyncEngine`] hydrates once, commits, and decides
//!   when a remote reload may replace local state
//! - **Scheduler**: the save debounce and the periodic rollover/reload loop

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod mutations;
pub mod paths;
pub mod persistence;
pub mod rollover;
pub mod scheduler;
pub mod store;
pub mod timekey;
pub mod transfer;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TimeslicerConfig;
pub use engine::{CommitOutcome, HydrateOutcome, ReconcileOutcome, SkipReason, SyncEngine};
pub use error::{Result, TimeslicerError};
pub use model::{AppState, Task, TaskId, TaskKind};
pub use persistence::{PersistenceClient, SavePolicy, SaveStats};
pub use scheduler::{SyncScheduler, SyncTrigger};
pub use store::StateStore;
pub use timekey::TimeKeys;
