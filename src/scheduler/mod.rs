//! Background sync scheduling.
//!
//! [`Deferred`] owns a single cancellable delayed callback (the save
//! debounce). [`SyncScheduler`] runs the periodic rollover and reload loop.

pub mod deferred;
pub mod runner;

pub use deferred::Deferred;
pub use runner::{SyncScheduler, SyncTrigger};
