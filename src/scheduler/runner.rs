//! Background sync loop.
//!
//! Spawns a tokio task that hydrates the engine, then periodically checks
//! for day/week rollover and reloads remote state while visible. Focus and
//! visibility changes arrive over a channel.

use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// External events that prompt a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The client regained focus.
    Focus,
    /// The client became visible (`true`) or hidden (`false`).
    Visibility(bool),
}

/// Background scheduler driving a [`SyncEngine`].
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    /// Reload interval while visible.
    resync_every: Duration,
    /// Rollover check interval.
    rollover_every: Duration,
    triggers: mpsc::UnboundedReceiver<SyncTrigger>,
    visible: bool,
}

impl SyncScheduler {
    /// Create a scheduler and the sender used to deliver triggers to it.
    pub fn new(
        engine: Arc<SyncEngine>,
        config: &SyncConfig,
    ) -> (Self, mpsc::UnboundedSender<SyncTrigger>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            engine,
            resync_every: Duration::from_secs(config.resync_interval_secs.max(1)),
            rollover_every: Duration::from_secs(config.rollover_check_secs.max(1)),
            triggers: rx,
            visible: true,
        };
        (scheduler, tx)
    }

    /// Start the loop. It runs until `shutdown` is cancelled, then flushes
    /// any queued save before the task completes.
    pub fn run(mut self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.engine.hydrate().await;
            info!(
                resync_secs = self.resync_every.as_secs(),
                rollover_secs = self.rollover_every.as_secs(),
                "sync loop started"
            );

            let start = Instant::now();
            let mut resync = tokio::time::interval_at(start + self.resync_every, self.resync_every);
            resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut rollover =
                tokio::time::interval_at(start + self.rollover_every, self.rollover_every);
            rollover.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut triggers_open = true;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = rollover.tick() => {
                        self.engine.run_rollover_check();
                    }
                    _ = resync.tick(), if self.visible => {
                        let outcome = self.engine.reconcile_from_remote().await;
                        debug!(outcome = ?outcome, "periodic reload");
                    }
                    trigger = self.triggers.recv(), if triggers_open => match trigger {
                        Some(SyncTrigger::Focus) => {
                            let outcome = self.engine.on_focus().await;
                            debug!(outcome = ?outcome, "focus reload");
                        }
                        Some(SyncTrigger::Visibility(true)) => {
                            self.visible = true;
                            resync.reset();
                            let outcome = self.engine.on_focus().await;
                            debug!(outcome = ?outcome, "visible reload");
                        }
                        Some(SyncTrigger::Visibility(false)) => {
                            self.visible = false;
                        }
                        None => triggers_open = false,
                    },
                }
            }

            self.engine.flush().await;
            info!("sync loop stopped");
        })
    }
}
