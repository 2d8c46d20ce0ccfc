//! One-shot, cancellable delayed callback.
//!
//! Arming a [`Deferred`] replaces whatever was armed before it. At most one
//! callback is pending at any time, and a cancelled callback never runs.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

struct Armed {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl Armed {
    fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.cancel.cancel();
        won
    }
}

#[derive(Default)]
pub struct Deferred {
    slot: Mutex<Option<Armed>>,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` after `delay` unless cancelled or re-armed first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, delay: Duration, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(ARMED));
        let cancel = CancellationToken::new();

        {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = slot.take() {
                previous.cancel();
            }
            *slot = Some(Armed {
                state: Arc::clone(&state),
                cancel: cancel.clone(),
            });
        }

        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            if state
                .compare_exchange(ARMED, FIRED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                callback.await;
            }
        });
    }

    /// Cancel the pending callback. Returns `true` if one was pending and
    /// is now guaranteed not to run.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.take().is_some_and(|armed| armed.cancel())
    }

    /// Whether a callback is waiting to fire.
    pub fn is_armed(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .is_some_and(|armed| armed.state.load(Ordering::SeqCst) == ARMED)
    }
}

impl Drop for Deferred {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(armed) = slot.take() {
            armed.cancel();
        }
    }
}
