//! Delay-and-coalesce scheduling
//!
//! Only the last action scheduled within a quiet period runs. Each
//! `schedule` call replaces the pending action and restarts the timer.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agenda_core::prelude::*;
use tokio::task::JoinHandle;

use super::{lock, Disposable};

/// Coalesces rapid repeated invocations into one
///
/// Actions run on the tokio runtime; `schedule` must be called from within
/// one. An action that has started running is never interrupted by a later
/// `schedule`, `cancel` or `dispose`.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    state: Arc<Mutex<DebounceState>>,
}

#[derive(Debug, Default)]
struct DebounceState {
    /// Bumped on every schedule/cancel; a waiting timer only fires if its
    /// generation is still current
    generation: u64,
    pending: Option<JoinHandle<()>>,
    disposed: bool,
}

impl Debouncer {
    /// Create a debouncer. Fails if `delay` is zero.
    pub fn new(delay: Duration) -> Result<Self> {
        if delay.is_zero() {
            return Err(Error::invalid_argument(
                "Debouncer delay must be greater than zero",
            ));
        }
        Ok(Self {
            delay,
            state: Arc::new(Mutex::new(DebounceState::default())),
        })
    }

    pub fn from_millis(ms: u64) -> Result<Self> {
        Self::new(Duration::from_millis(ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` to run after the quiet period, replacing any
    /// pending action. No-op once disposed.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = lock(&self.state);
        if state.disposed {
            trace!("Debouncer disposed, dropping scheduled action");
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }

        let shared = Arc::clone(&self.state);
        let delay = self.delay;
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = lock(&shared);
                if state.disposed || state.generation != generation {
                    return;
                }
                // Fired: from here on nothing may abort us
                state.pending = None;
            }
            action().await;
        }));
    }

    /// Drop the pending action, if any, without disposing
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }

    /// True while an action is waiting for its timer
    pub fn has_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    /// Cancel the pending action and refuse all future ones. Idempotent.
    pub fn dispose(&self) {
        let mut state = lock(&self.state);
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.state).disposed
    }
}

impl Disposable for Debouncer {
    fn dispose(&self) {
        Debouncer::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Debouncer::is_disposed(self)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        Debouncer::dispose(self);
    }
}
