//! Step sequencing engine
//!
//! Entering a step bumps the engine's epoch and runs the step's entry action
//! on its own task. A completion is applied only if the epoch it captured is
//! still current; navigation, `skip`, `complete` and `dispose` all move the
//! epoch on, so late results from an abandoned step are discarded.
//!
//! A successful entry arms a single-shot auto-advance timer when the step
//! has one. `back()` suspends that arming until `retry_on_enter()`.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agenda_core::{codes, prelude::*};
use futures_util::FutureExt;
use tokio::task::JoinHandle;

use super::state::{OnboardingState, OnboardingStatus};
use super::step::Step;
use crate::reactive::{lock, Disposable, Signal, SignalStream};

const COMPONENT: &str = "StepEngine";

#[derive(Debug, Default)]
struct EngineCore {
    steps: Vec<Step>,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
    suppress_auto_advance: bool,
    disposed: bool,
}

impl EngineCore {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug)]
struct EngineInner {
    state: Signal<OnboardingState>,
    core: Mutex<EngineCore>,
}

/// Drives an ordered list of [`Step`]s
///
/// Cloning shares the same engine. Must be used within a tokio runtime.
#[derive(Debug, Clone)]
pub struct StepEngine {
    inner: Arc<EngineInner>,
}

impl Default for StepEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StepEngine {
    /// An idle engine with no steps
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Signal::new(OnboardingState::default()),
                core: Mutex::new(EngineCore::default()),
            }),
        }
    }

    /// An idle engine configured with `steps`
    pub fn with_steps(steps: Vec<Step>) -> Self {
        let engine = Self::new();
        {
            let mut core = lock(&engine.inner.core);
            engine.inner.load_steps(&mut core, steps);
        }
        engine
    }

    /// Replace the step list. Only valid while idle.
    pub fn configure(&self, steps: Vec<Step>) -> Result<()> {
        let mut core = self.inner.live_core()?;
        let status = self.inner.state.read().status;
        if status != OnboardingStatus::Idle {
            return Err(Error::invalid_state(format!(
                "Cannot configure steps while {:?}",
                status
            )));
        }
        self.inner.load_steps(&mut core, steps);
        Ok(())
    }

    /// Enter the first step, or complete at once if there are none
    pub fn start(&self) -> Result<()> {
        let mut core = self.inner.live_core()?;
        let status = self.inner.state.read().status;
        if status != OnboardingStatus::Idle {
            return Err(Error::invalid_state(format!(
                "Cannot start onboarding while {:?}",
                status
            )));
        }

        if core.steps.is_empty() {
            debug!("Onboarding started with no steps, completing");
            self.inner.state.update(|s| {
                s.status = OnboardingStatus::Completed;
                s.step_index = 0;
            });
            return Ok(());
        }

        debug!("Onboarding started with {} step(s)", core.steps.len());
        self.inner.state.update(|s| {
            s.status = OnboardingStatus::Running;
            s.step_index = 0;
            s.error = None;
        });
        core.suppress_auto_advance = false;
        self.inner.enter_step(&mut core, 0);
        Ok(())
    }

    /// Move forward; past the last step completes
    pub fn next(&self) -> Result<()> {
        let mut core = self.inner.live_core()?;
        let state = self.inner.state.read();
        if !state.is_running() {
            return Ok(());
        }
        self.inner.move_to(&mut core, state.step_index + 1, false);
        Ok(())
    }

    /// Move back one step without arming auto-advance. No-op on the first step.
    pub fn back(&self) -> Result<()> {
        let mut core = self.inner.live_core()?;
        let state = self.inner.state.read();
        if !state.is_running() || state.step_index == 0 {
            return Ok(());
        }
        self.inner.move_to(&mut core, state.step_index - 1, true);
        Ok(())
    }

    /// Clear the error and run the current step's entry again, re-enabling
    /// auto-advance.
    pub fn retry_on_enter(&self) -> Result<()> {
        let mut core = self.inner.live_core()?;
        let state = self.inner.state.read();
        if !state.is_running() {
            return Ok(());
        }
        self.inner.move_to(&mut core, state.step_index, false);
        Ok(())
    }

    /// Stop with status `Skipped`, keeping any error
    pub fn skip(&self) -> Result<()> {
        self.finish(OnboardingStatus::Skipped)
    }

    /// Stop with status `Completed`, keeping any error
    pub fn complete(&self) -> Result<()> {
        self.finish(OnboardingStatus::Completed)
    }

    fn finish(&self, status: OnboardingStatus) -> Result<()> {
        let mut core = self.inner.live_core()?;
        if self.inner.state.read().status.is_terminal() {
            return Ok(());
        }
        core.cancel_timer();
        core.epoch += 1;
        debug!("Onboarding finished as {:?}", status);
        self.inner.state.update(|s| s.status = status);
        Ok(())
    }

    /// Current snapshot
    pub fn state(&self) -> OnboardingState {
        self.inner.state.read()
    }

    /// Stream of snapshots, starting with the current one
    pub fn changes(&self) -> SignalStream<OnboardingState> {
        self.inner.state.subscribe()
    }

    /// Title of the step being shown, while running
    pub fn current_step(&self) -> Option<String> {
        let state = self.inner.state.read();
        if !state.is_running() {
            return None;
        }
        lock(&self.inner.core)
            .steps
            .get(state.step_index)
            .map(|step| step.title().to_string())
    }

    /// Cancel the timer and stop accepting operations. Idempotent.
    pub fn dispose(&self) {
        {
            let mut core = lock(&self.inner.core);
            if core.disposed {
                return;
            }
            core.disposed = true;
            core.epoch += 1;
            core.cancel_timer();
        }
        debug!("Onboarding engine disposed");
        self.inner.state.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.core).disposed
    }
}

impl Disposable for StepEngine {
    fn dispose(&self) {
        StepEngine::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        StepEngine::is_disposed(self)
    }
}

impl EngineInner {
    fn live_core(&self) -> Result<std::sync::MutexGuard<'_, EngineCore>> {
        let core = lock(&self.core);
        if core.disposed {
            return Err(Error::disposed(COMPONENT));
        }
        Ok(core)
    }

    fn load_steps(&self, core: &mut EngineCore, steps: Vec<Step>) {
        let total = steps.len();
        core.steps = steps;
        self.state.update(|s| {
            s.total_steps = total;
            s.step_index = 0;
        });
    }

    /// Cancel the timer, clear the error and enter `index`
    fn move_to(self: &Arc<Self>, core: &mut EngineCore, index: usize, suppress: bool) {
        core.cancel_timer();
        core.suppress_auto_advance = suppress;

        if index >= core.steps.len() {
            core.epoch += 1;
            debug!("Onboarding passed its last step, completing");
            self.state.update(|s| {
                s.status = OnboardingStatus::Completed;
                s.error = None;
            });
            return;
        }

        self.state.update(|s| {
            s.step_index = index;
            s.error = None;
        });
        self.enter_step(core, index);
    }

    fn enter_step(self: &Arc<Self>, core: &mut EngineCore, index: usize) {
        core.epoch += 1;
        let epoch = core.epoch;
        let step = core.steps[index].clone();
        trace!("Entering step {} '{}' (epoch {})", index, step.title(), epoch);

        let Some(action) = step.entry_action().cloned() else {
            self.entry_succeeded(core, &step);
            return;
        };

        let weak = Arc::downgrade(self);
        let title = step.title().to_string();
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(async move { action().await })
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(result) => result,
                Err(payload) => Err(panic_failure(&title, payload.as_ref())),
            };
            if let Some(inner) = weak.upgrade() {
                inner.finish_entry(epoch, index, result);
            }
        });
    }

    fn finish_entry(
        self: &Arc<Self>,
        epoch: u64,
        index: usize,
        result: std::result::Result<(), Failure>,
    ) {
        let mut core = lock(&self.core);
        if core.disposed || core.epoch != epoch {
            trace!(
                "Discarding stale entry result for step {} (epoch {})",
                index,
                epoch
            );
            return;
        }

        match result {
            Ok(()) => {
                let step = core.steps[index].clone();
                self.entry_succeeded(&mut core, &step);
            }
            Err(failure) => {
                debug!("Entry action for step {} failed: {}", index, failure);
                self.state.update(|s| s.error = Some(failure));
            }
        }
    }

    fn entry_succeeded(self: &Arc<Self>, core: &mut EngineCore, step: &Step) {
        if self.state.read().error.is_some() {
            self.state.update(|s| s.error = None);
        }
        if core.suppress_auto_advance {
            return;
        }
        if let Some(delay) = step.auto_advance() {
            self.arm_timer(core, delay);
        }
    }

    fn arm_timer(self: &Arc<Self>, core: &mut EngineCore, delay: Duration) {
        core.cancel_timer();
        let epoch = core.epoch;
        let weak = Arc::downgrade(self);
        core.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.auto_advance(epoch);
            }
        }));
    }

    fn auto_advance(self: &Arc<Self>, epoch: u64) {
        let mut core = lock(&self.core);
        if core.disposed || core.epoch != epoch {
            return;
        }
        let state = self.state.read();
        if !state.is_running() {
            return;
        }
        // This task is the timer; drop its handle rather than abort itself
        core.timer = None;
        trace!("Auto-advancing from step {}", state.step_index);
        self.move_to(&mut core, state.step_index + 1, false);
    }
}

fn panic_failure(title: &str, payload: &(dyn std::any::Any + Send)) -> Failure {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    Failure::new(
        "Step failed",
        codes::ENTRY_ACTION_PANICKED,
        format!("Entry action for '{}' panicked: {}", title, message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    async fn sleep_ms(n: u64) {
        tokio::time::sleep(ms(n)).await;
    }

    fn exploding() -> std::result::Result<(), Failure> {
        panic!("boom")
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_advance_after_successful_entry() {
        let engine = StepEngine::with_steps(vec![
            Step::new("A")
                .with_auto_advance(ms(50))
                .with_entry_action(|| async { Ok(()) }),
            Step::new("B"),
        ]);

        engine.start().unwrap();
        assert_eq!(engine.state().step_index, 0);
        assert_eq!(engine.current_step().as_deref(), Some("A"));

        sleep_ms(70).await;
        let state = engine.state();
        assert_eq!(state.step_index, 1);
        assert_eq!(state.status, OnboardingStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_after_next_is_discarded() {
        let engine = StepEngine::with_steps(vec![
            Step::new("A").with_entry_action(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err(Failure::network("slow"))
            }),
            Step::new("B"),
        ]);

        engine.start().unwrap();
        sleep_ms(10).await;
        engine.next().unwrap();
        sleep_ms(200).await;

        let state = engine.state();
        assert_eq!(state.step_index, 1);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_after_next_does_not_arm_old_timer() {
        let engine = StepEngine::with_steps(vec![
            Step::new("A")
                .with_entry_action(|| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(())
                })
                .with_auto_advance(ms(10)),
            Step::new("B"),
            Step::new("C"),
        ]);

        engine.start().unwrap();
        sleep_ms(10).await;
        engine.next().unwrap();
        sleep_ms(300).await;

        let state = engine.state();
        assert_eq!(state.step_index, 1);
        assert_eq!(state.status, OnboardingStatus::Running);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_panic_after_next_is_discarded() {
        let engine = StepEngine::with_steps(vec![
            Step::new("A").with_entry_action(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                exploding()
            }),
            Step::new("B"),
        ]);

        engine.start().unwrap();
        sleep_ms(10).await;
        engine.next().unwrap();
        sleep_ms(200).await;

        let state = engine.state();
        assert_eq!(state.step_index, 1);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_during_entry_drops_result_and_timer() {
        let engine = StepEngine::with_steps(vec![
            Step::new("A")
                .with_entry_action(|| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(())
                })
                .with_auto_advance(ms(10)),
            Step::new("B"),
        ]);
        let mut changes = engine.changes();

        engine.start().unwrap();
        sleep_ms(10).await;
        engine.dispose();
        sleep_ms(200).await;

        let state = engine.state();
        assert_eq!(state.step_index, 0);
        assert!(state.error.is_none());
        assert!(engine.is_disposed());

        let seen = changes.drain();
        assert!(seen.iter().all(|s| s.step_index == 0));
        assert!(changes.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_suppresses_auto_advance_until_retry() {
        let entries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&entries);
        let engine = StepEngine::with_steps(vec![
            Step::new("A")
                .with_entry_action(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                })
                .with_auto_advance(ms(50)),
            Step::new("B").with_auto_advance(ms(50)),
            Step::new("C"),
        ]);

        engine.start().unwrap();
        sleep_ms(60).await;
        assert_eq!(engine.state().step_index, 1);

        engine.back().unwrap();
        assert_eq!(engine.state().step_index, 0);
        sleep_ms(200).await;
        assert_eq!(engine.state().step_index, 0);
        assert_eq!(entries.load(Ordering::SeqCst), 2);
        assert!(engine.state().error.is_none());

        engine.retry_on_enter().unwrap();
        sleep_ms(60).await;
        assert_eq!(engine.state().step_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_entry_sets_error_and_does_not_advance() {
        let engine = StepEngine::with_steps(vec![
            Step::new("A")
                .with_auto_advance(ms(50))
                .with_entry_action(|| async { Err(Failure::network("offline")) }),
            Step::new("B"),
        ]);

        engine.start().unwrap();
        sleep_ms(100).await;

        let state = engine.state();
        assert_eq!(state.step_index, 0);
        assert_eq!(state.error.map(|f| f.code), Some("network".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_entry_maps_to_failure() {
        let engine = StepEngine::with_steps(vec![
            Step::new("A")
                .with_auto_advance(ms(50))
                .with_entry_action(|| async { exploding() }),
            Step::new("B"),
        ]);

        engine.start().unwrap();
        sleep_ms(100).await;

        let error = engine.state().error.unwrap();
        assert_eq!(error.code, codes::ENTRY_ACTION_PANICKED);
        assert!(error.description.contains("boom"));
        assert_eq!(engine.state().step_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_clears_error_when_entry_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let engine = StepEngine::with_steps(vec![Step::new("A").with_entry_action(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(Failure::network("first try"))
                } else {
                    Ok(())
                }
            }
        })]);

        engine.start().unwrap();
        sleep_ms(10).await;
        assert!(engine.state().error.is_some());

        engine.retry_on_enter().unwrap();
        sleep_ms(10).await;
        assert!(engine.state().error.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_and_complete_preserve_error() {
        let failing = || {
            Step::new("A").with_entry_action(|| async { Err(Failure::network("offline")) })
        };

        let engine = StepEngine::with_steps(vec![failing()]);
        engine.start().unwrap();
        sleep_ms(10).await;
        engine.skip().unwrap();
        let state = engine.state();
        assert_eq!(state.status, OnboardingStatus::Skipped);
        assert!(state.error.is_some());

        let engine = StepEngine::with_steps(vec![failing()]);
        engine.start().unwrap();
        sleep_ms(10).await;
        engine.complete().unwrap();
        let state = engine.state();
        assert_eq!(state.status, OnboardingStatus::Completed);
        assert!(state.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_past_last_step_completes() {
        let engine = StepEngine::with_steps(vec![Step::new("A"), Step::new("B")]);
        engine.start().unwrap();
        engine.next().unwrap();
        engine.next().unwrap();

        assert_eq!(engine.state().status, OnboardingStatus::Completed);
        assert_eq!(engine.current_step(), None);

        // Navigation on a finished engine is ignored
        engine.back().unwrap();
        assert_eq!(engine.state().status, OnboardingStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_on_first_step_is_noop() {
        let engine = StepEngine::with_steps(vec![Step::new("A"), Step::new("B")]);
        engine.start().unwrap();
        let mut changes = engine.changes();

        engine.back().unwrap();

        assert_eq!(changes.drain().len(), 1);
        assert_eq!(engine.state().step_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_steps_completes() {
        let engine = StepEngine::new();
        engine.start().unwrap();
        assert_eq!(engine.state().status, OnboardingStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_and_start_require_idle() {
        let engine = StepEngine::new();
        engine.configure(vec![Step::new("A")]).unwrap();
        assert_eq!(engine.state().total_steps, 1);
        engine.start().unwrap();

        assert!(matches!(
            engine.configure(vec![Step::new("B")]),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(engine.start(), Err(Error::InvalidState { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_pending_timer() {
        let engine =
            StepEngine::with_steps(vec![Step::new("A").with_auto_advance(ms(50)), Step::new("B")]);
        engine.start().unwrap();

        engine.dispose();
        sleep_ms(100).await;

        assert_eq!(engine.state().step_index, 0);
        assert!(engine.is_disposed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_after_dispose_fail() {
        let engine = StepEngine::with_steps(vec![Step::new("A")]);
        engine.dispose();
        engine.dispose();

        assert!(matches!(engine.start(), Err(Error::Disposed { .. })));
        assert!(matches!(engine.next(), Err(Error::Disposed { .. })));
        assert!(matches!(engine.skip(), Err(Error::Disposed { .. })));
        assert!(matches!(
            engine.configure(Vec::new()),
            Err(Error::Disposed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_follow_navigation() {
        let engine = StepEngine::with_steps(vec![Step::new("A"), Step::new("B")]);
        let mut changes = engine.changes();

        engine.start().unwrap();
        engine.next().unwrap();
        engine.complete().unwrap();

        let seen: Vec<(OnboardingStatus, usize)> = changes
            .drain()
            .into_iter()
            .map(|s| (s.status, s.step_index))
            .collect();
        assert_eq!(
            seen,
            vec![
                (OnboardingStatus::Idle, 0),
                (OnboardingStatus::Running, 0),
                (OnboardingStatus::Running, 1),
                (OnboardingStatus::Completed, 1),
            ]
        );
    }
}
