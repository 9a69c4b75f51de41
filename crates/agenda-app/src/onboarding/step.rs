//! Step configuration

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agenda_core::Failure;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::StepSettings;

/// Async hook run each time a step is entered
pub type EntryAction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), Failure>> + Send + Sync>;

/// One immutable onboarding step
#[derive(Clone)]
pub struct Step {
    title: String,
    entry_action: Option<EntryAction>,
    auto_advance: Option<Duration>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("title", &self.title)
            .field("entry_action", &self.entry_action.is_some())
            .field("auto_advance", &self.auto_advance)
            .finish()
    }
}

impl Step {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entry_action: None,
            auto_advance: None,
        }
    }

    /// Run `action` whenever this step is entered; the engine only arms
    /// auto-advance once it succeeds.
    pub fn with_entry_action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.entry_action = Some(Arc::new(move || action().boxed()));
        self
    }

    pub fn with_auto_advance(mut self, delay: Duration) -> Self {
        self.auto_advance = Some(delay);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn entry_action(&self) -> Option<&EntryAction> {
        self.entry_action.as_ref()
    }

    pub fn auto_advance(&self) -> Option<Duration> {
        self.auto_advance
    }
}

impl From<&StepSettings> for Step {
    fn from(settings: &StepSettings) -> Self {
        let step = Step::new(settings.title.clone());
        match settings.auto_advance_ms {
            Some(ms) => step.with_auto_advance(Duration::from_millis(ms)),
            None => step,
        }
    }
}
