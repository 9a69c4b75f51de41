//! Headless mode runner
//!
//! Builds the registry from `.agenda/config.toml`, logs in with the given
//! credentials, walks the onboarding steps, logs out and disposes everything.
//! Transitions are forwarded to a single printer task as [`HeadlessEvent`]s.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agenda_app::config::{load_settings, StepSettings};
use agenda_app::{
    ContainerRegistry, InMemoryAuthRepository, KeyedListenerSignal, OnboardingState,
    OnboardingStatus, SessionConfig, SessionMachine, SessionState, Signal, SignalStream, Step,
    StepEngine,
};
use agenda_core::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::HeadlessEvent;

/// Account the in-memory backend is seeded with
pub const DEMO_EMAIL: &str = "demo@agenda.dev";
pub const DEMO_PASSWORD: &str = "agenda";

const SESSION_KEY: &str = "session";
const ONBOARDING_KEY: &str = "onboarding";
const USER_KEY: &str = "user";
const USER_LISTENER: &str = "headless";

type DemoSession = SessionMachine<InMemoryAuthRepository>;

/// Where events go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    /// NDJSON on stdout
    Json,
    /// One readable line per event on stdout
    #[default]
    Text,
    /// Collected only
    Silent,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub output: Output,
    /// Email and password to log in with; without them the run stops after
    /// the silent log-in attempt
    pub credentials: Option<(String, String)>,
    /// Simulated backend latency
    pub latency: Duration,
}

/// Last live states and every event of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub session: SessionState,
    pub onboarding: OnboardingState,
    pub events: Vec<HeadlessEvent>,
}

/// Run once against the project at `project_path`
pub async fn run(project_path: &Path, options: RunOptions) -> Result<RunSummary> {
    info!("═══════════════════════════════════════════════════════");
    info!("Agenda starting in HEADLESS mode");
    info!("Project: {}", project_path.display());
    info!("═══════════════════════════════════════════════════════");

    let settings = load_settings(project_path);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(event_rx, options.output));
    send(&event_tx, HeadlessEvent::started(&project_path.display().to_string()));

    let repository = InMemoryAuthRepository::new()
        .with_account(DEMO_EMAIL, DEMO_PASSWORD, "Demo User")
        .with_latency(options.latency);
    let session = Arc::new(
        SessionMachine::new(repository, SessionConfig::from(&settings.session))
            .context("Failed to create session machine")?,
    );
    let steps: Vec<Step> = settings.onboarding.steps.iter().map(Step::from).collect();
    let onboarding = Arc::new(StepEngine::with_steps(steps));
    let user = KeyedListenerSignal::new(User::default());

    let listener_tx = event_tx.clone();
    user.register_listener(
        USER_LISTENER,
        move |user: &User| send(&listener_tx, HeadlessEvent::user_changed(user)),
        false,
    );

    let forwarders = [
        spawn_session_forwarder(session.changes(), user.signal().clone(), event_tx.clone()),
        spawn_onboarding_forwarder(onboarding.changes(), event_tx.clone()),
    ];

    let mut registry = ContainerRegistry::new();
    registry.register_module(SESSION_KEY, session);
    registry.register_module(ONBOARDING_KEY, onboarding);
    registry.register_signal(USER_KEY, user.signal().clone());

    let result = drive(&registry, &settings.onboarding.steps, &options, &event_tx).await;
    if let Err(e) = &result {
        error!("Headless run failed: {}", e);
        send(&event_tx, HeadlessEvent::error(e, true));
    }

    let session_state = registry
        .get_module::<DemoSession>(SESSION_KEY)?
        .current_snapshot();
    let onboarding_state = registry
        .get_module::<StepEngine>(ONBOARDING_KEY)?
        .state();

    let disposed = registry.len();
    registry.dispose_all();
    user.dispose();
    for forwarder in forwarders {
        if let Err(e) = forwarder.await {
            warn!("Forwarder task ended abnormally: {}", e);
        }
    }
    send(&event_tx, HeadlessEvent::shutdown(disposed));
    drop(event_tx);

    let events = printer.await.unwrap_or_else(|e| {
        error!("Event printer ended abnormally: {}", e);
        Vec::new()
    });

    info!("Agenda headless mode exiting");
    result.map(|()| RunSummary {
        session: session_state,
        onboarding: onboarding_state,
        events,
    })
}

/// Log in, refresh, walk onboarding, log out
async fn drive(
    registry: &ContainerRegistry,
    steps: &[StepSettings],
    options: &RunOptions,
    events: &mpsc::UnboundedSender<HeadlessEvent>,
) -> Result<()> {
    let session = registry.get_module::<DemoSession>(SESSION_KEY)?;
    let onboarding = registry.get_module::<StepEngine>(ONBOARDING_KEY)?;

    if session.log_in_silently().await?.is_none() {
        debug!("No existing session");
    }

    let Some((email, password)) = &options.credentials else {
        info!("No credentials given, skipping log-in");
        return Ok(());
    };

    match session.log_in(email, password).await {
        Ok(user) => info!("Logged in as {}", user.email),
        Err(e) if e.is_recoverable() => {
            warn!("Log-in failed: {}", e);
            send(events, HeadlessEvent::error(&e, false));
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    session
        .refresh_session()
        .await
        .context("Session refresh failed")?;
    run_onboarding(&onboarding, steps).await?;
    session.log_out().await.context("Log-out failed")
}

/// Start the engine and advance manual steps until it finishes
///
/// Steps without an auto-advance delay are advanced as soon as they are
/// shown; a step whose entry fails ends onboarding with `Skipped`.
async fn run_onboarding(engine: &StepEngine, steps: &[StepSettings]) -> Result<()> {
    let mut changes = engine.changes();
    engine.start()?;

    let mut advanced_from: Option<usize> = None;
    while let Some(state) = changes.recv().await {
        match state.status {
            OnboardingStatus::Completed | OnboardingStatus::Skipped => break,
            OnboardingStatus::Idle => {}
            OnboardingStatus::Running => {
                if state.error.is_some() {
                    engine.skip()?;
                    continue;
                }
                let manual = steps
                    .get(state.step_index)
                    .map_or(true, |step| step.auto_advance_ms.is_none());
                if manual && advanced_from != Some(state.step_index) {
                    advanced_from = Some(state.step_index);
                    engine.next()?;
                }
            }
        }
    }
    Ok(())
}

fn spawn_session_forwarder(
    mut changes: SignalStream<SessionState>,
    user: Signal<User>,
    events: mpsc::UnboundedSender<HeadlessEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(state) = changes.recv().await {
            let current = state.user().cloned().unwrap_or_default();
            send(&events, HeadlessEvent::session_changed(state));
            if current.id != user.read().id {
                user.write(current);
            }
        }
    })
}

fn spawn_onboarding_forwarder(
    mut changes: SignalStream<OnboardingState>,
    events: mpsc::UnboundedSender<HeadlessEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(state) = changes.recv().await {
            send(&events, HeadlessEvent::onboarding_changed(state));
        }
    })
}

async fn print_events(
    mut events: mpsc::UnboundedReceiver<HeadlessEvent>,
    output: Output,
) -> Vec<HeadlessEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        match output {
            Output::Json => event.emit(),
            Output::Text => println!("{}", event.describe()),
            Output::Silent => {}
        }
        seen.push(event);
    }
    seen
}

fn send(events: &mpsc::UnboundedSender<HeadlessEvent>, event: HeadlessEvent) {
    if events.send(event).is_err() {
        trace!("Event printer gone, dropping event");
    }
}
