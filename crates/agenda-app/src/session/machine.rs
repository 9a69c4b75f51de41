//! Authentication session state machine
//!
//! [`SessionMachine`] owns the current [`SessionState`] in a [`Signal`] and
//! drives every transition through an [`AuthRepository`]. Credential and
//! refresh calls go through per-intent debouncers: every call inside one
//! quiet period shares a single repository round trip and its result.
//!
//! Transitions of one machine are serialized on a FIFO operation lock, so a
//! `log_out` issued while a refresh is in flight is applied after it. The
//! repository's auth-state stream is applied as it arrives and is not
//! ordered against that lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use agenda_core::prelude::*;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::repository::{AuthRepository, AuthResult, AuthStateEvent};
use super::state::{PostDisposePolicy, SessionState};
use crate::config::SessionSettings;
use crate::reactive::{lock, Debouncer, Disposable, Signal, SignalStream};

const COMPONENT: &str = "SessionMachine";

/// Tuning for a [`SessionMachine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Quiet period for `log_in` and `sign_in`
    pub auth_debounce: Duration,
    /// Quiet period for `refresh_session`
    pub refresh_debounce: Duration,
    pub post_dispose_policy: PostDisposePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_debounce: Duration::from_millis(300),
            refresh_debounce: Duration::from_millis(1000),
            post_dispose_policy: PostDisposePolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_auth_debounce(mut self, delay: Duration) -> Self {
        self.auth_debounce = delay;
        self
    }

    pub fn with_refresh_debounce(mut self, delay: Duration) -> Self {
        self.refresh_debounce = delay;
        self
    }

    pub fn with_post_dispose_policy(mut self, policy: PostDisposePolicy) -> Self {
        self.post_dispose_policy = policy;
        self
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            auth_debounce: Duration::from_millis(settings.auth_debounce_ms),
            refresh_debounce: Duration::from_millis(settings.refresh_debounce_ms),
            post_dispose_policy: settings.post_dispose_policy,
        }
    }
}

type Waiter<T> = oneshot::Sender<AuthResult<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialIntent {
    LogIn,
    SignIn,
}

/// Calls collapsed into one debounce window; the last credentials win
struct CredentialBatch {
    email: String,
    password: String,
    waiters: Vec<Waiter<User>>,
}

#[derive(Default)]
struct PendingCalls {
    log_in: Option<CredentialBatch>,
    sign_in: Option<CredentialBatch>,
    refresh: Vec<Waiter<Option<User>>>,
}

impl PendingCalls {
    fn credentials(&mut self, intent: CredentialIntent) -> &mut Option<CredentialBatch> {
        match intent {
            CredentialIntent::LogIn => &mut self.log_in,
            CredentialIntent::SignIn => &mut self.sign_in,
        }
    }
}

struct MachineInner<R> {
    repository: R,
    config: SessionConfig,
    state: Signal<SessionState>,
    disposed: AtomicBool,
    /// FIFO operation lock; tokio's mutex queues waiters fairly
    transitions: tokio::sync::Mutex<()>,
    log_in_debouncer: Debouncer,
    sign_in_debouncer: Debouncer,
    refresh_debouncer: Debouncer,
    pending: Mutex<PendingCalls>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to an authentication session
///
/// Cloning shares the same machine.
pub struct SessionMachine<R> {
    inner: Arc<MachineInner<R>>,
}

impl<R> Clone for SessionMachine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> std::fmt::Debug for SessionMachine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMachine")
            .field("state", &self.inner.state.read())
            .field("config", &self.inner.config)
            .field("disposed", &self.inner.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

impl<R> SessionMachine<R>
where
    R: AuthRepository + Sync + 'static,
{
    /// Create a machine in `Unauthenticated` and start following the
    /// repository's auth-state stream.
    ///
    /// Must be called within a tokio runtime. Fails if either debounce
    /// delay is zero.
    pub fn new(repository: R, config: SessionConfig) -> Result<Self> {
        let inner = Arc::new(MachineInner {
            log_in_debouncer: Debouncer::new(config.auth_debounce)?,
            sign_in_debouncer: Debouncer::new(config.auth_debounce)?,
            refresh_debouncer: Debouncer::new(config.refresh_debounce)?,
            repository,
            config,
            state: Signal::new(SessionState::Unauthenticated),
            disposed: AtomicBool::new(false),
            transitions: tokio::sync::Mutex::new(()),
            pending: Mutex::new(PendingCalls::default()),
            listener: Mutex::new(None),
        });

        let mut events = inner.repository.auth_state_changes();
        let weak = Arc::downgrade(&inner);
        let listener = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.apply_auth_event(event);
            }
            trace!("Auth state stream ended");
        });
        *lock(&inner.listener) = Some(listener);

        Ok(Self { inner })
    }

    // ─────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────

    /// Log in with email and password (debounced)
    pub async fn log_in(&self, email: &str, password: &str) -> Result<User> {
        let rx = self.enqueue_credentials(CredentialIntent::LogIn, email, password)?;
        await_shared(rx).await
    }

    /// Create an account and sign in (debounced)
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let rx = self.enqueue_credentials(CredentialIntent::SignIn, email, password)?;
        await_shared(rx).await
    }

    pub async fn log_in_with_google(&self) -> Result<User> {
        let inner = &self.inner;
        let _op = inner.begin_transition().await?;
        inner.transition(SessionState::Authenticating);
        let result = inner.repository.log_in_with_google().await;
        inner.settle_user(result)
    }

    /// Re-validate the current session. `Ok(None)` when nobody is signed in.
    pub async fn log_in_silently(&self) -> Result<Option<User>> {
        let inner = &self.inner;
        let _op = inner.begin_transition().await?;
        let Some(user) = inner.live_user() else {
            inner.transition(SessionState::Unauthenticated);
            return Ok(None);
        };
        let result = inner.repository.log_in_silently(&user).await;
        inner.settle_user(result).map(Some)
    }

    /// Refresh the session's tokens (debounced)
    ///
    /// Publishes `Refreshing` while the repository call is in flight.
    /// `Ok(None)` when nobody is signed in.
    pub async fn refresh_session(&self) -> Result<Option<User>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.inner.pending);
            self.inner.ensure_live()?;
            pending.refresh.push(tx);
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.refresh_debouncer.schedule(move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.run_refresh().await;
            }
        });
        await_shared(rx).await
    }

    /// Sign out the current user
    ///
    /// On repository failure the machine moves to `SessionError` and the
    /// failure is returned.
    pub async fn log_out(&self) -> Result<()> {
        let inner = &self.inner;
        let _op = inner.begin_transition().await?;
        let Some(user) = inner.live_user() else {
            inner.transition(SessionState::Unauthenticated);
            return Ok(());
        };
        let result = inner.repository.log_out_user(&user).await;
        inner.ensure_live_after_call()?;
        match result {
            Ok(()) => {
                inner.transition(SessionState::Unauthenticated);
                Ok(())
            }
            Err(failure) => {
                inner.transition(SessionState::SessionError {
                    error: failure.clone(),
                });
                Err(failure.into())
            }
        }
    }

    /// Ask the repository who is signed in, passing through `Authenticating`
    pub async fn get_current_user(&self) -> Result<User> {
        let inner = &self.inner;
        let _op = inner.begin_transition().await?;
        inner.transition(SessionState::Authenticating);
        let result = inner.repository.get_current_user().await;
        inner.settle_user(result)
    }

    /// Start password recovery. Does not change state.
    pub async fn recover_password(&self, email: &str) -> Result<()> {
        self.inner.ensure_live()?;
        self.inner
            .repository
            .recover_password(email)
            .await
            .map_err(Error::from)
    }

    /// Ask the repository whether a session exists. Does not change state.
    pub async fn is_signed_in(&self) -> Result<bool> {
        self.inner.ensure_live()?;
        self.inner
            .repository
            .is_signed_in()
            .await
            .map_err(Error::from)
    }

    fn enqueue_credentials(
        &self,
        intent: CredentialIntent,
        email: &str,
        password: &str,
    ) -> Result<oneshot::Receiver<AuthResult<User>>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.inner.pending);
            // Checked under the pending lock so dispose cannot strand us
            self.inner.ensure_live()?;
            let slot = pending.credentials(intent);
            match slot {
                Some(batch) => {
                    batch.email = email.to_string();
                    batch.password = password.to_string();
                    batch.waiters.push(tx);
                }
                None => {
                    *slot = Some(CredentialBatch {
                        email: email.to_string(),
                        password: password.to_string(),
                        waiters: vec![tx],
                    });
                }
            }
        }

        let weak: Weak<MachineInner<R>> = Arc::downgrade(&self.inner);
        let debouncer = match intent {
            CredentialIntent::LogIn => &self.inner.log_in_debouncer,
            CredentialIntent::SignIn => &self.inner.sign_in_debouncer,
        };
        debouncer.schedule(move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.run_credentials(intent).await;
            }
        });
        Ok(rx)
    }

    // ─────────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────────

    /// Current state, following the post-dispose policy once disposed
    pub fn current_snapshot(&self) -> SessionState {
        let inner = &self.inner;
        if inner.is_disposed()
            && inner.config.post_dispose_policy == PostDisposePolicy::ReturnSessionError
        {
            return SessionState::SessionError {
                error: Failure::disposed(COMPONENT),
            };
        }
        inner.state.read()
    }

    /// True in `Authenticated` and `Refreshing`
    pub fn is_authenticated(&self) -> bool {
        self.current_snapshot().is_authenticated()
    }

    /// The signed-in user, or the empty user
    pub fn current_user(&self) -> User {
        self.current_snapshot().user().cloned().unwrap_or_default()
    }

    /// Stream of state transitions, starting with the current state
    ///
    /// After dispose a new subscriber receives the last state once.
    pub fn changes(&self) -> SignalStream<SessionState> {
        self.inner.state.subscribe_or_last()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn repository(&self) -> &R {
        &self.inner.repository
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Tear the machine down. Idempotent.
    ///
    /// Pending debounced callers fail with [`Error::Disposed`]; results of
    /// repository calls still in flight are dropped.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl<R> Disposable for SessionMachine<R>
where
    R: AuthRepository + Sync + 'static,
{
    fn dispose(&self) {
        SessionMachine::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        SessionMachine::is_disposed(self)
    }
}

impl<R> MachineInner<R>
where
    R: AuthRepository + Sync + 'static,
{
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::disposed(COMPONENT));
        }
        Ok(())
    }

    /// Like `ensure_live`, for results that arrive after a repository call
    fn ensure_live_after_call(&self) -> Result<()> {
        if self.is_disposed() {
            trace!("Dropping repository result that arrived after dispose");
            return Err(Error::disposed(COMPONENT));
        }
        Ok(())
    }

    async fn begin_transition(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        self.ensure_live()?;
        let guard = self.transitions.lock().await;
        self.ensure_live()?;
        Ok(guard)
    }

    fn live_user(&self) -> Option<User> {
        self.state.read().user().cloned()
    }

    fn transition(&self, next: SessionState) {
        if self.is_disposed() {
            trace!("Ignoring transition to {} after dispose", next);
            return;
        }
        debug!("Session {} -> {}", self.state.read(), next);
        self.state.write(next);
    }

    fn settle_user(&self, result: AuthResult<User>) -> Result<User> {
        self.ensure_live_after_call()?;
        match result {
            Ok(user) => {
                self.transition(SessionState::Authenticated { user: user.clone() });
                Ok(user)
            }
            Err(failure) => {
                self.transition(SessionState::SessionError {
                    error: failure.clone(),
                });
                Err(failure.into())
            }
        }
    }

    /// Run one collapsed credential batch and fan its result out
    ///
    /// Returning without sending drops the waiters, which then report
    /// `Disposed`.
    async fn run_credentials(&self, intent: CredentialIntent) {
        let batch = {
            let mut pending = lock(&self.pending);
            pending.credentials(intent).take()
        };
        let Some(batch) = batch else {
            return;
        };
        if batch.waiters.len() > 1 {
            debug!(
                "Collapsed {} {:?} calls into one request",
                batch.waiters.len(),
                intent
            );
        }

        let Ok(_op) = self.begin_transition().await else {
            return;
        };
        self.transition(SessionState::Authenticating);
        let result = match intent {
            CredentialIntent::LogIn => {
                self.repository
                    .log_in_user_and_password(&batch.email, &batch.password)
                    .await
            }
            CredentialIntent::SignIn => {
                self.repository
                    .sign_in_user_and_password(&batch.email, &batch.password)
                    .await
            }
        };

        let shared = match self.settle_user(result) {
            Ok(user) => Ok(user),
            Err(Error::Failure(failure)) => Err(failure),
            Err(_) => return,
        };
        for waiter in batch.waiters {
            let _ = waiter.send(shared.clone());
        }
    }

    async fn run_refresh(&self) {
        let waiters = std::mem::take(&mut lock(&self.pending).refresh);
        if waiters.is_empty() {
            return;
        }

        let Ok(_op) = self.begin_transition().await else {
            return;
        };
        let shared: AuthResult<Option<User>> = match self.live_user() {
            None => {
                self.transition(SessionState::Unauthenticated);
                Ok(None)
            }
            Some(user) => {
                self.transition(SessionState::Refreshing { user: user.clone() });
                let result = self.repository.refresh_session(&user).await;
                match self.settle_user(result) {
                    Ok(user) => Ok(Some(user)),
                    Err(Error::Failure(failure)) => Err(failure),
                    Err(_) => return,
                }
            }
        };
        for waiter in waiters {
            let _ = waiter.send(shared.clone());
        }
    }

    fn apply_auth_event(&self, event: AuthStateEvent) {
        let next = match event {
            Ok(Some(user)) => SessionState::Authenticated { user },
            Ok(None) => SessionState::Unauthenticated,
            Err(error) => SessionState::SessionError { error },
        };
        self.transition(next);
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Disposing session machine in state {}", self.state.read());

        self.log_in_debouncer.dispose();
        self.sign_in_debouncer.dispose();
        self.refresh_debouncer.dispose();
        // Dropping the senders fails every waiting caller with Disposed
        *lock(&self.pending) = PendingCalls::default();
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
        self.state.dispose();
    }
}

impl<R> Drop for MachineInner<R> {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }
}

async fn await_shared<T>(rx: oneshot::Receiver<AuthResult<T>>) -> Result<T> {
    match rx.await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::disposed(COMPONENT)),
    }
}
