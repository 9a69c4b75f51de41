//! In-memory authentication backend
//!
//! Keeps accounts in a map and issues counter-based tokens. Used by the
//! headless runner and by tests; supports simulated latency, injected
//! failures and provider-side auth events.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use agenda_core::{Failure, User};
use tokio::sync::mpsc;

use super::repository::{AuthRepository, AuthResult, AuthStateChanges, AuthStateEvent};
use crate::reactive::lock;

/// Repository operations, for call counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthOperation {
    LogIn,
    SignIn,
    Google,
    Silent,
    Refresh,
    RecoverPassword,
    LogOut,
    CurrentUser,
    IsSignedIn,
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: User,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Keyed by lowercased email
    accounts: HashMap<String, Account>,
    google_user: Option<User>,
    current: Option<User>,
    next_token: u64,
    failures: HashMap<AuthOperation, Failure>,
    calls: HashMap<AuthOperation, usize>,
}

impl MemoryState {
    fn issue_tokens(&mut self, user: User) -> User {
        self.next_token += 1;
        let n = self.next_token;
        user.with_tokens(format!("access-{}", n), format!("refresh-{}", n))
    }
}

/// [`AuthRepository`] backed by a process-local account table
#[derive(Debug, Default)]
pub struct InMemoryAuthRepository {
    state: Mutex<MemoryState>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<AuthStateEvent>>>,
    latency: Duration,
}

impl InMemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add an email/password account
    pub fn with_account(self, email: &str, password: &str, display_name: &str) -> Self {
        {
            let mut state = lock(&self.state);
            let id = format!("user-{}", state.accounts.len() + 1);
            let user = User::new(id, email).with_display_name(display_name);
            state.accounts.insert(
                email.to_lowercase(),
                Account {
                    password: password.to_string(),
                    user,
                },
            );
        }
        self
    }

    /// Account returned by the Google sign-in flow
    pub fn with_google_account(self, user: User) -> Self {
        lock(&self.state).google_user = Some(user);
        self
    }

    /// Make the next call to `operation` fail with `failure`
    pub fn fail_next(&self, operation: AuthOperation, failure: Failure) {
        lock(&self.state).failures.insert(operation, failure);
    }

    /// How many times `operation` reached the repository
    pub fn call_count(&self, operation: AuthOperation) -> usize {
        lock(&self.state)
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// The user the backend currently considers signed in
    pub fn signed_in_user(&self) -> Option<User> {
        lock(&self.state).current.clone()
    }

    /// Push a provider-side auth event to every subscriber
    pub fn emit_auth_state(&self, event: AuthStateEvent) {
        lock(&self.listeners).retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Count the call, wait out the latency, and consume an injected failure
    async fn begin(&self, operation: AuthOperation) -> AuthResult<()> {
        *lock(&self.state).calls.entry(operation).or_insert(0) += 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match lock(&self.state).failures.remove(&operation) {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

impl AuthRepository for InMemoryAuthRepository {
    async fn log_in_user_and_password(&self, email: &str, password: &str) -> AuthResult<User> {
        self.begin(AuthOperation::LogIn).await?;
        let mut state = lock(&self.state);
        let account = state
            .accounts
            .get(&email.to_lowercase())
            .filter(|account| account.password == password)
            .cloned()
            .ok_or_else(Failure::invalid_credentials)?;
        let user = state.issue_tokens(account.user);
        state.current = Some(user.clone());
        Ok(user)
    }

    async fn sign_in_user_and_password(&self, email: &str, password: &str) -> AuthResult<User> {
        self.begin(AuthOperation::SignIn).await?;
        let mut state = lock(&self.state);
        let key = email.to_lowercase();
        if state.accounts.contains_key(&key) {
            return Err(Failure::new(
                "Account exists",
                "email_in_use",
                format!("An account for {} already exists", email),
            ));
        }
        let id = format!("user-{}", state.accounts.len() + 1);
        let user = User::new(id, email);
        state.accounts.insert(
            key,
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        let user = state.issue_tokens(user);
        state.current = Some(user.clone());
        Ok(user)
    }

    async fn log_in_with_google(&self) -> AuthResult<User> {
        self.begin(AuthOperation::Google).await?;
        let mut state = lock(&self.state);
        let user = state.google_user.clone().ok_or_else(|| {
            Failure::new(
                "Google sign-in unavailable",
                "provider_unavailable",
                "No Google account is linked",
            )
        })?;
        let user = state.issue_tokens(user);
        state.current = Some(user.clone());
        Ok(user)
    }

    async fn log_in_silently(&self, current_user: &User) -> AuthResult<User> {
        self.begin(AuthOperation::Silent).await?;
        let mut state = lock(&self.state);
        match state.current.clone() {
            Some(user) if user.id == current_user.id => {
                let user = state.issue_tokens(user);
                state.current = Some(user.clone());
                Ok(user)
            }
            _ => Err(Failure::no_session()),
        }
    }

    async fn refresh_session(&self, current_user: &User) -> AuthResult<User> {
        self.begin(AuthOperation::Refresh).await?;
        let mut state = lock(&self.state);
        match state.current.clone() {
            Some(user)
                if user.id == current_user.id
                    && user.refresh_token == current_user.refresh_token =>
            {
                let user = state.issue_tokens(user);
                state.current = Some(user.clone());
                Ok(user)
            }
            _ => Err(Failure::new(
                "Session expired",
                "session_expired",
                "The refresh token is no longer valid",
            )),
        }
    }

    async fn recover_password(&self, email: &str) -> AuthResult<()> {
        self.begin(AuthOperation::RecoverPassword).await?;
        if lock(&self.state).accounts.contains_key(&email.to_lowercase()) {
            Ok(())
        } else {
            Err(Failure::new(
                "Unknown account",
                "unknown_account",
                format!("No account for {}", email),
            ))
        }
    }

    async fn log_out_user(&self, user: &User) -> AuthResult<()> {
        self.begin(AuthOperation::LogOut).await?;
        let mut state = lock(&self.state);
        if state.current.as_ref().map(|u| &u.id) == Some(&user.id) {
            state.current = None;
        }
        Ok(())
    }

    async fn get_current_user(&self) -> AuthResult<User> {
        self.begin(AuthOperation::CurrentUser).await?;
        lock(&self.state).current.clone().ok_or_else(Failure::no_session)
    }

    async fn is_signed_in(&self) -> AuthResult<bool> {
        self.begin(AuthOperation::IsSignedIn).await?;
        Ok(lock(&self.state).current.is_some())
    }

    fn auth_state_changes(&self) -> AuthStateChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).push(tx);
        rx
    }
}
