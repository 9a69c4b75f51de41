//! Authentication repository contract
//!
//! Adapters (HTTP, identity providers, the in-memory fake) implement
//! [`AuthRepository`]. Every call reports failure as a structured
//! [`Failure`] rather than panicking.

use agenda_core::{Failure, User};
use tokio::sync::mpsc;

/// Result of a repository call
pub type AuthResult<T> = std::result::Result<T, Failure>;

/// One event from the provider's auth-state stream: a user, no user, or an error
pub type AuthStateEvent = AuthResult<Option<User>>;

/// Provider-driven stream of auth-state events
pub type AuthStateChanges = mpsc::UnboundedReceiver<AuthStateEvent>;

/// Authentication backend
#[trait_variant::make(AuthRepository: Send)]
pub trait LocalAuthRepository {
    async fn log_in_user_and_password(&self, email: &str, password: &str) -> AuthResult<User>;

    async fn sign_in_user_and_password(&self, email: &str, password: &str) -> AuthResult<User>;

    async fn log_in_with_google(&self) -> AuthResult<User>;

    /// Re-validate an existing session without prompting
    async fn log_in_silently(&self, current_user: &User) -> AuthResult<User>;

    /// Exchange the user's refresh token for a fresh session
    async fn refresh_session(&self, current_user: &User) -> AuthResult<User>;

    async fn recover_password(&self, email: &str) -> AuthResult<()>;

    async fn log_out_user(&self, user: &User) -> AuthResult<()>;

    async fn get_current_user(&self) -> AuthResult<User>;

    async fn is_signed_in(&self) -> AuthResult<bool>;

    /// Subscribe to provider-side auth changes
    fn auth_state_changes(&self) -> AuthStateChanges;
}
