//! Authentication session
//!
//! - [`SessionState`] - the five session states
//! - [`AuthRepository`] - backend contract the machine calls into
//! - [`SessionMachine`] - debounced, disposable state machine over a repository
//! - [`InMemoryAuthRepository`] - process-local backend for the runner and tests

pub mod machine;
pub mod memory;
pub mod repository;
pub mod state;

pub use machine::{SessionConfig, SessionMachine};
pub use memory::{AuthOperation, InMemoryAuthRepository};
pub use repository::{
    AuthRepository, AuthResult, AuthStateChanges, AuthStateEvent, LocalAuthRepository,
};
pub use state::{PostDisposePolicy, SessionState};
