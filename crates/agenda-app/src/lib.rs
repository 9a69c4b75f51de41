//! agenda-app - Reactive state, session and onboarding for Agenda
//!
//! This crate implements the reactive containers (signals, keyed listeners,
//! the container registry and the debouncer) and the two state machines built
//! on them: the authentication session and the onboarding step engine. It
//! also loads `.agenda/config.toml`.

pub mod config;
pub mod onboarding;
pub mod reactive;
pub mod session;

// Re-export primary types
pub use config::Settings;
pub use onboarding::{OnboardingState, OnboardingStatus, Step, StepEngine};
pub use reactive::{
    ContainerRegistry, Debouncer, Disposable, KeyedListenerSignal, Signal, SignalStream,
};
pub use session::{
    AuthRepository, InMemoryAuthRepository, PostDisposePolicy, SessionConfig, SessionMachine,
    SessionState,
};
