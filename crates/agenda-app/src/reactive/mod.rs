//! Reactive state containers
//!
//! - [`Signal`] - single value with broadcast-with-replay subscription
//! - [`KeyedListenerSignal`] - signal that also fans out to keyed callbacks
//! - [`ContainerRegistry`] - keyed ownership of signals and disposable modules
//! - [`Debouncer`] - coalesces bursts of scheduled actions into the last one

pub mod debouncer;
pub mod keyed;
pub mod registry;
pub mod signal;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use debouncer::Debouncer;
pub use keyed::{KeyedListenerSignal, ListenerCallback};
pub use registry::ContainerRegistry;
pub use signal::{Signal, SignalStream};

/// A resource with an explicit, idempotent teardown
pub trait Disposable: Send + Sync {
    /// Release the resource. Calling this more than once is a no-op.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this crate leaves its data consistent before
/// running foreign code, so a poisoned lock carries no torn state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
