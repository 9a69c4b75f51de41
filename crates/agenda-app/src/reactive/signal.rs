//! Single-value container with broadcast-with-replay subscription
//!
//! A [`Signal`] holds one value. Every new subscriber first receives the
//! current value, then every later write in the order the writes happened.
//! Fan-out of one write to all subscribers happens under the state lock,
//! before the next write becomes visible.
//!
//! Observers run outside that lock. A write issued while observers are
//! being dispatched, including one from inside an observer, is queued and
//! delivered after the current value has reached every observer.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::trace;

use super::{lock, Disposable};

/// Synchronous observer invoked on the writer's task after each write
pub(crate) type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Shared handle to a single mutable value
///
/// Cloning a `Signal` clones the handle, not the value: all clones observe
/// and publish through the same channel.
pub struct Signal<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<SignalState<T>>,
}

struct SignalState<T> {
    value: T,
    closed: bool,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    observers: Vec<Observer<T>>,
    /// Values still owed to observers, oldest first
    pending: VecDeque<T>,
    /// Set while some caller is draining `pending`
    dispatching: bool,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Signal")
            .field("value", &state.value)
            .field("closed", &state.closed)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl<T: Default + Clone + Send + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Send + 'static> Signal<T> {
    /// Create a signal holding `value`
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SignalState {
                    value,
                    closed: false,
                    subscribers: Vec::new(),
                    observers: Vec::new(),
                    pending: VecDeque::new(),
                    dispatching: false,
                }),
            }),
        }
    }

    /// Current value, without side effects
    pub fn read(&self) -> T {
        lock(&self.inner.state).value.clone()
    }

    /// Replace the value and publish it to every subscriber
    ///
    /// Ignored once the signal is disposed.
    pub fn write(&self, value: T) {
        self.publish(|current| *current = value);
    }

    /// Modify the value in place and publish the result
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        self.publish(f);
    }

    fn publish<F>(&self, mutate: F)
    where
        F: FnOnce(&mut T),
    {
        {
            let mut state = lock(&self.inner.state);
            if state.closed {
                trace!("Ignoring write to disposed signal");
                return;
            }
            mutate(&mut state.value);
            let value = state.value.clone();
            // Receivers that hung up are pruned on the way
            state
                .subscribers
                .retain(|tx| tx.send(value.clone()).is_ok());

            if state.observers.is_empty() {
                return;
            }
            state.pending.push_back(value);
            if state.dispatching {
                trace!("Observer dispatch in progress, queued value");
                return;
            }
            state.dispatching = true;
        }

        let _dispatch = DispatchGuard { inner: &*self.inner };
        loop {
            let (value, observers) = {
                let mut state = lock(&self.inner.state);
                match state.pending.pop_front() {
                    Some(value) => (value, state.observers.clone()),
                    None => {
                        state.dispatching = false;
                        return;
                    }
                }
            };
            for observer in &observers {
                observer(&value);
            }
        }
    }

    /// Subscribe to the current value and every later write
    ///
    /// A subscriber joining after the signal was disposed gets an already
    /// finished stream.
    pub fn subscribe(&self) -> SignalStream<T> {
        let mut state = lock(&self.inner.state);
        let (tx, rx) = mpsc::unbounded_channel();
        if !state.closed {
            let _ = tx.send(state.value.clone());
            state.subscribers.push(tx);
        }
        SignalStream { rx }
    }

    /// Like [`subscribe`](Self::subscribe), but a subscriber joining after
    /// dispose receives the last value once before the stream ends.
    pub fn subscribe_or_last(&self) -> SignalStream<T> {
        let mut state = lock(&self.inner.state);
        if state.closed {
            return SignalStream::replay_once(state.value.clone());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(state.value.clone());
        state.subscribers.push(tx);
        SignalStream { rx }
    }

    /// Attach a synchronous observer, called after every write.
    ///
    /// Observers run without any signal lock held and may write back to the
    /// same signal; such writes are delivered once the current value has
    /// reached every observer.
    pub(crate) fn observe(&self, observer: Observer<T>) {
        let mut state = lock(&self.inner.state);
        if !state.closed {
            state.observers.push(observer);
        }
    }

    /// Number of live channel subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut state = lock(&self.inner.state);
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    /// Close the channel. Idempotent.
    ///
    /// Existing subscribers drain what was already published and then see
    /// the end of the stream. The last value stays readable.
    pub fn dispose(&self) {
        let mut state = lock(&self.inner.state);
        if state.closed {
            return;
        }
        state.closed = true;
        state.subscribers.clear();
        state.observers.clear();
        state.pending.clear();
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.state).closed
    }
}

impl<T: Clone + Send + 'static> Disposable for Signal<T> {
    fn dispose(&self) {
        Signal::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Signal::is_disposed(self)
    }
}

/// Releases the dispatch flag if an observer panics mid-dispatch
struct DispatchGuard<'a, T> {
    inner: &'a Inner<T>,
}

impl<T> Drop for DispatchGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = lock(&self.inner.state);
            state.dispatching = false;
            state.pending.clear();
        }
    }
}

/// Receiving side of a [`Signal`] subscription
#[derive(Debug)]
pub struct SignalStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> SignalStream<T> {
    /// A stream that yields `value` once and then ends
    pub(crate) fn replay_once(value: T) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(value);
        Self { rx }
    }

    /// Wait for the next value; `None` once the signal is disposed and drained
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next value if one is already queued
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drain every value that is already queued
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::new();
        while let Ok(value) = self.rx.try_recv() {
            values.push(value);
        }
        values
    }

    /// True once the signal is disposed and nothing is left to read
    pub fn is_finished(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }
}

impl<T> Stream for SignalStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
