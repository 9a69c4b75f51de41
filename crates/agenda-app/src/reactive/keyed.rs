//! Signal with named side-effect listeners

use std::sync::{Arc, Mutex};

use tracing::trace;

use super::signal::{Signal, SignalStream};
use super::{lock, Disposable};

/// Callback invoked with each published value
pub type ListenerCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Wraps a [`Signal`] and fans out every published value to a set of
/// callbacks registered under case-insensitive keys.
///
/// Callbacks run synchronously on the writer's task, in registration order.
/// Replacing the callback at an existing key keeps its position. A callback
/// may write to the signal; that value reaches the callbacks after the
/// current one has reached all of them.
pub struct KeyedListenerSignal<T> {
    signal: Signal<T>,
    listeners: Arc<Mutex<Vec<(String, ListenerCallback<T>)>>>,
}

impl<T: Clone + Send + 'static> KeyedListenerSignal<T> {
    pub fn new(initial: T) -> Self {
        Self::from_signal(Signal::new(initial))
    }

    /// Take over an existing signal; writes through any handle of it reach
    /// the registered callbacks.
    pub fn from_signal(signal: Signal<T>) -> Self {
        let listeners: Arc<Mutex<Vec<(String, ListenerCallback<T>)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let table = Arc::clone(&listeners);
        signal.observe(Arc::new(move |value: &T| {
            // Snapshot so callbacks may (un)register listeners themselves
            let callbacks: Vec<ListenerCallback<T>> =
                lock(&table).iter().map(|(_, cb)| Arc::clone(cb)).collect();
            for callback in callbacks {
                callback(value);
            }
        }));

        Self { signal, listeners }
    }

    /// Register `callback` under `key`, replacing any callback already there.
    ///
    /// With `invoke_immediately`, the callback is also called with the
    /// current value before this returns. Ignored once disposed.
    pub fn register_listener<F>(&self, key: &str, callback: F, invoke_immediately: bool)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        if self.signal.is_disposed() {
            trace!("Ignoring listener '{}' on disposed signal", key);
            return;
        }
        let key = normalize(key);
        let callback: ListenerCallback<T> = Arc::new(callback);
        {
            let mut listeners = lock(&self.listeners);
            match listeners.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = Arc::clone(&callback),
                None => listeners.push((key, Arc::clone(&callback))),
            }
        }

        if invoke_immediately {
            callback(&self.signal.read());
        }
    }

    /// Remove the callback under `key`. Unknown keys are ignored.
    pub fn unregister_listener(&self, key: &str) {
        let key = normalize(key);
        lock(&self.listeners).retain(|(k, _)| *k != key);
    }

    pub fn has_listener(&self, key: &str) -> bool {
        let key = normalize(key);
        lock(&self.listeners).iter().any(|(k, _)| *k == key)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn read(&self) -> T {
        self.signal.read()
    }

    pub fn write(&self, value: T) {
        self.signal.write(value);
    }

    pub fn subscribe(&self) -> SignalStream<T> {
        self.signal.subscribe()
    }

    /// Handle to the underlying signal
    pub fn signal(&self) -> &Signal<T> {
        &self.signal
    }

    /// Drop all listeners and dispose the underlying signal
    pub fn dispose(&self) {
        lock(&self.listeners).clear();
        self.signal.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.signal.is_disposed()
    }
}

impl<T: Clone + Send + 'static> Disposable for KeyedListenerSignal<T> {
    fn dispose(&self) {
        KeyedListenerSignal::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        KeyedListenerSignal::is_disposed(self)
    }
}

fn normalize(key: &str) -> String {
    key.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push_to(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl Fn(&i32) + Send + Sync {
        let log = Arc::clone(log);
        move |v: &i32| lock(&log).push(format!("{}:{}", tag, v))
    }

    #[test]
    fn test_listener_receives_values_written_after_registration() {
        let keyed = KeyedListenerSignal::new(0);
        let seen = log();
        keyed.write(1);
        keyed.register_listener("audit", push_to(&seen, "a"), false);
        keyed.write(2);
        keyed.write(3);

        assert_eq!(*lock(&seen), vec!["a:2", "a:3"]);
    }

    #[test]
    fn test_invoke_immediately_delivers_current_value() {
        let keyed = KeyedListenerSignal::new(5);
        let seen = log();
        keyed.register_listener("audit", push_to(&seen, "a"), true);

        assert_eq!(*lock(&seen), vec!["a:5"]);
    }

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let keyed = KeyedListenerSignal::new(0);
        let seen = log();
        keyed.register_listener("first", push_to(&seen, "1"), false);
        keyed.register_listener("second", push_to(&seen, "2"), false);
        keyed.register_listener("third", push_to(&seen, "3"), false);
        keyed.write(9);

        assert_eq!(*lock(&seen), vec!["1:9", "2:9", "3:9"]);
    }

    #[test]
    fn test_replacing_key_supersedes_old_callback() {
        let keyed = KeyedListenerSignal::new(0);
        let seen = log();
        keyed.register_listener("first", push_to(&seen, "old"), false);
        keyed.register_listener("second", push_to(&seen, "2"), false);
        keyed.register_listener("FIRST", push_to(&seen, "new"), false);
        keyed.write(1);

        assert_eq!(keyed.listener_count(), 2);
        assert_eq!(*lock(&seen), vec!["new:1", "2:1"]);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let keyed = KeyedListenerSignal::new(0);
        keyed.register_listener("Analytics", |_: &i32| {}, false);

        assert!(keyed.has_listener("analytics"));
        assert!(keyed.has_listener("ANALYTICS"));
        keyed.unregister_listener("aNaLyTiCs");
        assert!(!keyed.has_listener("Analytics"));
    }

    #[test]
    fn test_unregister_is_immediate_and_not_retroactive() {
        let keyed = KeyedListenerSignal::new(0);
        let seen = log();
        keyed.register_listener("audit", push_to(&seen, "a"), false);
        keyed.write(1);
        keyed.unregister_listener("audit");
        keyed.write(2);

        assert_eq!(*lock(&seen), vec!["a:1"]);
    }

    #[test]
    fn test_unregister_unknown_key_is_safe() {
        let keyed = KeyedListenerSignal::new(0);
        keyed.unregister_listener("never-registered");
        assert_eq!(keyed.listener_count(), 0);
    }

    #[test]
    fn test_writes_through_underlying_signal_reach_listeners() {
        let signal = Signal::new(0);
        let keyed = KeyedListenerSignal::from_signal(signal.clone());
        let seen = log();
        keyed.register_listener("audit", push_to(&seen, "a"), false);
        signal.write(4);

        assert_eq!(*lock(&seen), vec!["a:4"]);
    }

    #[test]
    fn test_callback_may_unregister_itself() {
        let keyed = Arc::new(KeyedListenerSignal::new(0));
        let handle = Arc::clone(&keyed);
        keyed.register_listener(
            "once",
            move |_: &i32| handle.unregister_listener("once"),
            false,
        );
        keyed.write(1);

        assert!(!keyed.has_listener("once"));
    }

    #[tokio::test]
    async fn test_subscribers_and_listeners_observe_same_order() {
        let keyed = KeyedListenerSignal::new(0);
        let seen = log();
        let mut stream = keyed.subscribe();
        keyed.register_listener("audit", push_to(&seen, "a"), false);
        keyed.write(1);
        keyed.write(2);

        assert_eq!(stream.drain(), vec![0, 1, 2]);
        assert_eq!(*lock(&seen), vec!["a:1", "a:2"]);
    }

    #[test]
    fn test_dispose_clears_listeners() {
        let keyed = KeyedListenerSignal::new(0);
        let seen = log();
        keyed.register_listener("audit", push_to(&seen, "a"), false);
        keyed.dispose();
        keyed.write(1);

        assert!(keyed.is_disposed());
        assert_eq!(keyed.listener_count(), 0);
        assert!(lock(&seen).is_empty());
    }

    #[test]
    fn test_listener_may_write_back_to_its_signal() {
        let keyed = Arc::new(KeyedListenerSignal::new(0));
        let seen = log();
        let handle = Arc::clone(&keyed);
        keyed.register_listener(
            "clamp",
            move |v: &i32| {
                if *v > 10 {
                    handle.write(10);
                }
            },
            false,
        );
        keyed.register_listener("audit", push_to(&seen, "a"), false);
        let mut stream = keyed.subscribe();

        keyed.write(42);

        assert_eq!(keyed.read(), 10);
        assert_eq!(*lock(&seen), vec!["a:42", "a:10"]);
        assert_eq!(stream.drain(), vec![0, 42, 10]);
    }

    #[test]
    fn test_register_after_dispose_is_ignored() {
        let keyed = KeyedListenerSignal::new(0);
        let seen = log();
        keyed.dispose();
        keyed.register_listener("audit", push_to(&seen, "a"), true);

        assert!(!keyed.has_listener("audit"));
        assert_eq!(keyed.listener_count(), 0);
        assert!(lock(&seen).is_empty());
    }
}
