//! Keyed ownership of signals and disposable modules
//!
//! The registry is an explicit value owned by the composition root. It owns
//! every resource registered with it until the entry is removed or
//! [`ContainerRegistry::dispose_all`] runs; callers only receive handles.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use agenda_core::prelude::*;

use super::{Disposable, Signal};

const SIGNAL_KIND: &str = "Signal";
const MODULE_KIND: &str = "Module";

struct Entry {
    handle: Arc<dyn Any + Send + Sync>,
    resource: Arc<dyn Disposable>,
    type_name: &'static str,
}

impl Entry {
    fn dispose(&self) {
        self.resource.dispose();
    }
}

/// Two independent keyed collections: signals and opaque modules
#[derive(Default)]
pub struct ContainerRegistry {
    signals: HashMap<String, Entry>,
    modules: HashMap<String, Entry>,
}

impl std::fmt::Debug for ContainerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let describe = |map: &HashMap<String, Entry>| {
            let mut entries: Vec<String> = map
                .iter()
                .map(|(key, entry)| format!("{}: {}", key, entry.type_name))
                .collect();
            entries.sort();
            entries
        };
        f.debug_struct("ContainerRegistry")
            .field("signals", &describe(&self.signals))
            .field("modules", &describe(&self.modules))
            .finish()
    }
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────
    // Signals
    // ─────────────────────────────────────────────────────────────

    /// Register `signal` under `key`, disposing any signal it replaces
    pub fn register_signal<T>(&mut self, key: &str, signal: Signal<T>)
    where
        T: Clone + Send + 'static,
    {
        let entry = Entry {
            handle: Arc::new(signal.clone()),
            resource: Arc::new(signal),
            type_name: std::any::type_name::<T>(),
        };
        insert(&mut self.signals, SIGNAL_KIND, key, entry);
    }

    /// Look up the signal under `key`
    ///
    /// Fails with [`Error::NotInitialized`] if nothing is registered and
    /// with [`Error::TypeMismatch`] if it holds a different value type.
    pub fn get_signal<T>(&self, key: &str) -> Result<Signal<T>>
    where
        T: Clone + Send + 'static,
    {
        let entry = self
            .signals
            .get(&normalize(key))
            .ok_or_else(|| Error::not_initialized(SIGNAL_KIND, key))?;
        entry
            .handle
            .downcast_ref::<Signal<T>>()
            .cloned()
            .ok_or_else(|| Error::type_mismatch(SIGNAL_KIND, key, std::any::type_name::<T>()))
    }

    pub fn contains_signal(&self, key: &str) -> bool {
        self.signals.contains_key(&normalize(key))
    }

    /// Dispose and remove the signal under `key`. Returns whether it existed.
    pub fn remove_signal(&mut self, key: &str) -> bool {
        remove(&mut self.signals, SIGNAL_KIND, key)
    }

    // ─────────────────────────────────────────────────────────────
    // Modules
    // ─────────────────────────────────────────────────────────────

    /// Register `module` under `key`, disposing any module it replaces
    pub fn register_module<M>(&mut self, key: &str, module: Arc<M>)
    where
        M: Disposable + 'static,
    {
        let entry = Entry {
            handle: Arc::clone(&module) as Arc<dyn Any + Send + Sync>,
            resource: module,
            type_name: std::any::type_name::<M>(),
        };
        insert(&mut self.modules, MODULE_KIND, key, entry);
    }

    /// Look up the module under `key`
    pub fn get_module<M>(&self, key: &str) -> Result<Arc<M>>
    where
        M: Disposable + 'static,
    {
        let entry = self
            .modules
            .get(&normalize(key))
            .ok_or_else(|| Error::not_initialized(MODULE_KIND, key))?;
        Arc::clone(&entry.handle)
            .downcast::<M>()
            .map_err(|_| Error::type_mismatch(MODULE_KIND, key, std::any::type_name::<M>()))
    }

    pub fn contains_module(&self, key: &str) -> bool {
        self.modules.contains_key(&normalize(key))
    }

    /// Dispose and remove the module under `key`. Returns whether it existed.
    pub fn remove_module(&mut self, key: &str) -> bool {
        remove(&mut self.modules, MODULE_KIND, key)
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Total number of registered signals and modules
    pub fn len(&self) -> usize {
        self.signals.len() + self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty() && self.modules.is_empty()
    }

    /// Dispose every owned resource and empty both collections
    pub fn dispose_all(&mut self) {
        let count = self.len();
        for entry in self.signals.values().chain(self.modules.values()) {
            entry.dispose();
        }
        self.signals.clear();
        self.modules.clear();
        debug!("Registry disposed {} resource(s)", count);
    }
}

fn normalize(key: &str) -> String {
    key.to_lowercase()
}

fn insert(map: &mut HashMap<String, Entry>, kind: &str, key: &str, entry: Entry) {
    debug!("Registering {} '{}' ({})", kind, key, entry.type_name);
    if let Some(previous) = map.insert(normalize(key), entry) {
        debug!("{} '{}' replaced, disposing previous instance", kind, key);
        previous.dispose();
    }
}

fn remove(map: &mut HashMap<String, Entry>, kind: &str, key: &str) -> bool {
    match map.remove(&normalize(key)) {
        Some(entry) => {
            entry.dispose();
            debug!("Removed {} '{}'", kind, key);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeModule {
        disposed: AtomicBool,
        dispose_calls: AtomicUsize,
    }

    impl Disposable for FakeModule {
        fn dispose(&self) {
            self.dispose_calls.fetch_add(1, Ordering::SeqCst);
            self.disposed.store(true, Ordering::SeqCst);
        }

        fn is_disposed(&self) -> bool {
            self.disposed.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug, Default)]
    struct OtherModule;

    impl Disposable for OtherModule {
        fn dispose(&self) {}

        fn is_disposed(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_get_signal_returns_shared_handle() {
        let mut registry = ContainerRegistry::new();
        let signal = Signal::new(1);
        registry.register_signal("counter", signal.clone());

        let found: Signal<i32> = registry.get_signal("counter").unwrap();
        found.write(2);
        assert_eq!(signal.read(), 2);
    }

    #[test]
    fn test_missing_signal_is_not_initialized() {
        let registry = ContainerRegistry::new();
        let err = registry.get_signal::<i32>("missing").unwrap_err();

        assert!(matches!(err, Error::NotInitialized { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_signal_type_mismatch() {
        let mut registry = ContainerRegistry::new();
        registry.register_signal("counter", Signal::new(1_i32));

        let err = registry.get_signal::<String>("counter").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut registry = ContainerRegistry::new();
        registry.register_signal("Session", Signal::new(()));
        registry.register_module("Auth", Arc::new(FakeModule::default()));

        assert!(registry.contains_signal("SESSION"));
        assert!(registry.get_signal::<()>("session").is_ok());
        assert!(registry.get_module::<FakeModule>("auth").is_ok());
    }

    #[test]
    fn test_signals_and_modules_are_independent() {
        let mut registry = ContainerRegistry::new();
        registry.register_signal("shared", Signal::new(0));

        assert!(!registry.contains_module("shared"));
        assert!(registry.get_module::<FakeModule>("shared").is_err());
    }

    #[test]
    fn test_remove_signal_disposes_first() {
        let mut registry = ContainerRegistry::new();
        let signal = Signal::new(0);
        registry.register_signal("counter", signal.clone());

        assert!(registry.remove_signal("counter"));
        assert!(signal.is_disposed());
        assert!(!registry.contains_signal("counter"));
        assert!(!registry.remove_signal("counter"));
    }

    #[test]
    fn test_remove_module_disposes_first() {
        let mut registry = ContainerRegistry::new();
        let module = Arc::new(FakeModule::default());
        registry.register_module("auth", Arc::clone(&module));

        assert!(registry.remove_module("AUTH"));
        assert!(module.is_disposed());
        assert!(registry.get_module::<FakeModule>("auth").is_err());
    }

    #[test]
    fn test_get_module_type_mismatch() {
        let mut registry = ContainerRegistry::new();
        registry.register_module("auth", Arc::new(FakeModule::default()));

        let err = registry.get_module::<OtherModule>("auth").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_replacing_registration_disposes_previous() {
        let mut registry = ContainerRegistry::new();
        let first = Arc::new(FakeModule::default());
        let second = Arc::new(FakeModule::default());
        registry.register_module("auth", Arc::clone(&first));
        registry.register_module("auth", Arc::clone(&second));

        assert!(first.is_disposed());
        assert!(!second.is_disposed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dispose_all_disposes_everything_once() {
        let mut registry = ContainerRegistry::new();
        let signal = Signal::new(String::new());
        let module = Arc::new(FakeModule::default());
        registry.register_signal("name", signal.clone());
        registry.register_module("auth", Arc::clone(&module));

        registry.dispose_all();

        assert!(signal.is_disposed());
        assert!(module.is_disposed());
        assert_eq!(module.dispose_calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get_signal::<String>("name"),
            Err(Error::NotInitialized { .. })
        ));
    }
}
