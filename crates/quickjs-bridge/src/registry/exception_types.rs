//! Registry of host exception types that script errors can be mapped back to.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::value::HostThrowable;

/// Builds a host throwable from the joined `message\nstack` text of a script error.
pub type ExceptionFactory = Arc<dyn Fn(String) -> HostThrowable + Send + Sync>;

/// Host exception types known to a bridge, keyed by `::`-separated type name.
///
/// Lookups are resolved once and cached, misses included, until `invalidate_all`.
#[derive(Default)]
pub struct ExceptionTypes {
    /// Registered factories
    factories: RwLock<HashMap<String, ExceptionFactory>>,
    /// Resolved lookups, `None` for names with no registered type
    resolved: Mutex<HashMap<String, Option<ExceptionFactory>>>,
}

impl ExceptionTypes {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a host type.
    pub fn register(&self, type_name: impl Into<String>, factory: ExceptionFactory) {
        let type_name = type_name.into();
        tracing::debug!("Registered exception type {type_name}");
        self.resolved.lock().remove(&type_name);
        self.factories.write().insert(type_name, factory);
    }

    /// Register a host type whose throwables carry the joined text as their message.
    pub fn register_type(&self, type_name: impl Into<String>) {
        let type_name = type_name.into();
        let factory_name = type_name.clone();
        self.register(
            type_name,
            Arc::new(move |message| HostThrowable::new(factory_name.clone(), message)),
        );
    }

    /// Find the factory for the host type a script error name maps to.
    pub fn resolve(&self, script_name: &str) -> Option<ExceptionFactory> {
        let host_name = HostThrowable::host_name(script_name);
        let mut resolved = self.resolved.lock();
        if let Some(cached) = resolved.get(&host_name) {
            return cached.clone();
        }
        let factory = self.factories.read().get(&host_name).map(Arc::clone);
        resolved.insert(host_name, factory.clone());
        factory
    }

    /// Whether a host type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.read().contains_key(type_name)
    }

    /// Drop every cached resolution. The next `resolve` looks the name up again.
    pub fn invalidate_all(&self) {
        let mut resolved = self.resolved.lock();
        if !resolved.is_empty() {
            tracing::debug!("Invalidating {} cached exception types", resolved.len());
        }
        resolved.clear();
    }

    /// Number of cached resolutions.
    pub fn cached_len(&self) -> usize {
        self.resolved.lock().len()
    }
}
