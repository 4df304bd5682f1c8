//! Per-app registry of product instances.
//!
//! Every [`FirebaseApp`](crate::app::FirebaseApp) owns one [`ServiceRegistry`]. Products store
//! their instance under a `(service name, identifier)` key, so a second lookup with the same key
//! returns the instance created by the first.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::app::constants::DEFAULT_ENTRY_NAME;

/// A product instance that can live inside a [`ServiceRegistry`].
pub trait AppService: Any + Send + Sync {
    /// Invoked once when the owning app is deleted.
    fn on_app_deleted(&self) {}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ServiceKey {
    name: Arc<str>,
    identifier: Arc<str>,
}

impl ServiceKey {
    fn new(name: &str, identifier: Option<&str>) -> Self {
        Self {
            name: Arc::from(name),
            identifier: Arc::from(identifier.unwrap_or(DEFAULT_ENTRY_NAME)),
        }
    }
}

#[derive(Clone)]
struct ServiceEntry {
    instance: Arc<dyn Any + Send + Sync>,
    service: Arc<dyn AppService>,
}

#[derive(Default)]
pub struct ServiceRegistry {
    entries: Mutex<HashMap<ServiceKey, ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ServiceKey, ServiceEntry>> {
        self.entries.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Returns the instance registered under `(name, identifier)`, constructing it with `init`
    /// when absent. `init` runs while the registry is locked, so it must not touch the same
    /// registry.
    pub fn get_or_try_init<T, E, F>(&self, name: &str, identifier: Option<&str>, init: F) -> Result<Arc<T>, E>
    where
        T: AppService,
        F: FnOnce() -> Result<T, E>,
    {
        let key = ServiceKey::new(name, identifier);
        let mut entries = self.entries();
        if let Some(existing) = entries
            .get(&key)
            .and_then(|entry| Arc::clone(&entry.instance).downcast::<T>().ok())
        {
            return Ok(existing);
        }

        let instance = Arc::new(init()?);
        entries.insert(
            key,
            ServiceEntry {
                instance: instance.clone() as Arc<dyn Any + Send + Sync>,
                service: instance.clone() as Arc<dyn AppService>,
            },
        );
        Ok(instance)
    }

    pub fn get<T>(&self, name: &str, identifier: Option<&str>) -> Option<Arc<T>>
    where
        T: AppService,
    {
        let key = ServiceKey::new(name, identifier);
        self.entries()
            .get(&key)
            .and_then(|entry| Arc::clone(&entry.instance).downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str, identifier: Option<&str>) -> bool {
        self.entries().contains_key(&ServiceKey::new(name, identifier))
    }

    /// Drops the cached instance; the next lookup constructs a fresh one.
    pub fn remove(&self, name: &str, identifier: Option<&str>) -> bool {
        self.entries().remove(&ServiceKey::new(name, identifier)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every instance and notifies each one that its app is gone.
    pub(crate) fn shutdown(&self) {
        let drained: Vec<ServiceEntry> = self.entries().drain().map(|(_, entry)| entry).collect();
        for entry in drained {
            entry.service.on_app_deleted();
        }
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .entries()
            .keys()
            .map(|key| format!("{}/{}", key.name, key.identifier))
            .collect();
        f.debug_struct("ServiceRegistry").field("instances", &keys).finish()
    }
}
