//! Backend registry and event fan-out.
//!
//! Backends are opaque callbacks registered by name. The registry never
//! holds its lock across a callback, and one misbehaving backend cannot
//! starve its siblings of records.

use crate::error::{CelError, CelResult};
use crate::record::CelRecord;
use indexmap::IndexMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// Callback invoked once per emitted record.
pub type BackendCallback = Arc<dyn Fn(&CelRecord) + Send + Sync>;

/// Name-keyed registry of event sinks.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<IndexMap<String, BackendCallback>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. An empty name is rejected; a duplicate name
    /// replaces the prior entry.
    pub fn register(&self, name: &str, callback: BackendCallback) -> CelResult<()> {
        if name.is_empty() {
            return Err(CelError::EmptyBackendName);
        }
        let mut backends = self
            .backends
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if backends
            .insert(name.to_string(), callback)
            .is_some()
        {
            debug!("CEL backend '{}' replaced", name);
        } else {
            debug!("CEL backend '{}' registered", name);
        }
        Ok(())
    }

    /// Remove a backend by name.
    pub fn unregister(&self, name: &str) -> CelResult<()> {
        let mut backends = self
            .backends
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match backends.shift_remove(name) {
            Some(_) => {
                debug!("CEL backend '{}' unregistered", name);
                Ok(())
            }
            None => Err(CelError::BackendNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Deliver a record to every registered backend.
    ///
    /// Iterates a snapshot taken under the lock, then invokes each callback
    /// with no lock held. A panicking callback is caught and logged; the
    /// remaining callbacks still run. Iteration order is unspecified.
    pub fn for_each(&self, record: &CelRecord) {
        let snapshot: Vec<(String, BackendCallback)> = {
            let backends = self
                .backends
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            backends
                .iter()
                .map(|(name, callback)| (name.clone(), callback.clone()))
                .collect()
        };

        for (name, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(record))).is_err() {
                error!(
                    "CEL backend '{}' panicked on {} record, continuing with remaining backends",
                    name, record.event_type
                );
            }
        }
    }

    /// Names of all registered backends.
    pub fn names(&self) -> Vec<String> {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check whether no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
