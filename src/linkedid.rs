//! Reference-counted tracking of active linked-call identifiers.
//!
//! Every live channel holds one reference on its linked id. When the last
//! reference is dropped the id is retired and the engine emits
//! LINKEDID_END for the channel whose end caused the drop. The tracker
//! owns its id strings; channels never point back into it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::error;

/// Result of dropping one reference on a linked id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnrefOutcome {
    /// Other channels still reference the id
    Alive,
    /// The last reference was dropped and the id was removed
    Retired,
    /// The id was never referenced; the caller should log this
    Missing,
}

/// Refcounted set of in-flight linked ids.
#[derive(Debug, Default)]
pub struct LinkedIdTracker {
    ids: Mutex<HashMap<String, usize>>,
}

impl LinkedIdTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference on `linked_id`, creating the entry at count one.
    ///
    /// An empty id is a producer bug; it is logged and ignored.
    pub fn ref_id(&self, linked_id: &str) {
        if linked_id.is_empty() {
            error!("Refusing to track an empty linked id");
            return;
        }
        let mut ids = self
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *ids.entry(linked_id.to_string())
            .or_insert(0) += 1;
    }

    /// Drop one reference on `linked_id`, removing the entry when the
    /// count reaches zero.
    pub fn unref(&self, linked_id: &str) -> UnrefOutcome {
        let mut ids = self
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match ids.get_mut(linked_id) {
            None => UnrefOutcome::Missing,
            Some(count) if *count <= 1 => {
                ids.remove(linked_id);
                UnrefOutcome::Retired
            }
            Some(count) => {
                *count -= 1;
                UnrefOutcome::Alive
            }
        }
    }

    /// Current reference count for an id, `None` when untracked.
    pub fn count(&self, linked_id: &str) -> Option<usize> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(linked_id)
            .copied()
    }

    /// Number of distinct tracked ids.
    pub fn len(&self) -> usize {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check whether no id is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
