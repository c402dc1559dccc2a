//! Staging store for in-flight dial outcomes.
//!
//! Dial events carry their final status before the caller's hangup is
//! observed. The status is staged here keyed by the caller's unique id and
//! drained when the matching HANGUP record is built.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Keyed staging of the most recent dial outcome per caller.
#[derive(Debug, Default)]
pub struct DialStatusStore {
    statuses: Mutex<HashMap<String, String>>,
}

impl DialStatusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a dial status for a caller, replacing any earlier one.
    pub fn store(&self, unique_id: &str, dial_status: &str) {
        let mut statuses = self
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        statuses.insert(unique_id.to_string(), dial_status.to_string());
    }

    /// Unlink and return the staged status for a caller.
    pub fn drain(&self, unique_id: &str) -> Option<String> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(unique_id)
    }

    /// Discard every staged status.
    pub fn clear(&self) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of staged statuses.
    pub fn len(&self) -> usize {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
