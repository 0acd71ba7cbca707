//! In-memory persistence store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{PersistenceError, PersistenceStore};

/// [`PersistenceStore`] that keeps sets in memory.
///
/// Writes can be made to fail on demand to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: Mutex<BTreeMap<String, BTreeSet<String>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `key -> ids`.
    #[must_use]
    pub fn with_set<I, S>(self, key: &str, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .insert(key.to_string(), ids.into_iter().map(Into::into).collect());
        self
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BTreeSet<String>>> {
        self.sets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save_sets` calls.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl PersistenceStore for MemoryStore {
    fn load_set(&self, key: &str) -> Result<BTreeSet<String>, PersistenceError> {
        Ok(self.lock().get(key).cloned().unwrap_or_default())
    }

    fn save_sets(&self, entries: &[(&str, &BTreeSet<String>)]) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "injected write failure".to_string(),
            ));
        }
        // Single lock scope: readers see all entries or none.
        let mut sets = self.lock();
        for (key, set) in entries {
            sets.insert((*key).to_string(), (*set).clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
