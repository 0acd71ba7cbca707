//! Persistence layer for decided-identifier sets.
//!
//! The [`DecisionStore`](crate::decisions::DecisionStore) keeps its Kept and
//! Deleted sets durable through the [`PersistenceStore`] trait. Sets are
//! plain string sets stored under fixed keys.
//!
//! # Atomicity
//!
//! [`PersistenceStore::save_sets`] writes several keys as one unit. The
//! decision store always persists both sets together through it, so a
//! crash can never expose an identifier that was added to one set without
//! the paired removal from the other.
//!
//! # Architecture
//!
//! * [`memory`]: Mutex-guarded in-memory sets with injectable write failures.
//! * [`json`]: Single JSON file with a SHA256 integrity checksum, replaced atomically.

pub mod json;
pub mod memory;

use std::collections::BTreeSet;
use std::path::PathBuf;

pub use json::{JsonFileStore, STORE_VERSION};
pub use memory::MemoryStore;

/// Key of the persisted Kept set.
pub const KEPT_KEY: &str = "keptPhotos";

/// Key of the persisted Deleted set.
pub const DELETED_KEY: &str = "deletedPhotos";

/// Errors raised by persistence backends.
///
/// These are never swallowed: losing a write risks re-showing or
/// re-deleting assets.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    /// An I/O error occurred while reading or writing the store.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Store location
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored data failed its integrity check.
    #[error("Store integrity check failed for {path}: {reason}")]
    Corrupted {
        /// Store location
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// The store was written by an incompatible version.
    #[error("Unsupported store version: {found}. Current version is {expected}.")]
    UnsupportedVersion {
        /// Version found on disk
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    /// The store refused the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value store for identifier sets.
pub trait PersistenceStore: Send + Sync {
    /// Load the set stored under `key`. A missing key yields an empty set.
    fn load_set(&self, key: &str) -> Result<BTreeSet<String>, PersistenceError>;

    /// Durably write several sets as one atomic unit.
    ///
    /// Either every entry is visible after the call returns `Ok`, or none is.
    fn save_sets(&self, entries: &[(&str, &BTreeSet<String>)]) -> Result<(), PersistenceError>;

    /// Durably write a single set.
    fn save_set(&self, key: &str, set: &BTreeSet<String>) -> Result<(), PersistenceError> {
        self.save_sets(&[(key, set)])
    }
}

impl<T: PersistenceStore + ?Sized> PersistenceStore for std::sync::Arc<T> {
    fn load_set(&self, key: &str) -> Result<BTreeSet<String>, PersistenceError> {
        (**self).load_set(key)
    }

    fn save_sets(&self, entries: &[(&str, &BTreeSet<String>)]) -> Result<(), PersistenceError> {
        (**self).save_sets(entries)
    }
}
