//! Asset model and the photo storage backend interface.
//!
//! The engine never talks to a photo library directly. Everything it needs
//! (enumerating assets, reading their bytes, deleting them) goes through the
//! [`AssetBackend`] trait defined here.
//!
//! # Adapters
//!
//! * [`memory`]: In-memory backend with injectable failures, for tests and embedding.
//! * [`directory`]: Assets are files under a root directory; deletion goes to the system trash.
//!
//! # Example
//!
//! ```
//! use phototriage::backend::{AssetBackend, AssetKind, MemoryBackend};
//!
//! let backend = MemoryBackend::new();
//! backend.insert("IMG_0001", b"jpeg bytes".to_vec());
//!
//! let assets = backend.list_assets(AssetKind::Image).unwrap();
//! assert_eq!(assets.len(), 1);
//! ```

pub mod directory;
pub mod memory;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use directory::{DeleteMode, DirectoryBackend};
pub use memory::MemoryBackend;

/// Opaque, stable identifier of one asset in the backing store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Create an identifier from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AssetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for AssetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One photo (or video) as seen by the engine.
///
/// Read-only; content bytes are fetched on demand through the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Backend identifier
    pub id: AssetId,
    /// Capture or creation time, when the backend knows it
    pub creation_time: Option<DateTime<Utc>>,
}

impl Asset {
    /// Create an asset without a creation time.
    #[must_use]
    pub fn new(id: impl Into<AssetId>) -> Self {
        Self {
            id: id.into(),
            creation_time: None,
        }
    }

    /// Attach a creation time.
    #[must_use]
    pub fn with_creation_time(mut self, time: DateTime<Utc>) -> Self {
        self.creation_time = Some(time);
        self
    }
}

/// Media kind filter for [`AssetBackend::list_assets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Still images
    #[default]
    Image,
    /// Videos
    Video,
    /// Everything the backend holds
    Any,
}

/// Errors returned when listing the asset universe.
#[derive(thiserror::Error, Debug)]
pub enum ListError {
    /// The backing library could not be opened.
    #[error("Asset library unavailable: {0}")]
    Unavailable(String),

    /// An I/O error occurred while enumerating assets.
    #[error("I/O error while listing assets: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned when an asset's bytes cannot be read.
///
/// Cloneable so that scan statistics can keep a copy of every failure.
#[derive(thiserror::Error, Debug, Clone)]
pub enum FetchError {
    /// The asset no longer exists in the backend.
    #[error("Asset not found: {0}")]
    NotFound(AssetId),

    /// The backend refused access to the asset.
    #[error("Permission denied: {0}")]
    PermissionDenied(AssetId),

    /// An I/O error occurred while reading the asset.
    #[error("I/O error for {id}: {source}")]
    Io {
        /// Asset being read
        id: AssetId,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The fetch did not complete within its timeout.
    #[error("Fetch timed out after {timeout:?}: {id}")]
    TimedOut {
        /// Asset being read
        id: AssetId,
        /// Timeout that expired
        timeout: Duration,
    },

    /// The backend could not serve the asset for another reason.
    #[error("Asset unavailable: {id}: {message}")]
    Unavailable {
        /// Asset being read
        id: AssetId,
        /// Backend-provided description
        message: String,
    },
}

impl FetchError {
    /// Identifier of the asset that failed.
    #[must_use]
    pub fn id(&self) -> &AssetId {
        match self {
            Self::NotFound(id)
            | Self::PermissionDenied(id)
            | Self::Io { id, .. }
            | Self::TimedOut { id, .. }
            | Self::Unavailable { id, .. } => id,
        }
    }

    /// Whether the failure was a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Errors returned by [`AssetBackend::delete_assets`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum BackendDeleteError {
    /// The backend rejected the whole request; nothing was deleted.
    #[error("Backend rejected deletion of {} asset(s): {message}", .ids.len())]
    Rejected {
        /// Identifiers in the rejected request
        ids: BTreeSet<AssetId>,
        /// Backend-provided description
        message: String,
    },

    /// Some identifiers were deleted and some were not.
    ///
    /// Only backends that report [`AssetBackend::supports_partial_delete`]
    /// return this variant.
    #[error("Partial deletion: {} deleted, {} failed: {message}", .deleted.len(), .failed.len())]
    Partial {
        /// Identifiers the backend reports as deleted
        deleted: BTreeSet<AssetId>,
        /// Identifiers that are still present
        failed: BTreeSet<AssetId>,
        /// Backend-provided description
        message: String,
    },
}

/// Photo storage backend consumed by the engine.
///
/// Implementations must be thread-safe: the duplicate scan fetches bytes from
/// several workers at once.
pub trait AssetBackend: Send + Sync {
    /// Enumerate every asset of the given kind.
    fn list_assets(&self, kind: AssetKind) -> Result<Vec<Asset>, ListError>;

    /// Read the full encoded content of an asset, exactly as stored.
    fn fetch_bytes(&self, id: &AssetId) -> Result<Vec<u8>, FetchError>;

    /// Delete a set of assets.
    ///
    /// Unless [`supports_partial_delete`](Self::supports_partial_delete)
    /// returns `true`, any error means no asset was deleted.
    fn delete_assets(&self, ids: &BTreeSet<AssetId>) -> Result<(), BackendDeleteError>;

    /// Whether a failed [`delete_assets`](Self::delete_assets) may still have
    /// deleted some of the requested assets.
    fn supports_partial_delete(&self) -> bool {
        false
    }

    /// Whether the asset currently exists in the backend.
    fn contains(&self, id: &AssetId) -> bool;
}

impl<T: AssetBackend + ?Sized> AssetBackend for Arc<T> {
    fn list_assets(&self, kind: AssetKind) -> Result<Vec<Asset>, ListError> {
        (**self).list_assets(kind)
    }

    fn fetch_bytes(&self, id: &AssetId) -> Result<Vec<u8>, FetchError> {
        (**self).fetch_bytes(id)
    }

    fn delete_assets(&self, ids: &BTreeSet<AssetId>) -> Result<(), BackendDeleteError> {
        (**self).delete_assets(ids)
    }

    fn supports_partial_delete(&self) -> bool {
        (**self).supports_partial_delete()
    }

    fn contains(&self, id: &AssetId) -> bool {
        (**self).contains(id)
    }
}
