//! In-memory asset backend.
//!
//! Holds asset bytes in a map and lets callers inject the failure modes a
//! real photo library exhibits: unreadable assets, stalled reads, rejected
//! and partially applied deletions.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{Asset, AssetBackend, AssetId, AssetKind, BackendDeleteError, FetchError, ListError};

#[derive(Debug, Clone)]
struct StoredAsset {
    bytes: Vec<u8>,
    kind: AssetKind,
    creation_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Insertion order, which is also the listing order
    order: Vec<AssetId>,
    assets: BTreeMap<AssetId, StoredAsset>,
    failing_fetches: HashSet<AssetId>,
    stalled_fetches: HashMap<AssetId, Duration>,
    reject_deletes: Option<String>,
    /// When set, deletions of these ids fail while the rest go through
    partial_failures: Option<BTreeSet<AssetId>>,
}

/// Thread-safe in-memory [`AssetBackend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    fetch_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave Inner half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an image asset.
    pub fn insert(&self, id: impl Into<AssetId>, bytes: Vec<u8>) {
        self.insert_asset(id.into(), bytes, AssetKind::Image, None);
    }

    /// Add an asset with an explicit kind and creation time.
    pub fn insert_asset(
        &self,
        id: AssetId,
        bytes: Vec<u8>,
        kind: AssetKind,
        creation_time: Option<DateTime<Utc>>,
    ) {
        let mut inner = self.lock();
        if !inner.assets.contains_key(&id) {
            inner.order.push(id.clone());
        }
        inner.assets.insert(
            id,
            StoredAsset {
                bytes,
                kind,
                creation_time,
            },
        );
    }

    /// Make every fetch of `id` fail.
    pub fn fail_fetch(&self, id: impl Into<AssetId>) {
        self.lock().failing_fetches.insert(id.into());
    }

    /// Make every fetch of `id` block for `delay` before answering.
    pub fn stall_fetch(&self, id: impl Into<AssetId>, delay: Duration) {
        self.lock().stalled_fetches.insert(id.into(), delay);
    }

    /// Reject every deletion request with `message`.
    pub fn reject_deletes(&self, message: impl Into<String>) {
        self.lock().reject_deletes = Some(message.into());
    }

    /// Let deletions go through again.
    pub fn accept_deletes(&self) {
        let mut inner = self.lock();
        inner.reject_deletes = None;
        inner.partial_failures = None;
    }

    /// Switch to partial-success semantics: deleting any of `ids` fails,
    /// other ids in the same request are deleted.
    pub fn fail_partially(&self, ids: impl IntoIterator<Item = AssetId>) {
        self.lock().partial_failures = Some(ids.into_iter().collect());
    }

    /// Number of `fetch_bytes` calls served so far.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete_assets` calls received so far.
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Number of assets currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().assets.len()
    }

    /// Whether the backend holds no assets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().assets.is_empty()
    }
}

impl AssetBackend for MemoryBackend {
    fn list_assets(&self, kind: AssetKind) -> Result<Vec<Asset>, ListError> {
        let inner = self.lock();
        let assets = inner
            .order
            .iter()
            .filter_map(|id| inner.assets.get(id).map(|stored| (id, stored)))
            .filter(|(_, stored)| kind == AssetKind::Any || stored.kind == kind)
            .map(|(id, stored)| Asset {
                id: id.clone(),
                creation_time: stored.creation_time,
            })
            .collect();
        Ok(assets)
    }

    fn fetch_bytes(&self, id: &AssetId) -> Result<Vec<u8>, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let (stall, result) = {
            let inner = self.lock();
            let stall = inner.stalled_fetches.get(id).copied();
            let result = if inner.failing_fetches.contains(id) {
                Err(FetchError::Unavailable {
                    id: id.clone(),
                    message: "injected fetch failure".to_string(),
                })
            } else {
                inner
                    .assets
                    .get(id)
                    .map(|stored| stored.bytes.clone())
                    .ok_or_else(|| FetchError::NotFound(id.clone()))
            };
            (stall, result)
        };

        // Sleep outside the lock so other workers keep going.
        if let Some(delay) = stall {
            std::thread::sleep(delay);
        }
        result
    }

    fn delete_assets(&self, ids: &BTreeSet<AssetId>) -> Result<(), BackendDeleteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();

        if let Some(message) = inner.reject_deletes.clone() {
            return Err(BackendDeleteError::Rejected {
                ids: ids.clone(),
                message,
            });
        }

        let missing: BTreeSet<AssetId> = ids
            .iter()
            .filter(|id| !inner.assets.contains_key(*id))
            .cloned()
            .collect();

        if let Some(failing) = inner.partial_failures.clone() {
            let (failed, deletable): (BTreeSet<AssetId>, BTreeSet<AssetId>) = ids
                .iter()
                .cloned()
                .partition(|id| failing.contains(id) || missing.contains(id));
            for id in &deletable {
                inner.assets.remove(id);
            }
            inner.order.retain(|id| !deletable.contains(id));
            if failed.is_empty() {
                return Ok(());
            }
            return Err(BackendDeleteError::Partial {
                deleted: deletable,
                failed,
                message: "injected partial failure".to_string(),
            });
        }

        if !missing.is_empty() {
            return Err(BackendDeleteError::Rejected {
                ids: ids.clone(),
                message: format!("{} asset(s) not found", missing.len()),
            });
        }

        for id in ids {
            inner.assets.remove(id);
        }
        inner.order.retain(|id| !ids.contains(id));
        Ok(())
    }

    fn supports_partial_delete(&self) -> bool {
        self.lock().partial_failures.is_some()
    }

    fn contains(&self, id: &AssetId) -> bool {
        self.lock().assets.contains_key(id)
    }
}
