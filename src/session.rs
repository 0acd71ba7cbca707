//! Review session state machine.
//!
//! # Overview
//!
//! A [`ReviewSession`] walks the user through the library in random batches:
//!
//! ```text
//! Idle --start_batch--> BatchActive --complete_batch--> Idle
//! ```
//!
//! While a batch is active each of its assets can be kept or deleted.
//! Deleting calls the backend first and records the decision only after the
//! backend succeeded, so a failed delete leaves the asset undecided.
//!
//! Completing a batch removes its assets from the session's working universe
//! whether or not they were decided; they come back after
//! [`ReviewSession::reset_universe`] or in a new session.
//!
//! # Asynchronous deletes
//!
//! Presentation layers that await the backend use the two-phase API:
//! [`ReviewSession::begin_delete`] hands out a [`DeleteTicket`] and marks the
//! asset in flight, [`ReviewSession::finish_delete`] takes the backend's
//! outcome. A second delete for the same asset is refused while the first
//! is in flight, and a batch cannot be completed until all are finished.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use phototriage::backend::MemoryBackend;
//! use phototriage::config::TriageConfig;
//! use phototriage::decisions::DecisionStore;
//! use phototriage::session::ReviewSession;
//! use phototriage::store::MemoryStore;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! backend.insert("IMG_0001", b"pixels".to_vec());
//!
//! let store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
//! let mut session =
//!     ReviewSession::open(backend, store, &TriageConfig::default()).unwrap();
//!
//! let batch = session.start_batch().unwrap().clone();
//! for id in &batch {
//!     session.record_keep(id).unwrap();
//! }
//! session.complete_batch().unwrap();
//! assert_eq!(session.stats().kept, 1);
//! ```

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use rand::Rng;

use crate::backend::{AssetBackend, AssetId, AssetKind, BackendDeleteError, ListError};
use crate::batch::{Batch, BatchSelector};
use crate::config::TriageConfig;
use crate::decisions::{Decision, DecisionError, DecisionStats, DecisionStore};
use crate::duplicates::{
    merge_duplicates, DuplicateGroup, DuplicateGrouper, GroupError, GrouperConfig,
    GroupingReport, MergeError, MergeReport,
};

/// Errors returned by [`ReviewSession`].
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// Every asset in the working universe has been presented or decided.
    #[error("No photos remaining to review")]
    NoPhotosRemaining,

    /// The operation needs an active batch.
    #[error("No batch is active")]
    NoActiveBatch,

    /// A batch is already active.
    #[error("A batch is already active")]
    BatchAlreadyActive,

    /// The asset is not part of the current batch.
    #[error("Asset {0} is not in the current batch")]
    NotInBatch(AssetId),

    /// A deletion of this asset has not finished yet.
    #[error("Deletion of {0} is still in flight")]
    DeleteInFlight(AssetId),

    /// The backend refused the deletion; nothing was recorded.
    #[error(transparent)]
    BackendDelete(#[from] BackendDeleteError),

    /// The decision could not be recorded.
    #[error(transparent)]
    Decision(#[from] DecisionError),

    /// The asset universe could not be listed.
    #[error(transparent)]
    List(#[from] ListError),
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next batch
    Idle,
    /// A batch is being reviewed
    BatchActive,
}

/// Proof that a deletion was started; redeem it with
/// [`ReviewSession::finish_delete`].
#[derive(Debug)]
#[must_use = "an unfinished delete blocks completing the batch"]
pub struct DeleteTicket {
    id: AssetId,
}

impl DeleteTicket {
    /// Asset being deleted.
    #[must_use]
    pub fn id(&self) -> &AssetId {
        &self.id
    }
}

/// Batch-by-batch review over one asset library.
pub struct ReviewSession {
    backend: Arc<dyn AssetBackend>,
    store: DecisionStore,
    selector: BatchSelector,
    kind: AssetKind,
    batch_size: usize,
    universe: Vec<AssetId>,
    remaining: Vec<AssetId>,
    batch: Option<Batch>,
    in_flight: HashSet<AssetId>,
}

impl std::fmt::Debug for ReviewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewSession")
            .field("backend", &"<backend>")
            .field("store", &self.store)
            .field("kind", &self.kind)
            .field("batch_size", &self.batch_size)
            .field("universe", &self.universe.len())
            .field("remaining", &self.remaining.len())
            .field("batch", &self.batch)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl ReviewSession {
    /// Open a session over every asset of `config.asset_kind` in `backend`.
    ///
    /// The store's reassignment policy is also taken from `config`.
    ///
    /// # Errors
    ///
    /// Returns `List` if the backend cannot enumerate its assets.
    pub fn open(
        backend: Arc<dyn AssetBackend>,
        store: DecisionStore,
        config: &TriageConfig,
    ) -> Result<Self, SessionError> {
        let kind = config.asset_kind;
        let universe = list_universe(backend.as_ref(), kind)?;
        let store = store.with_policy(config.reassign_policy);
        let stats = store.stats(&universe);
        log::info!(
            "Review session opened: {} asset(s), {} kept, {} deleted, {} undecided",
            universe.len(),
            stats.kept,
            stats.deleted,
            stats.undecided
        );

        Ok(Self {
            backend,
            store,
            selector: BatchSelector::new(),
            kind,
            batch_size: config.batch_size.max(1),
            remaining: universe.clone(),
            universe,
            batch: None,
            in_flight: HashSet::new(),
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.batch.is_some() {
            SessionState::BatchActive
        } else {
            SessionState::Idle
        }
    }

    /// The active batch, if any.
    #[must_use]
    pub fn current_batch(&self) -> Option<&Batch> {
        self.batch.as_ref()
    }

    /// Every asset the session was opened with, in listing order.
    #[must_use]
    pub fn universe(&self) -> &[AssetId] {
        &self.universe
    }

    /// Assets not yet presented in a completed batch.
    #[must_use]
    pub fn remaining(&self) -> &[AssetId] {
        &self.remaining
    }

    /// Maximum number of assets per batch.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Decision store.
    #[must_use]
    pub fn store(&self) -> &DecisionStore {
        &self.store
    }

    /// Mutable decision store, e.g. to clear all records.
    pub fn store_mut(&mut self) -> &mut DecisionStore {
        &mut self.store
    }

    /// Whether a deletion of `id` is in flight.
    #[must_use]
    pub fn is_delete_in_flight(&self, id: &AssetId) -> bool {
        self.in_flight.contains(id)
    }

    /// Counts over the full universe.
    #[must_use]
    pub fn stats(&self) -> DecisionStats {
        self.store.stats(&self.universe)
    }

    /// Draw the next batch.
    ///
    /// # Errors
    ///
    /// - `BatchAlreadyActive` if the current batch was not completed
    /// - `NoPhotosRemaining` if nothing undecided is left; the session stays idle
    pub fn start_batch(&mut self) -> Result<&Batch, SessionError> {
        self.start_batch_with_rng(&mut rand::thread_rng())
    }

    /// Draw the next batch using the given RNG.
    ///
    /// # Errors
    ///
    /// Same as [`start_batch`](Self::start_batch).
    pub fn start_batch_with_rng<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<&Batch, SessionError> {
        if self.batch.is_some() {
            return Err(SessionError::BatchAlreadyActive);
        }
        let batch =
            self.selector
                .next_batch_with_rng(&self.remaining, &self.store, self.batch_size, rng);
        if batch.is_empty() {
            log::info!("No photos remaining to review");
            return Err(SessionError::NoPhotosRemaining);
        }
        log::debug!("Batch started with {} asset(s)", batch.len());
        Ok(&*self.batch.insert(batch))
    }

    /// Keep `id`.
    ///
    /// Returns `Ok(false)` if it was already kept.
    ///
    /// # Errors
    ///
    /// - `NoActiveBatch` / `NotInBatch` if `id` is not under review
    /// - `DeleteInFlight` if a deletion of `id` has not finished
    /// - `Decision` if the store refused or failed to persist
    pub fn record_keep(&mut self, id: &AssetId) -> Result<bool, SessionError> {
        self.ensure_in_batch(id)?;
        if self.in_flight.contains(id) {
            return Err(SessionError::DeleteInFlight(id.clone()));
        }
        Ok(self.store.decide(id, Decision::Kept)?)
    }

    /// Delete `id` from the backend, then record it as Deleted.
    ///
    /// # Errors
    ///
    /// - the errors of [`begin_delete`](Self::begin_delete)
    /// - `BackendDelete` if the backend failed; nothing is recorded
    /// - `Decision` if the deletion could not be persisted
    pub fn record_delete(&mut self, id: &AssetId) -> Result<bool, SessionError> {
        if self.store.status_of(id) == Decision::Deleted {
            self.ensure_in_batch(id)?;
            return Ok(false);
        }
        let ticket = self.begin_delete(id)?;
        let targets = BTreeSet::from([id.clone()]);
        let outcome = self.backend.delete_assets(&targets);
        self.finish_delete(ticket, outcome)
    }

    /// Start deleting `id`.
    ///
    /// The reassignment policy is checked here, before the backend is
    /// touched.
    ///
    /// # Errors
    ///
    /// - `NoActiveBatch` / `NotInBatch` if `id` is not under review
    /// - `DeleteInFlight` if `id` is already being deleted
    /// - `Decision` if the policy forbids deleting a kept asset
    pub fn begin_delete(&mut self, id: &AssetId) -> Result<DeleteTicket, SessionError> {
        self.ensure_in_batch(id)?;
        if self.in_flight.contains(id) {
            return Err(SessionError::DeleteInFlight(id.clone()));
        }
        self.store.check_policy(id, Decision::Deleted)?;
        self.in_flight.insert(id.clone());
        log::debug!("Deletion of {} started", id);
        Ok(DeleteTicket { id: id.clone() })
    }

    /// Finish a deletion with the backend's outcome.
    ///
    /// The asset is recorded as Deleted only if `outcome` is `Ok`.
    ///
    /// # Errors
    ///
    /// - `BackendDelete` carrying the backend's error
    /// - `Decision` if the deletion could not be persisted
    pub fn finish_delete(
        &mut self,
        ticket: DeleteTicket,
        outcome: Result<(), BackendDeleteError>,
    ) -> Result<bool, SessionError> {
        let DeleteTicket { id } = ticket;
        self.in_flight.remove(&id);

        if let Err(e) = outcome {
            log::warn!("Backend failed to delete {}: {}", id, e);
            return Err(e.into());
        }
        self.store.decide(&id, Decision::Deleted).map_err(|e| {
            log::error!("{} was deleted but the decision was not recorded: {}", id, e);
            SessionError::from(e)
        })
    }

    /// Finish the active batch and drop its assets from the working universe.
    ///
    /// # Errors
    ///
    /// - `NoActiveBatch` if no batch is active
    /// - `DeleteInFlight` while any deletion is unfinished
    pub fn complete_batch(&mut self) -> Result<Batch, SessionError> {
        if let Some(id) = self.in_flight.iter().next() {
            return Err(SessionError::DeleteInFlight(id.clone()));
        }
        let batch = self.batch.take().ok_or(SessionError::NoActiveBatch)?;
        let presented: HashSet<&AssetId> = batch.iter().collect();
        self.remaining.retain(|id| !presented.contains(id));
        log::debug!(
            "Batch complete: {} asset(s) left in this session",
            self.remaining.len()
        );
        Ok(batch)
    }

    /// Re-list the backend and restore the full working universe.
    ///
    /// # Errors
    ///
    /// - `BatchAlreadyActive` while a batch is active
    /// - `List` if the backend cannot enumerate its assets
    pub fn reset_universe(&mut self) -> Result<(), SessionError> {
        if self.batch.is_some() {
            return Err(SessionError::BatchAlreadyActive);
        }
        self.universe = list_universe(self.backend.as_ref(), self.kind)?;
        self.remaining = self.universe.clone();
        log::info!("Universe reset: {} asset(s)", self.universe.len());
        Ok(())
    }

    /// Scan the undecided part of the universe for duplicates.
    ///
    /// # Errors
    ///
    /// Propagates [`GroupError`] from the scan.
    pub fn find_duplicates(&self, config: GrouperConfig) -> Result<GroupingReport, GroupError> {
        DuplicateGrouper::new(Arc::clone(&self.backend), config)
            .group_undecided(&self.universe, &self.store)
    }

    /// Merge duplicate groups against this session's store.
    ///
    /// Merged assets also leave the working universe.
    ///
    /// # Errors
    ///
    /// - `InFlight` if any group member has an unfinished deletion; nothing
    ///   is submitted to the backend
    /// - otherwise propagates [`MergeError`]
    pub fn merge_duplicates(
        &mut self,
        groups: &[DuplicateGroup],
    ) -> Result<MergeReport, MergeError> {
        if let Some(id) = groups
            .iter()
            .flat_map(DuplicateGroup::members)
            .find(|id| self.in_flight.contains(*id))
        {
            log::warn!("Refusing to merge: deletion of {} is still in flight", id);
            return Err(MergeError::InFlight {
                id: id.clone(),
                report: MergeReport::default(),
            });
        }
        let result = merge_duplicates(groups, self.backend.as_ref(), &mut self.store);
        let report = match &result {
            Ok(report) => report,
            Err(e) => e.report(),
        };
        let removed: HashSet<&AssetId> = report.deleted.iter().collect();
        self.remaining.retain(|id| !removed.contains(id));
        result
    }

    fn ensure_in_batch(&self, id: &AssetId) -> Result<(), SessionError> {
        let batch = self.batch.as_ref().ok_or(SessionError::NoActiveBatch)?;
        if !batch.contains(id) {
            return Err(SessionError::NotInBatch(id.clone()));
        }
        Ok(())
    }
}

fn list_universe(backend: &dyn AssetBackend, kind: AssetKind) -> Result<Vec<AssetId>, ListError> {
    let assets = backend.list_assets(kind)?;
    Ok(assets.into_iter().map(|asset| asset.id).collect())
}
