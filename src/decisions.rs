//! Keep/delete decision state.
//!
//! # Overview
//!
//! [`DecisionStore`] is the single source of truth for which assets the user
//! has kept, which have been deleted, and which are still undecided. It is
//! materialized as two disjoint sets; absence from both means undecided.
//!
//! # Write-through persistence
//!
//! Every call that changes state persists both sets as one unit *before*
//! updating memory. When persistence fails the call returns the error and
//! the in-memory state is exactly what it was before the call.
//!
//! # Reassignment policy
//!
//! Moving an asset from Kept to Deleted (or back) is governed by
//! [`ReassignPolicy`]. Under [`ReassignPolicy::LastWriteWins`] the newer
//! decision replaces the older one. Under [`ReassignPolicy::Reject`] such a
//! move fails with [`DecisionError::Conflict`] unless it goes through
//! [`DecisionStore::reassign`].
//!
//! # Example
//!
//! ```
//! use phototriage::backend::AssetId;
//! use phototriage::decisions::{Decision, DecisionStore};
//! use phototriage::store::MemoryStore;
//!
//! let mut store = DecisionStore::load(Box::new(MemoryStore::new())).unwrap();
//! let id = AssetId::from("IMG_0001");
//!
//! store.decide(&id, Decision::Kept).unwrap();
//! assert_eq!(store.status_of(&id), Decision::Kept);
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::backend::AssetId;
use crate::store::{PersistenceError, PersistenceStore, DELETED_KEY, KEPT_KEY};

/// Review state of one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Decision {
    /// Not reviewed yet
    #[default]
    Undecided,
    /// User chose to keep the asset
    Kept,
    /// Asset was deleted from the backend
    Deleted,
}

/// What happens when a decided asset receives the opposite decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReassignPolicy {
    /// The newest decision replaces the previous one.
    #[default]
    LastWriteWins,
    /// Kept <-> Deleted moves require [`DecisionStore::reassign`].
    Reject,
}

/// Errors returned by [`DecisionStore`] mutations.
#[derive(thiserror::Error, Debug)]
pub enum DecisionError {
    /// The asset already carries the opposite decision.
    #[error("Conflicting decision for {id}: already {current:?}, requested {requested:?}")]
    Conflict {
        /// Asset in question
        id: AssetId,
        /// Decision on record
        current: Decision,
        /// Decision that was refused
        requested: Decision,
    },

    /// The updated sets could not be persisted; nothing changed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Aggregate counts over a universe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionStats {
    /// Assets marked Kept
    pub kept: usize,
    /// Assets marked Deleted
    pub deleted: usize,
    /// Assets of the universe with no decision
    pub undecided: usize,
}

/// Owner of Kept/Deleted state, persisted write-through.
pub struct DecisionStore {
    kept: BTreeSet<AssetId>,
    deleted: BTreeSet<AssetId>,
    persistence: Box<dyn PersistenceStore>,
    policy: ReassignPolicy,
}

impl std::fmt::Debug for DecisionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionStore")
            .field("kept", &self.kept.len())
            .field("deleted", &self.deleted.len())
            .field("persistence", &"<store>")
            .field("policy", &self.policy)
            .finish()
    }
}

impl DecisionStore {
    /// Load persisted sets with the default [`ReassignPolicy`].
    ///
    /// # Errors
    ///
    /// Propagates read failures from the persistence store.
    pub fn load(persistence: Box<dyn PersistenceStore>) -> Result<Self, PersistenceError> {
        let kept: BTreeSet<AssetId> = persistence
            .load_set(KEPT_KEY)?
            .into_iter()
            .map(AssetId::from)
            .collect();
        let deleted: BTreeSet<AssetId> = persistence
            .load_set(DELETED_KEY)?
            .into_iter()
            .map(AssetId::from)
            .collect();

        // Deletion cannot be undone in the backend, so Deleted wins.
        let overlap: Vec<AssetId> = kept.intersection(&deleted).cloned().collect();
        let mut kept = kept;
        for id in &overlap {
            log::warn!(
                "Asset {} recorded as both kept and deleted; treating as deleted",
                id
            );
            kept.remove(id);
        }

        log::debug!(
            "Decision store loaded: {} kept, {} deleted",
            kept.len(),
            deleted.len()
        );

        Ok(Self {
            kept,
            deleted,
            persistence,
            policy: ReassignPolicy::default(),
        })
    }

    /// Set the reassignment policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ReassignPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Active reassignment policy.
    #[must_use]
    pub fn policy(&self) -> ReassignPolicy {
        self.policy
    }

    /// Current decision for `id`.
    #[must_use]
    pub fn status_of(&self, id: &AssetId) -> Decision {
        if self.deleted.contains(id) {
            Decision::Deleted
        } else if self.kept.contains(id) {
            Decision::Kept
        } else {
            Decision::Undecided
        }
    }

    /// Whether `id` carries any decision.
    #[must_use]
    pub fn is_decided(&self, id: &AssetId) -> bool {
        self.kept.contains(id) || self.deleted.contains(id)
    }

    /// Assets marked Kept.
    #[must_use]
    pub fn kept(&self) -> &BTreeSet<AssetId> {
        &self.kept
    }

    /// Assets marked Deleted.
    #[must_use]
    pub fn deleted(&self) -> &BTreeSet<AssetId> {
        &self.deleted
    }

    /// `universe − (Kept ∪ Deleted)`.
    pub fn undecided<'a, I>(&self, universe: I) -> BTreeSet<AssetId>
    where
        I: IntoIterator<Item = &'a AssetId>,
    {
        universe
            .into_iter()
            .filter(|id| !self.is_decided(id))
            .cloned()
            .collect()
    }

    /// Counts computed from the current sets.
    ///
    /// `undecided` counts the members of `universe` with no decision.
    pub fn stats<'a, I>(&self, universe: I) -> DecisionStats
    where
        I: IntoIterator<Item = &'a AssetId>,
    {
        DecisionStats {
            kept: self.kept.len(),
            deleted: self.deleted.len(),
            undecided: universe
                .into_iter()
                .filter(|id| !self.is_decided(id))
                .count(),
        }
    }

    /// Record a decision for `id`.
    ///
    /// Returns `Ok(false)` when `id` already has this decision (nothing is
    /// written), `Ok(true)` when the state changed and was persisted.
    /// [`Decision::Undecided`] clears any decision.
    ///
    /// # Errors
    ///
    /// - `Conflict` under [`ReassignPolicy::Reject`] for a Kept <-> Deleted move
    /// - `Persistence` if the new state could not be written; state is unchanged
    pub fn decide(&mut self, id: &AssetId, decision: Decision) -> Result<bool, DecisionError> {
        self.check_policy(id, decision)?;
        self.apply(std::slice::from_ref(id), decision)
    }

    /// Record a decision for `id`, bypassing the reassignment policy.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the new state could not be written.
    pub fn reassign(&mut self, id: &AssetId, decision: Decision) -> Result<bool, DecisionError> {
        self.apply(std::slice::from_ref(id), decision)
    }

    /// Record the same decision for several assets in one persisted write.
    ///
    /// The policy is checked for every id before anything is written, so a
    /// conflict on one id leaves all of them untouched.
    ///
    /// # Errors
    ///
    /// Same as [`decide`](Self::decide).
    pub fn decide_all(
        &mut self,
        ids: &[AssetId],
        decision: Decision,
    ) -> Result<bool, DecisionError> {
        for id in ids {
            self.check_policy(id, decision)?;
        }
        self.apply(ids, decision)
    }

    /// Forget every decision.
    ///
    /// This only affects bookkeeping; assets already deleted in the backend
    /// stay deleted.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the empty sets could not be written.
    pub fn clear(&mut self) -> Result<(), DecisionError> {
        let empty = BTreeSet::new();
        self.persist(&empty, &empty)?;
        log::info!(
            "Cleared {} kept and {} deleted record(s)",
            self.kept.len(),
            self.deleted.len()
        );
        self.kept.clear();
        self.deleted.clear();
        Ok(())
    }

    /// Check `requested` against the reassignment policy without writing.
    ///
    /// Lets callers refuse an irreversible backend action (such as a delete)
    /// before performing it.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` where [`decide`](Self::decide) would.
    pub fn check_policy(&self, id: &AssetId, requested: Decision) -> Result<(), DecisionError> {
        if self.policy != ReassignPolicy::Reject {
            return Ok(());
        }
        let current = self.status_of(id);
        let crosses = matches!(
            (current, requested),
            (Decision::Kept, Decision::Deleted) | (Decision::Deleted, Decision::Kept)
        );
        if crosses {
            return Err(DecisionError::Conflict {
                id: id.clone(),
                current,
                requested,
            });
        }
        Ok(())
    }

    fn apply(&mut self, ids: &[AssetId], decision: Decision) -> Result<bool, DecisionError> {
        let mut kept = self.kept.clone();
        let mut deleted = self.deleted.clone();

        for id in ids {
            match decision {
                Decision::Kept => {
                    deleted.remove(id);
                    kept.insert(id.clone());
                }
                Decision::Deleted => {
                    kept.remove(id);
                    deleted.insert(id.clone());
                }
                Decision::Undecided => {
                    kept.remove(id);
                    deleted.remove(id);
                }
            }
        }

        if kept == self.kept && deleted == self.deleted {
            return Ok(false);
        }

        self.persist(&kept, &deleted)?;
        for id in ids {
            log::debug!("Recorded {:?} for {}", decision, id);
        }
        self.kept = kept;
        self.deleted = deleted;
        Ok(true)
    }

    fn persist(
        &self,
        kept: &BTreeSet<AssetId>,
        deleted: &BTreeSet<AssetId>,
    ) -> Result<(), PersistenceError> {
        let kept: BTreeSet<String> = kept.iter().map(|id| id.as_str().to_string()).collect();
        let deleted: BTreeSet<String> = deleted.iter().map(|id| id.as_str().to_string()).collect();
        self.persistence
            .save_sets(&[(KEPT_KEY, &kept), (DELETED_KEY, &deleted)])
            .inspect_err(|e| log::error!("Failed to persist decisions: {}", e))
    }
}
