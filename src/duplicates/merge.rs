//! Merging duplicate groups.
//!
//! A merge keeps one survivor per group and deletes the rest in a single
//! backend request, then records every deleted asset with one persisted
//! write. Groups are re-checked against the current decisions first, since
//! the user may have reviewed some members after the scan:
//!
//! - members already Deleted are dropped from the group
//! - members marked Kept are never deleted
//! - a group left with fewer than two members is skipped

use std::collections::BTreeSet;

use serde::Serialize;

use super::DuplicateGroup;
use crate::backend::{AssetBackend, AssetId, BackendDeleteError};
use crate::decisions::{Decision, DecisionError, DecisionStore};

/// Outcome of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Groups that contributed at least one deletion
    pub groups_merged: usize,
    /// Groups left untouched after re-validation
    pub groups_skipped: usize,
    /// Assets deleted and recorded as Deleted
    pub deleted: Vec<AssetId>,
    /// Kept members that were spared
    pub exempt: Vec<AssetId>,
    /// Assets gone from the backend whose deletion could not be recorded
    pub unrecorded: Vec<AssetId>,
}

/// Errors returned by [`merge_duplicates`].
///
/// Every variant carries the report of what was actually recorded.
#[derive(thiserror::Error, Debug)]
pub enum MergeError {
    /// The backend refused the deletion.
    #[error("Failed to delete duplicates: {source}")]
    Backend {
        /// Backend failure
        #[source]
        source: BackendDeleteError,
        /// What was recorded despite the failure
        report: MergeReport,
    },

    /// Assets were deleted but the decision could not be recorded.
    #[error("Duplicates deleted but not recorded: {source}")]
    Decision {
        /// Store failure
        #[source]
        source: DecisionError,
        /// What was recorded; the lost deletions are in `unrecorded`
        report: MergeReport,
    },

    /// A group member is already being deleted; nothing was submitted.
    #[error("Deletion of {id} is still in flight")]
    InFlight {
        /// Asset with an unfinished deletion
        id: AssetId,
        /// Empty report
        report: MergeReport,
    },
}

impl MergeError {
    /// Report of what was recorded before the failure.
    #[must_use]
    pub fn report(&self) -> &MergeReport {
        match self {
            Self::Backend { report, .. }
            | Self::Decision { report, .. }
            | Self::InFlight { report, .. } => report,
        }
    }
}

/// Delete every non-survivor of `groups` and record it as Deleted.
///
/// # Errors
///
/// - `Backend` if the delete request failed. Backends that report
///   [`AssetBackend::supports_partial_delete`] are re-queried, and the assets
///   that are gone are still recorded.
/// - `Decision` if assets left the backend but could not be recorded as
///   Deleted, including those found gone after a partial failure. They are
///   listed in [`MergeReport::unrecorded`].
pub fn merge_duplicates(
    groups: &[DuplicateGroup],
    backend: &dyn AssetBackend,
    store: &mut DecisionStore,
) -> Result<MergeReport, MergeError> {
    let mut report = MergeReport::default();
    let mut targets: Vec<AssetId> = Vec::new();
    let mut seen: BTreeSet<AssetId> = BTreeSet::new();

    for group in groups {
        let live: Vec<&AssetId> = group
            .members()
            .iter()
            .filter(|id| store.status_of(id) != Decision::Deleted)
            .collect();
        if live.len() < 2 {
            log::debug!(
                "Skipping group {}: {} live member(s)",
                group.fingerprint(),
                live.len()
            );
            report.groups_skipped += 1;
            continue;
        }

        let mut contributed = false;
        for id in &live[1..] {
            if store.status_of(id) == Decision::Kept {
                report.exempt.push((*id).clone());
            } else if seen.insert((*id).clone()) {
                targets.push((*id).clone());
                contributed = true;
            }
        }
        if contributed {
            report.groups_merged += 1;
        } else {
            report.groups_skipped += 1;
        }
    }

    if targets.is_empty() {
        log::info!("Nothing to merge");
        return Ok(report);
    }

    log::info!(
        "Merging {} group(s): deleting {} duplicate(s)",
        report.groups_merged,
        targets.len()
    );

    match backend.delete_assets(&seen) {
        Ok(()) => {
            if let Err(source) = store.decide_all(&targets, Decision::Deleted) {
                log::error!("Deleted {} duplicate(s) but could not record them", targets.len());
                report.unrecorded = targets;
                return Err(MergeError::Decision { source, report });
            }
            report.deleted = targets;
            Ok(report)
        }
        Err(source) => {
            log::warn!("Duplicate deletion failed: {}", source);
            if backend.supports_partial_delete() {
                let gone: Vec<AssetId> = targets
                    .into_iter()
                    .filter(|id| !backend.contains(id))
                    .collect();
                if !gone.is_empty() {
                    if let Err(e) = store.decide_all(&gone, Decision::Deleted) {
                        log::error!(
                            "Backend failed ({}) after deleting {} duplicate(s), which could not be recorded: {}",
                            source,
                            gone.len(),
                            e
                        );
                        report.unrecorded = gone;
                        return Err(MergeError::Decision { source: e, report });
                    }
                    log::info!("Recorded {} duplicate(s) deleted before the failure", gone.len());
                    report.deleted = gone;
                }
            }
            Err(MergeError::Backend { source, report })
        }
    }
}
