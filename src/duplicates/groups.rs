//! Duplicate groups.
//!
//! A [`DuplicateGroup`] holds the assets that share one [`Fingerprint`], in
//! the order they were handed to the scan. The first member is the survivor:
//! the copy a merge keeps. Every other member is a deletion candidate.
//!
//! # Example
//!
//! ```
//! use phototriage::backend::AssetId;
//! use phototriage::duplicates::DuplicateGroup;
//! use phototriage::fingerprint::Fingerprint;
//!
//! let group = DuplicateGroup::new(
//!     Fingerprint::of(b"same bytes"),
//!     vec![AssetId::from("A"), AssetId::from("C")],
//! )
//! .unwrap();
//!
//! assert_eq!(group.survivor().as_str(), "A");
//! assert_eq!(group.deletion_candidates(), &[AssetId::from("C")]);
//! ```

use serde::Serialize;

use crate::backend::AssetId;
use crate::fingerprint::Fingerprint;

/// Assets with identical content.
///
/// Always holds at least two members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    fingerprint: Fingerprint,
    members: Vec<AssetId>,
}

impl DuplicateGroup {
    /// Build a group from members in input order.
    ///
    /// Returns `None` when fewer than two members are given, since a single
    /// asset is not a duplicate of anything.
    #[must_use]
    pub fn new(fingerprint: Fingerprint, members: Vec<AssetId>) -> Option<Self> {
        (members.len() >= 2).then_some(Self {
            fingerprint,
            members,
        })
    }

    /// Fingerprint shared by every member.
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// All members, survivor first.
    #[must_use]
    pub fn members(&self) -> &[AssetId] {
        &self.members
    }

    /// The member a merge keeps.
    #[must_use]
    pub fn survivor(&self) -> &AssetId {
        &self.members[0]
    }

    /// Members after the survivor.
    #[must_use]
    pub fn deletion_candidates(&self) -> &[AssetId] {
        &self.members[1..]
    }

    /// Whether `id` belongs to this group.
    #[must_use]
    pub fn contains(&self, id: &AssetId) -> bool {
        self.members.contains(id)
    }

    /// Number of members (at least 2).
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`; provided for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
