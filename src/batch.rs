//! Random batch selection.
//!
//! [`BatchSelector`] draws a bounded number of undecided assets uniformly
//! at random, without replacement. It keeps no state between calls: two
//! batches may overlap if nothing was decided in between.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::backend::AssetId;
use crate::decisions::DecisionStore;

/// Assets presented together for review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ids: Vec<AssetId>,
}

impl Batch {
    /// Identifiers in presentation order.
    #[must_use]
    pub fn ids(&self) -> &[AssetId] {
        &self.ids
    }

    /// Number of assets in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is part of this batch.
    #[must_use]
    pub fn contains(&self, id: &AssetId) -> bool {
        self.ids.contains(id)
    }

    /// Iterate over the identifiers.
    pub fn iter(&self) -> std::slice::Iter<'_, AssetId> {
        self.ids.iter()
    }

    /// Consume the batch, returning its identifiers.
    #[must_use]
    pub fn into_ids(self) -> Vec<AssetId> {
        self.ids
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a AssetId;
    type IntoIter = std::slice::Iter<'a, AssetId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

/// Stateless random batch selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSelector;

impl BatchSelector {
    /// Create a selector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Draw up to `size` undecided assets from `universe` using the thread RNG.
    ///
    /// Returns an empty batch when nothing in `universe` is undecided.
    pub fn next_batch<'a, I>(&self, universe: I, store: &DecisionStore, size: usize) -> Batch
    where
        I: IntoIterator<Item = &'a AssetId>,
    {
        self.next_batch_with_rng(universe, store, size, &mut rand::thread_rng())
    }

    /// Draw up to `size` undecided assets using the given RNG.
    ///
    /// With a seeded RNG and the same universe order the result is
    /// reproducible.
    pub fn next_batch_with_rng<'a, I, R>(
        &self,
        universe: I,
        store: &DecisionStore,
        size: usize,
        rng: &mut R,
    ) -> Batch
    where
        I: IntoIterator<Item = &'a AssetId>,
        R: Rng + ?Sized,
    {
        let mut seen = HashSet::new();
        let mut undecided: Vec<AssetId> = universe
            .into_iter()
            .filter(|id| !store.is_decided(id) && seen.insert(*id))
            .cloned()
            .collect();

        let take = size.min(undecided.len());
        if take == 0 {
            return Batch::default();
        }

        let (chosen, _) = undecided.partial_shuffle(rng, take);
        let ids = chosen.to_vec();
        log::debug!(
            "Selected batch of {} from {} undecided asset(s)",
            ids.len(),
            undecided.len()
        );
        Batch { ids }
    }
}
