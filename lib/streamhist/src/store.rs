//! Ordered bin storage.
//!
//! Bins are kept in a sorted map keyed by their mean, which gives logarithmic insertion, removal, and neighbor lookup,
//! as well as ordered traversal in both directions.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

use ordered_float::OrderedFloat;

use crate::bin::Bin;

/// A store of bins, ordered by mean.
///
/// No two bins in the store share the same mean: inserting a bin whose mean exactly matches an existing bin folds the
/// new bin's weight into the existing one.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct BinStore {
    bins: BTreeMap<OrderedFloat<f64>, Bin>,
}

impl BinStore {
    /// Creates an empty `BinStore`.
    pub fn new() -> Self {
        Self { bins: BTreeMap::new() }
    }

    /// Returns the number of bins in the store.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Returns `true` if the store holds no bins.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Removes all bins from the store.
    pub fn clear(&mut self) {
        self.bins.clear();
    }

    /// Inserts a bin into the store.
    ///
    /// If a bin with the exact same mean already exists, the weight and deviation of `bin` are added to it instead.
    pub fn insert(&mut self, bin: Bin) {
        self.bins
            .entry(OrderedFloat(bin.mean))
            .and_modify(|existing| existing.absorb(&bin))
            .or_insert(bin);
    }

    /// Removes the bin with the given mean, returning it if it existed.
    pub fn remove(&mut self, mean: f64) -> Option<Bin> {
        self.bins.remove(&OrderedFloat(mean))
    }

    /// Gets a mutable reference to the bin with exactly the given mean.
    ///
    /// Callers must not change the mean of the returned bin.
    pub fn get_mut(&mut self, mean: f64) -> Option<&mut Bin> {
        self.bins.get_mut(&OrderedFloat(mean))
    }

    /// Returns the bin with the smallest mean.
    pub fn first(&self) -> Option<&Bin> {
        self.bins.first_key_value().map(|(_, bin)| bin)
    }

    /// Returns the bin with the largest mean.
    pub fn last(&self) -> Option<&Bin> {
        self.bins.last_key_value().map(|(_, bin)| bin)
    }

    /// Returns the bin with the smallest mean greater than or equal to `value`.
    pub fn lower_bound(&self, value: f64) -> Option<&Bin> {
        self.bins
            .range((Included(OrderedFloat(value)), Unbounded))
            .next()
            .map(|(_, bin)| bin)
    }

    /// Returns the bin with the largest mean strictly less than `value`.
    pub fn predecessor(&self, value: f64) -> Option<&Bin> {
        self.bins
            .range((Unbounded, Excluded(OrderedFloat(value))))
            .next_back()
            .map(|(_, bin)| bin)
    }

    /// Returns the bin whose mean is closest to `value`.
    ///
    /// The successor of `value` (smallest mean greater than or equal to it) is compared against its predecessor, and
    /// whichever is closer wins. When both are equally distant, the successor is returned.
    pub fn nearest(&self, value: f64) -> Option<&Bin> {
        match (self.lower_bound(value), self.predecessor(value)) {
            (Some(succ), Some(pred)) => {
                if (pred.mean - value).abs() < (succ.mean - value).abs() {
                    Some(pred)
                } else {
                    Some(succ)
                }
            }
            (Some(succ), None) => Some(succ),
            (None, pred) => pred,
        }
    }

    /// Iterates over the bins in ascending order of mean.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Bin> + ExactSizeIterator {
        self.bins.values()
    }

    /// Iterates mutably over the bins in ascending order of mean.
    ///
    /// Callers must not change the mean of any bin.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Bin> {
        self.bins.values_mut()
    }

    /// Finds the adjacent pair of bins with the lowest cost, according to `cost`.
    ///
    /// Returns the means of the lower and upper bins of the pair, or `None` if the store holds fewer than two bins. Ties
    /// resolve to the lowest pair.
    pub fn cheapest_adjacent_pair<F>(&self, mut cost: F) -> Option<(f64, f64)>
    where
        F: FnMut(&Bin, &Bin) -> f64,
    {
        let mut bins = self.bins.values();
        let mut prev = bins.next()?;
        let mut best: Option<(f64, f64, f64)> = None;

        for next in bins {
            let pair_cost = cost(prev, next);
            match best {
                Some((best_cost, _, _)) if best_cost <= pair_cost => {}
                _ => best = Some((pair_cost, prev.mean, next.mean)),
            }
            prev = next;
        }

        best.map(|(_, lower, upper)| (lower, upper))
    }
}
