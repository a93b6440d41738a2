//! Sparse accumulation of branch lengths by site pattern.
//!
//! A [PatternTable] maps a [TipId] to a non-negative weight, either a sum of
//! simulated branch lengths or a probability after [PatternTable::normalize].
//! The key space is the full 32-bit pattern range but typical occupancy is a
//! few thousand entries, so the table is a sparse ordered map. Iteration is
//! always in ascending numeric key order.

use crate::TipId;
use demefit_error::{DemefitError, DemefitResult};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternTable {
    entries: BTreeMap<TipId, f64>,
}

impl PatternTable {
    pub fn new() -> Self {
        PatternTable {
            entries: BTreeMap::new(),
        }
    }

    /// Add `weight` to the entry for `tid`, inserting it if absent.
    #[inline]
    pub fn add(&mut self, tid: TipId, weight: f64) {
        *self.entries.entry(tid).or_insert(0.0) += weight;
    }

    /// Weight of `tid`, or 0 when the key is absent.
    #[inline]
    pub fn get(&self, tid: TipId) -> f64 {
        self.entries.get(&tid).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.entries.values().sum()
    }

    /// Divide every entry by `divisor`.
    pub fn divide_by(&mut self, divisor: f64) {
        for w in self.entries.values_mut() {
            *w /= divisor;
        }
    }

    /// Rescale the table so its entries sum to one.
    ///
    /// Fails with [DemefitError::EmptyTable] when there is no mass to
    /// normalize, which is how a degenerate simulated spectrum surfaces.
    pub fn normalize(&mut self) -> DemefitResult<()> {
        let total = self.total();
        if total <= 0.0 {
            return Err(DemefitError::EmptyTable);
        }
        self.divide_by(total);
        Ok(())
    }

    /// Add every entry of `other` into this table.
    pub fn merge(&mut self, other: &PatternTable) {
        for (&tid, &w) in &other.entries {
            self.add(tid, w);
        }
    }

    /// Subtract `other` entrywise. Keys present only in `other` are treated
    /// as zero here; the key set of `self` is retained. Used for residuals.
    pub fn subtract(&mut self, other: &PatternTable) {
        for (tid, w) in self.entries.iter_mut() {
            *w -= other.get(*tid);
        }
    }

    /// Entries in ascending numeric key order.
    pub fn sorted_entries(&self) -> Vec<(TipId, f64)> {
        self.entries.iter().map(|(&t, &w)| (t, w)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TipId, f64)> + '_ {
        self.entries.iter().map(|(&t, &w)| (t, w))
    }

    /// True when both tables carry exactly the same key set.
    pub fn same_keys(&self, other: &PatternTable) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.keys().zip(other.entries.keys()).all(|(a, b)| a == b)
    }
}

impl FromIterator<(TipId, f64)> for PatternTable {
    fn from_iter<I: IntoIterator<Item = (TipId, f64)>>(iter: I) -> Self {
        let mut table = PatternTable::new();
        for (tid, w) in iter {
            table.add(tid, w);
        }
        table
    }
}
