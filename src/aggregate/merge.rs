//! Global merge
//!
//! Combines batch-local aggregates into the run-wide result. The merge is
//! applied by a single owner as outcomes arrive, so it needs no locking.

use super::accumulator::{KeyAccumulator, OverflowError};
use super::reducer::{LocalAggregate, RowStats};
use std::collections::btree_map::{self, BTreeMap};

/// Run-wide aggregate, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalAggregate {
    entries: BTreeMap<String, KeyAccumulator>,
    stats: RowStats,
    batches: usize,
}

impl GlobalAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one batch's local aggregate
    ///
    /// All-or-nothing: if any key would overflow, nothing from `local` is
    /// applied and the aggregate is left as it was.
    pub fn absorb(&mut self, local: &LocalAggregate) -> Result<(), OverflowError> {
        let mut merged = Vec::with_capacity(local.len());
        for (key, acc) in local.iter() {
            let combined = match self.entries.get(key) {
                Some(existing) => existing
                    .combine(*acc)
                    .ok_or_else(|| OverflowError { key: key.clone() })?,
                None => *acc,
            };
            merged.push((key, combined));
        }

        for (key, combined) in merged {
            match self.entries.get_mut(key) {
                Some(slot) => *slot = combined,
                None => {
                    self.entries.insert(key.clone(), combined);
                }
            }
        }
        self.stats = self.stats.combine(local.stats());
        self.batches += 1;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&KeyAccumulator> {
        self.entries.get(key)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Row accounting over every absorbed batch
    pub fn stats(&self) -> RowStats {
        self.stats
    }

    pub fn batches_absorbed(&self) -> usize {
        self.batches
    }

    /// Entries in ascending key order
    pub fn iter(&self) -> btree_map::Iter<'_, String, KeyAccumulator> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a GlobalAggregate {
    type Item = (&'a String, &'a KeyAccumulator);
    type IntoIter = btree_map::Iter<'a, String, KeyAccumulator>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
