//! Batch reduction
//!
//! Folds every record of one batch into a batch-local aggregate. Reducers
//! share nothing with each other, so any number can run concurrently on
//! disjoint batches.

use super::accumulator::{KeyAccumulator, OverflowError};
use super::batch::Batch;
use super::header::ColumnLayout;
use super::pool::{BatchFault, BatchReduce, CancelSignal};
use super::record::{parse_record, SkipKind, SkipReason};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Row accounting for one batch or a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowStats {
    pub rows: u64,
    pub aggregated: u64,
    pub too_few_fields: u64,
    pub empty_field: u64,
    pub invalid_number: u64,
}

impl RowStats {
    pub fn skipped(&self) -> u64 {
        self.too_few_fields + self.empty_field + self.invalid_number
    }

    fn record_skip(&mut self, kind: SkipKind) {
        match kind {
            SkipKind::TooFewFields => self.too_few_fields += 1,
            SkipKind::EmptyField => self.empty_field += 1,
            SkipKind::InvalidNumber => self.invalid_number += 1,
        }
    }

    pub fn combine(self, other: Self) -> Self {
        Self {
            rows: self.rows + other.rows,
            aggregated: self.aggregated + other.aggregated,
            too_few_fields: self.too_few_fields + other.too_few_fields,
            empty_field: self.empty_field + other.empty_field,
            invalid_number: self.invalid_number + other.invalid_number,
        }
    }
}

/// Partial aggregate produced from exactly one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalAggregate {
    pub batch_id: usize,
    entries: HashMap<String, KeyAccumulator>,
    stats: RowStats,
}

impl LocalAggregate {
    pub fn new(batch_id: usize) -> Self {
        Self {
            batch_id,
            ..Self::default()
        }
    }

    /// Fold one value in under `key`
    pub fn insert(&mut self, key: &str, value: Decimal) -> Result<(), OverflowError> {
        match self.entries.get_mut(key) {
            Some(acc) => acc.add(value).ok_or_else(|| OverflowError {
                key: key.to_string(),
            })?,
            None => {
                self.entries
                    .insert(key.to_string(), KeyAccumulator::new(value));
            }
        }
        self.stats.rows += 1;
        self.stats.aggregated += 1;
        Ok(())
    }

    fn skip(&mut self, kind: SkipKind) {
        self.stats.rows += 1;
        self.stats.record_skip(kind);
    }

    pub fn get(&self, key: &str) -> Option<&KeyAccumulator> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> RowStats {
        self.stats
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KeyAccumulator)> {
        self.entries.iter()
    }
}

/// The standard reducer: parse each record, fold the valid ones
#[derive(Debug, Clone)]
pub struct RecordReducer {
    layout: ColumnLayout,
    delimiter: char,
    value_column: String,
}

impl RecordReducer {
    pub fn new(layout: ColumnLayout, delimiter: char, value_column: impl Into<String>) -> Self {
        Self {
            layout,
            delimiter,
            value_column: value_column.into(),
        }
    }

    /// Reduce a batch to its local aggregate
    pub fn reduce_batch(
        &self,
        batch: &Batch,
        cancel: &CancelSignal,
    ) -> Result<LocalAggregate, BatchFault> {
        let mut local = LocalAggregate::new(batch.id);

        for (offset, line) in batch.lines.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(BatchFault::Cancelled);
            }

            match parse_record(line, &self.layout, self.delimiter) {
                Ok(record) => local.insert(record.key, record.value)?,
                Err(reason) => {
                    let line_number = batch.start_line + offset;
                    match &reason {
                        SkipReason::InvalidNumber { text } => warn!(
                            batch_id = batch.id,
                            line = line_number,
                            "Invalid {}: {}",
                            self.value_column,
                            text
                        ),
                        other => debug!(
                            batch_id = batch.id,
                            line = line_number,
                            "Skipping malformed row: {}",
                            other
                        ),
                    }
                    local.skip(reason.kind());
                }
            }
        }

        debug!(
            batch_id = batch.id,
            rows = batch.len(),
            keys = local.len(),
            "Batch reduced"
        );
        Ok(local)
    }
}

impl BatchReduce for RecordReducer {
    fn reduce(&self, batch: &Batch, cancel: &CancelSignal) -> Result<LocalAggregate, BatchFault> {
        self.reduce_batch(batch, cancel)
    }
}
