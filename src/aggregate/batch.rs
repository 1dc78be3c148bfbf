//! Fixed-size batching of data records
//!
//! Batch boundaries carry no meaning beyond size: every batch holds exactly
//! `batch_size` records except the last, which holds the remainder.

use std::num::NonZeroUsize;

/// An ordered group of raw records, owned by whichever worker reduces it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Dispatch sequence number, starting at 0
    pub id: usize,
    /// 1-based input line number of the first record
    pub start_line: usize,
    pub lines: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Push-based batcher used while streaming input
#[derive(Debug)]
pub struct Batcher {
    batch_size: NonZeroUsize,
    next_id: usize,
    next_line: usize,
    current: Vec<String>,
}

impl Batcher {
    /// Create a batcher; `first_line` is the input line number of the first data record
    pub fn new(batch_size: NonZeroUsize, first_line: usize) -> Self {
        Self {
            batch_size,
            next_id: 0,
            next_line: first_line,
            current: Vec::with_capacity(batch_size.get()),
        }
    }

    /// Add one record, returning a batch once `batch_size` records are buffered
    pub fn push(&mut self, line: String) -> Option<Batch> {
        self.current.push(line);
        if self.current.len() >= self.batch_size.get() {
            self.take()
        } else {
            None
        }
    }

    /// Flush the remainder, if any
    pub fn finish(mut self) -> Option<Batch> {
        self.take()
    }

    /// Number of batches produced so far
    pub fn batches_emitted(&self) -> usize {
        self.next_id
    }

    fn take(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            return None;
        }

        let lines = std::mem::replace(
            &mut self.current,
            Vec::with_capacity(self.batch_size.get()),
        );
        let batch = Batch {
            id: self.next_id,
            start_line: self.next_line,
            lines,
        };
        self.next_id += 1;
        self.next_line += batch.len();
        Some(batch)
    }
}

/// Partition a sequence of data records into batches
///
/// Line numbers assume the records follow a single header line.
pub fn batches<I>(lines: I, batch_size: NonZeroUsize) -> impl Iterator<Item = Batch>
where
    I: IntoIterator<Item = String>,
{
    let mut lines = lines.into_iter();
    let mut batcher = Some(Batcher::new(batch_size, 2));

    std::iter::from_fn(move || {
        let current = batcher.as_mut()?;
        for line in lines.by_ref() {
            if let Some(batch) = current.push(line) {
                return Some(batch);
            }
        }
        batcher.take().and_then(Batcher::finish)
    })
}
