//! Aggregation engine
//!
//! Drives one run end to end: resolve the header, stream records into
//! batches, dispatch them to the worker pool and merge outcomes into the
//! global aggregate as they complete.
//!
//! Fatal input problems (empty file, missing columns) are detected before
//! anything is dispatched. Anything that goes wrong afterwards is either
//! contained to its batch and counted in the `RunSummary`, or, for an input
//! read error, reported after the pool has been shut down.

use super::batch::Batcher;
use super::header::{ColumnLayout, ColumnNames};
use super::merge::GlobalAggregate;
use super::pool::{default_workers, BatchFault, BatchOutcome, WorkerPool};
use super::reducer::{RecordReducer, RowStats};
use crate::error::{AggregateError, ErrorCode, Result};
use serde::Serialize;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 2000;

/// Default wait for each shutdown stage
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Validated settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub batch_size: NonZeroUsize,
    pub workers: NonZeroUsize,
    pub delimiter: char,
    pub columns: ColumnNames,
    pub shutdown_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
            workers: NonZeroUsize::new(default_workers()).unwrap_or(NonZeroUsize::MIN),
            delimiter: ',',
            columns: ColumnNames::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// What happened during a run, beyond the aggregate itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub batches_dispatched: usize,
    pub batches_completed: usize,
    pub batches_lost: usize,
    /// Records in lost batches
    pub rows_lost: usize,
    /// Rows of every merged batch
    pub rows: RowStats,
    pub distinct_keys: usize,
    /// Collection stopped early on an interrupt
    pub interrupted: bool,
    /// Running batches had to be cancelled during shutdown
    pub shutdown_forced: bool,
    /// Batches still running when shutdown gave up
    pub batches_abandoned: usize,
}

impl RunSummary {
    /// The aggregate is missing data that was in the input
    pub fn is_degraded(&self) -> bool {
        self.interrupted || self.batches_lost > 0 || self.batches_abandoned > 0
    }
}

/// Final aggregate plus run accounting
#[derive(Debug, Clone)]
pub struct AggregationRun {
    pub aggregate: GlobalAggregate,
    pub summary: RunSummary,
}

/// Runs aggregations with fixed settings
#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    settings: EngineSettings,
}

impl AggregationEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Aggregate a file, stopping early on Ctrl-C
    pub async fn run_file(&self, path: &Path) -> Result<AggregationRun> {
        let reader = crate::input::open_input(path).await?;
        self.run_reader_until(reader, &path.display().to_string(), interrupt_signal())
            .await
    }

    /// Aggregate everything `reader` yields
    pub async fn run_reader<R>(&self, reader: R, source_name: &str) -> Result<AggregationRun>
    where
        R: AsyncBufRead + Unpin,
    {
        self.run_reader_until(reader, source_name, std::future::pending())
            .await
    }

    /// Aggregate `reader` until it is exhausted or `interrupt` resolves
    ///
    /// On interrupt no further batches are dispatched, the pool is shut down
    /// and whatever completed is returned with `summary.interrupted` set.
    pub async fn run_reader_until<R, F>(
        &self,
        reader: R,
        source_name: &str,
        interrupt: F,
    ) -> Result<AggregationRun>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let settings = &self.settings;
        let mut lines = reader.lines();

        let header = lines
            .next_line()
            .await
            .map_err(|source| AggregateError::InputRead { line: 0, source })?
            .ok_or_else(|| AggregateError::EmptyInput {
                source_name: source_name.to_string(),
            })?;
        let layout = ColumnLayout::resolve(&header, &settings.columns, settings.delimiter)?;
        debug!(
            key_index = layout.key_index,
            value_index = layout.value_index,
            "Resolved columns"
        );

        info!(
            source = source_name,
            batch_size = settings.batch_size.get(),
            workers = settings.workers.get(),
            "Starting aggregation"
        );

        let reducer = RecordReducer::new(
            layout,
            settings.delimiter,
            settings.columns.value.clone(),
        );
        let mut pool = WorkerPool::new(settings.workers, reducer);
        let mut batcher = Batcher::new(settings.batch_size, 2);
        let mut collector = Collector::default();
        let mut line_number = 1;
        let mut read_error = None;
        tokio::pin!(interrupt);

        // Dispatch while reading, merging whatever has already finished
        loop {
            tokio::select! {
                biased;

                _ = &mut interrupt => {
                    collector.summary.interrupted = true;
                    break;
                }
                Some(outcome) = pool.next_outcome(), if pool.in_flight() > 0 => {
                    collector.record(outcome);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        line_number += 1;
                        if let Some(batch) = batcher.push(line) {
                            pool.submit(batch);
                        }
                    }
                    Ok(None) => {
                        if let Some(batch) = batcher.finish() {
                            pool.submit(batch);
                        }
                        break;
                    }
                    Err(source) => {
                        read_error = Some(AggregateError::InputRead {
                            line: line_number,
                            source,
                        });
                        break;
                    }
                },
            }
        }
        collector.summary.batches_dispatched = pool.submitted();

        if !collector.summary.interrupted && read_error.is_none() {
            loop {
                tokio::select! {
                    biased;

                    _ = &mut interrupt => {
                        collector.summary.interrupted = true;
                        break;
                    }
                    outcome = pool.next_outcome() => match outcome {
                        Some(outcome) => collector.record(outcome),
                        None => break,
                    },
                }
            }
        }

        if collector.summary.interrupted {
            warn!(
                in_flight = pool.in_flight(),
                "Interrupted, shutting down worker pool"
            );
        }
        let (finished, report) = pool.shutdown(settings.shutdown_timeout).await;
        for outcome in finished {
            collector.record(outcome);
        }
        collector.summary.shutdown_forced = report.forced;
        collector.summary.batches_abandoned = report.abandoned;

        if let Some(err) = read_error {
            return Err(err);
        }

        let run = collector.finish();
        log_summary(&run.summary);
        Ok(run)
    }
}

/// Coordinator-side merge state
#[derive(Debug, Default)]
struct Collector {
    aggregate: GlobalAggregate,
    summary: RunSummary,
}

impl Collector {
    fn record(&mut self, outcome: BatchOutcome) {
        let BatchOutcome {
            batch_id,
            rows,
            result,
        } = outcome;

        let merged = result.and_then(|local| {
            self.aggregate
                .absorb(&local)
                .map_err(BatchFault::from)
        });

        match merged {
            Ok(()) => self.summary.batches_completed += 1,
            Err(fault) => {
                warn!(
                    batch_id,
                    rows,
                    "[E{:04}] Batch lost: {}",
                    ErrorCode::EXEC_BATCH_FAULT,
                    fault
                );
                self.summary.batches_lost += 1;
                self.summary.rows_lost += rows;
            }
        }
    }

    fn finish(mut self) -> AggregationRun {
        self.summary.rows = self.aggregate.stats();
        self.summary.distinct_keys = self.aggregate.len();
        AggregationRun {
            aggregate: self.aggregate,
            summary: self.summary,
        }
    }
}

fn log_summary(summary: &RunSummary) {
    info!(
        batches = summary.batches_completed,
        rows = summary.rows.aggregated,
        keys = summary.distinct_keys,
        "Aggregation finished"
    );
    if summary.rows.skipped() > 0 {
        info!(
            too_few_fields = summary.rows.too_few_fields,
            empty_field = summary.rows.empty_field,
            invalid_number = summary.rows.invalid_number,
            "Skipped {} malformed row(s)",
            summary.rows.skipped()
        );
    }
    if summary.batches_lost > 0 {
        warn!(
            rows_lost = summary.rows_lost,
            "{} of {} batch(es) lost, report is incomplete",
            summary.batches_lost,
            summary.batches_dispatched
        );
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::io;

    const SAMPLE: &str = "userId,amount\nu1,10.00\nu1,20.00\nu2,5.50\nbad,notanumber\n";

    fn engine(batch_size: usize, workers: usize) -> AggregationEngine {
        AggregationEngine::new(EngineSettings {
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
            workers: NonZeroUsize::new(workers).unwrap(),
            shutdown_timeout: Duration::from_secs(5),
            ..EngineSettings::default()
        })
    }

    #[tokio::test]
    async fn test_end_to_end_with_unit_batches() {
        let run = engine(1, 2)
            .run_reader(SAMPLE.as_bytes(), "sample")
            .await
            .unwrap();

        let u1 = run.aggregate.get("u1").unwrap();
        assert_eq!(u1.sum(), dec!(30.00));
        assert_eq!(u1.count(), 2);
        assert_eq!(run.aggregate.get("u2").unwrap().sum(), dec!(5.50));
        assert!(run.aggregate.get("bad").is_none());

        let summary = run.summary;
        assert_eq!(summary.batches_dispatched, 4);
        assert_eq!(summary.batches_completed, 4);
        assert_eq!(summary.rows.invalid_number, 1);
        assert_eq!(summary.distinct_keys, 2);
        assert!(!summary.is_degraded());
    }

    #[tokio::test]
    async fn test_batch_size_does_not_change_result() {
        let small = engine(1, 3).run_reader(SAMPLE.as_bytes(), "s").await.unwrap();
        let large = engine(2000, 1).run_reader(SAMPLE.as_bytes(), "s").await.unwrap();
        // batch bookkeeping differs, so compare entries only
        let small_entries: Vec<_> = small.aggregate.iter().collect();
        let large_entries: Vec<_> = large.aggregate.iter().collect();
        assert_eq!(small_entries, large_entries);
        assert_eq!(large.summary.batches_dispatched, 1);
    }

    #[tokio::test]
    async fn test_header_only_input_is_an_empty_result() {
        let run = engine(10, 2)
            .run_reader("userId,amount\n".as_bytes(), "header-only")
            .await
            .unwrap();
        assert!(run.aggregate.is_empty());
        assert_eq!(run.summary.batches_dispatched, 0);
        assert!(!run.summary.is_degraded());
    }

    #[tokio::test]
    async fn test_empty_input_is_fatal() {
        let err = engine(10, 2)
            .run_reader("".as_bytes(), "empty.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::EmptyInput { ref source_name } if source_name == "empty.csv"));
    }

    #[tokio::test]
    async fn test_missing_column_is_fatal() {
        let err = engine(10, 2)
            .run_reader("id,value\n1,2\n".as_bytes(), "x")
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_interrupt_stops_dispatch() {
        let run = engine(1, 2)
            .run_reader_until(SAMPLE.as_bytes(), "sample", std::future::ready(()))
            .await
            .unwrap();
        assert!(run.summary.interrupted);
        assert!(run.summary.is_degraded());
        assert_eq!(run.summary.batches_dispatched, 0);
        assert!(run.aggregate.is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_batch_is_lost_not_fatal() {
        let input = format!(
            "userId,amount\nbig,{max}\nbig,{max}\nsmall,1\n",
            max = Decimal::MAX
        );
        let run = engine(1, 2)
            .run_reader(input.as_bytes(), "overflow")
            .await
            .unwrap();

        assert_eq!(run.summary.batches_lost, 1);
        assert_eq!(run.summary.rows_lost, 1);
        assert!(run.summary.is_degraded());
        assert_eq!(run.aggregate.get("big").unwrap().count(), 1);
        assert_eq!(run.aggregate.get("small").unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_sums_past_decimal_precision_are_never_rounded() {
        // exact total is 0.8, but 1e28 + 0.4 needs 30 significant digits
        let input = "userId,amount\n\
                     k,10000000000000000000000000000\n\
                     k,0.4\n\
                     k,-10000000000000000000000000000\n\
                     k,0.4\n";

        for batch_size in [1, 2, 2000] {
            let run = engine(batch_size, 2)
                .run_reader(input.as_bytes(), "precision")
                .await
                .unwrap();

            match run.aggregate.get("k") {
                Some(acc) if !run.summary.is_degraded() => {
                    assert_eq!(acc.sum(), dec!(0.8), "batch size {batch_size}");
                    assert_eq!(acc.count(), 4);
                }
                _ => assert!(run.summary.batches_lost >= 1, "batch size {batch_size}"),
            }
        }

        let whole = engine(2000, 1)
            .run_reader(input.as_bytes(), "precision")
            .await
            .unwrap();
        assert_eq!(whole.summary.batches_lost, 1);
        assert_eq!(whole.summary.rows_lost, 4);
        assert!(whole.aggregate.get("k").is_none());
    }

    #[tokio::test]
    async fn test_read_error_is_fatal_after_shutdown() {
        let mock = tokio_test::io::Builder::new()
            .read(b"userId,amount\nu1,1\n")
            .read_error(io::Error::new(io::ErrorKind::Other, "disk gone"))
            .build();
        let reader = tokio::io::BufReader::new(mock);

        let err = engine(1, 1).run_reader(reader, "flaky").await.unwrap_err();
        match err {
            AggregateError::InputRead { line, source } => {
                assert_eq!(line, 2);
                assert_eq!(source.to_string(), "disk gone");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_custom_columns_and_delimiter() {
        let settings = EngineSettings {
            delimiter: ';',
            columns: ColumnNames {
                key: "account".to_string(),
                value: "total".to_string(),
            },
            ..EngineSettings::default()
        };
        let run = AggregationEngine::new(settings)
            .run_reader("TOTAL;Account\n1.5;a\n2.5;a\n".as_bytes(), "semi")
            .await
            .unwrap();
        assert_eq!(run.aggregate.get("a").unwrap().sum(), dec!(4.0));
    }
}
