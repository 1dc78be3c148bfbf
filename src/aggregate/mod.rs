//! Parallel batch aggregation
//!
//! Data flows one way through this module:
//!
//! ```text
//! lines -> Batcher -> WorkerPool { RecordReducer x N } -> LocalAggregate
//!       -> GlobalAggregate::absorb -> ReportFormatter
//! ```
//!
//! Each stage owns its data outright. Batches move into the pool, local
//! aggregates move back out, and only the coordinating task touches the
//! global aggregate.

pub mod accumulator;
pub mod batch;
pub mod engine;
pub mod header;
pub mod merge;
pub mod pool;
pub mod record;
pub mod reducer;
pub mod report;

pub use accumulator::{KeyAccumulator, OverflowError};
pub use batch::{batches, Batch, Batcher};
pub use engine::{AggregationEngine, AggregationRun, EngineSettings, RunSummary};
pub use header::{resolve_column, ColumnLayout, ColumnNames};
pub use merge::GlobalAggregate;
pub use pool::{BatchFault, BatchOutcome, BatchReduce, CancelSignal, ShutdownReport, WorkerPool};
pub use record::{parse_record, ParsedRecord, SkipKind, SkipReason};
pub use reducer::{LocalAggregate, RecordReducer, RowStats};
pub use report::{FormatType, ReportFormatter, ReportHeader};
