//! # csvagg
//!
//! Per-key sums and averages over large delimited files, computed by
//! reducing fixed-size batches concurrently and merging the partial results.
//!
//! ## Usage
//!
//! ```bash
//! csvagg data.csv [BATCH_SIZE] [--workers N] [--format csv|json]
//! ```
//!
//! ## Modules
//!
//! - `aggregate` - Batching, concurrent reduction, merge and report formatting
//! - `app` - Logging setup and fatal error reporting for the binary
//! - `config` - Layered configuration (defaults, TOML, environment, flags)
//! - `error` - Fatal error kinds with stable codes and exit statuses
//! - `input` - Buffered access to the input file
//!
//! ## Example
//!
//! ```no_run
//! use csvagg::aggregate::{AggregationEngine, ReportFormatter};
//! use std::path::Path;
//!
//! # async fn example() -> csvagg::error::Result<()> {
//! let run = AggregationEngine::default().run_file(Path::new("data.csv")).await?;
//! let report = ReportFormatter::default()
//!     .render_to_string(&run.aggregate)
//!     .map_err(csvagg::error::AggregateError::Output)?;
//! print!("{report}");
//! # Ok(())
//! # }
//! ```
pub mod aggregate;
pub mod app;
pub mod config;
pub mod error;
pub mod input;
