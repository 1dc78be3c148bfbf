use clap::Parser;
use csvagg::aggregate::{AggregationEngine, FormatType};
use csvagg::app::{handle_fatal_error, init_logging, AppConfig};
use csvagg::config::{ConfigLoader, ConfigOverrides, ValidatedConfig};
use csvagg::error::{AggregateError, DEGRADED_EXIT_CODE};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Aggregate per-key sums and averages over a delimited file
#[derive(Parser, Debug)]
#[command(name = "csvagg", version)]
#[command(about = "Parallel per-key sum and average over large delimited files", long_about = None)]
struct Cli {
    /// Input file; the first line is the header
    input: PathBuf,

    /// Records per batch (same as --batch-size)
    #[arg(value_name = "BATCH_SIZE", allow_negative_numbers = true)]
    batch_size_arg: Option<i64>,

    /// Records per batch [default: 2000]
    #[arg(
        short,
        long,
        value_name = "N",
        allow_negative_numbers = true,
        conflicts_with = "batch_size_arg"
    )]
    batch_size: Option<i64>,

    /// Number of concurrent workers [default: available CPUs]
    #[arg(short, long, value_name = "N", allow_negative_numbers = true)]
    workers: Option<i64>,

    /// Name of the grouping column [default: userId]
    #[arg(long, value_name = "NAME")]
    key_column: Option<String>,

    /// Name of the numeric column [default: amount]
    #[arg(long, value_name = "NAME")]
    value_column: Option<String>,

    /// Field delimiter, a single character or "\t" [default: ,]
    #[arg(short, long, value_name = "CHAR")]
    delimiter: Option<String>,

    /// Report format
    #[arg(short, long, value_enum)]
    format: Option<FormatType>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seconds to wait at each shutdown stage [default: 60]
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    shutdown_timeout: Option<i64>,

    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            batch_size: self.batch_size.or(self.batch_size_arg),
            workers: self.workers,
            delimiter: self.delimiter.clone(),
            key_column: self.key_column.clone(),
            value_column: self.value_column.clone(),
            format: self.format,
            shutdown_timeout_secs: self.shutdown_timeout,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let app = AppConfig::new(cli.verbose);
    init_logging(&app);

    // Exiting here skips waiting on reductions abandoned by a forced shutdown
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => handle_fatal_error(e, app.verbose),
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = ConfigLoader::new(cli.config.clone()).load().await?;
    config.merge_env_vars()?;
    config.apply_overrides(&cli.overrides());
    let ValidatedConfig { engine, report } = config.validate()?;
    debug!(?engine, "Validated settings");

    let run = AggregationEngine::new(engine).run_file(&cli.input).await?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    report
        .render(&run.aggregate, &mut out)
        .map_err(AggregateError::Output)?;

    if run.summary.is_degraded() {
        warn!(
            lost = run.summary.batches_lost,
            interrupted = run.summary.interrupted,
            "Report is incomplete"
        );
        return Ok(DEGRADED_EXIT_CODE);
    }
    Ok(0)
}
