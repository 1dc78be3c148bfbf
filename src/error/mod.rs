use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// Exit code used when the report was written but some input was lost
pub const DEGRADED_EXIT_CODE: i32 = 7;

/// Fatal errors for an aggregation run
///
/// Everything here aborts the run. Per-row and per-batch problems are
/// recoverable and live with their scope (`SkipReason`, `BatchFault`).
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("[E{code:04}] Configuration error: {field}: {reason}", code = ErrorCode::CONFIG_INVALID_VALUE)]
    Configuration { field: String, reason: String },

    #[error("[E{code:04}] Failed to load configuration from {}", .path.display(), code = ErrorCode::CONFIG_NOT_READABLE)]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[E{code:04}] Invalid configuration file {}", .path.display(), code = ErrorCode::CONFIG_PARSE_ERROR)]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(
        "[E{code:04}] Missing required column(s) {}",
        .missing.iter().map(|c| format!("'{c}'")).collect::<Vec<_>>().join(" and "),
        code = ErrorCode::INPUT_MISSING_COLUMN
    )]
    MissingColumn {
        missing: Vec<String>,
        header: String,
    },

    #[error("[E{code:04}] Empty input: {source_name} has no header line", code = ErrorCode::INPUT_EMPTY)]
    EmptyInput { source_name: String },

    #[error("[E{code:04}] Failed to open input {}", .path.display(), code = ErrorCode::INPUT_OPEN_FAILED)]
    InputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[E{code:04}] Failed to read input after line {line}", code = ErrorCode::INPUT_READ_FAILED)]
    InputRead {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("[E{code:04}] Failed to write report", code = ErrorCode::OUTPUT_WRITE_FAILED)]
    Output(#[source] std::io::Error),
}

impl AggregateError {
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Configuration { .. } => ErrorCode::CONFIG_INVALID_VALUE,
            Self::ConfigLoad { .. } => ErrorCode::CONFIG_NOT_READABLE,
            Self::ConfigParse { .. } => ErrorCode::CONFIG_PARSE_ERROR,
            Self::MissingColumn { .. } => ErrorCode::INPUT_MISSING_COLUMN,
            Self::EmptyInput { .. } => ErrorCode::INPUT_EMPTY,
            Self::InputOpen { .. } => ErrorCode::INPUT_OPEN_FAILED,
            Self::InputRead { .. } => ErrorCode::INPUT_READ_FAILED,
            Self::Output(_) => ErrorCode::OUTPUT_WRITE_FAILED,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } | Self::ConfigLoad { .. } | Self::ConfigParse { .. } => 2,
            Self::MissingColumn { .. } => 3,
            Self::EmptyInput { .. } => 4,
            Self::InputOpen { .. } | Self::InputRead { .. } => 5,
            Self::Output(_) => 6,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration { field, reason } => {
                format!("Configuration problem: {field} {reason}")
            }
            Self::ConfigLoad { path, source } => {
                format!("Could not load config file {}: {source}", path.display())
            }
            Self::ConfigParse { path, source } => {
                format!("Config file {} is invalid: {source}", path.display())
            }
            Self::MissingColumn { missing, header } => format!(
                "Missing required columns {} (header was: {header})",
                missing
                    .iter()
                    .map(|c| format!("'{c}'"))
                    .collect::<Vec<_>>()
                    .join(" or ")
            ),
            Self::EmptyInput { source_name } => format!("Empty file: {source_name}"),
            Self::InputOpen { path, source } => {
                format!("Cannot open {}: {source}", path.display())
            }
            Self::InputRead { line, source } => {
                format!("Read failed after line {line}: {source}")
            }
            Self::Output(source) => format!("Cannot write report: {source}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregateError>;
