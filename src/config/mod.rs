//! Run configuration
//!
//! Settings are layered, lowest precedence first: built-in defaults, a TOML
//! file, `CSVAGG_*` environment variables, then command-line flags. The
//! layered result is only trusted after `validate`.

use crate::aggregate::engine::{EngineSettings, DEFAULT_BATCH_SIZE, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::aggregate::header::ColumnNames;
use crate::aggregate::pool::default_workers;
use crate::aggregate::report::{FormatType, ReportFormatter, ReportHeader};
use crate::error::{AggregateError, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

pub mod loader;

pub use loader::{user_config_dir, ConfigLoader, CONFIG_FILE_NAME};

/// Raw, unvalidated configuration
///
/// Numeric fields are signed so that a zero or negative value reaches
/// validation and is reported as such instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregatorConfig {
    pub batch_size: i64,
    /// Defaults to host parallelism
    pub workers: Option<i64>,
    pub delimiter: String,
    pub shutdown_timeout_secs: i64,
    pub columns: ColumnsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnsConfig {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: FormatType,
    /// Defaults to the key column name
    pub key_label: Option<String>,
    pub sum_label: String,
    pub average_label: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE as i64,
            workers: None,
            delimiter: ",".to_string(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT.as_secs() as i64,
            columns: ColumnsConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        let names = ColumnNames::default();
        Self {
            key: names.key,
            value: names.value,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        let header = ReportHeader::default();
        Self {
            format: FormatType::default(),
            key_label: None,
            sum_label: header.sum,
            average_label: header.average,
        }
    }
}

/// Highest-precedence layer, usually from command-line flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub batch_size: Option<i64>,
    pub workers: Option<i64>,
    pub delimiter: Option<String>,
    pub key_column: Option<String>,
    pub value_column: Option<String>,
    pub format: Option<FormatType>,
    pub shutdown_timeout_secs: Option<i64>,
}

/// Everything a run needs, checked
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub engine: EngineSettings,
    pub report: ReportFormatter,
}

impl AggregatorConfig {
    /// Apply `CSVAGG_*` variables from the process environment
    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|name| std::env::var(name).ok())
    }

    /// Apply `CSVAGG_*` variables from an arbitrary lookup
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CSVAGG_BATCH_SIZE") {
            self.batch_size = parse_env_int("CSVAGG_BATCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("CSVAGG_WORKERS") {
            self.workers = Some(parse_env_int("CSVAGG_WORKERS", &value)?);
        }
        if let Some(value) = lookup("CSVAGG_SHUTDOWN_TIMEOUT_SECS") {
            self.shutdown_timeout_secs = parse_env_int("CSVAGG_SHUTDOWN_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("CSVAGG_DELIMITER") {
            self.delimiter = value;
        }
        if let Some(value) = lookup("CSVAGG_KEY_COLUMN") {
            self.columns.key = value;
        }
        if let Some(value) = lookup("CSVAGG_VALUE_COLUMN") {
            self.columns.value = value;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(workers) = overrides.workers {
            self.workers = Some(workers);
        }
        if let Some(secs) = overrides.shutdown_timeout_secs {
            self.shutdown_timeout_secs = secs;
        }
        if let Some(delimiter) = &overrides.delimiter {
            self.delimiter = delimiter.clone();
        }
        if let Some(key) = &overrides.key_column {
            self.columns.key = key.clone();
        }
        if let Some(value) = &overrides.value_column {
            self.columns.value = value.clone();
        }
        if let Some(format) = overrides.format {
            self.output.format = format;
        }
    }

    pub fn validate(&self) -> Result<ValidatedConfig> {
        let batch_size = positive("batch_size", self.batch_size)?;
        let workers = match self.workers {
            Some(workers) => positive("workers", workers)?,
            None => NonZeroUsize::new(default_workers()).unwrap_or(NonZeroUsize::MIN),
        };
        let shutdown_timeout =
            Duration::from_secs(positive("shutdown_timeout_secs", self.shutdown_timeout_secs)?.get() as u64);
        let delimiter = parse_delimiter(&self.delimiter)?;

        let key = column_name("columns.key", &self.columns.key, delimiter)?;
        let value = column_name("columns.value", &self.columns.value, delimiter)?;
        if key.to_lowercase() == value.to_lowercase() {
            return Err(AggregateError::configuration(
                "columns",
                format!("key and value columns must differ, both are '{key}'"),
            ));
        }

        let header = ReportHeader {
            key: self.output.key_label.clone().unwrap_or_else(|| key.clone()),
            sum: self.output.sum_label.clone(),
            average: self.output.average_label.clone(),
        };

        Ok(ValidatedConfig {
            engine: EngineSettings {
                batch_size,
                workers,
                delimiter,
                columns: ColumnNames { key, value },
                shutdown_timeout,
            },
            report: ReportFormatter::new(self.output.format, header),
        })
    }
}

fn parse_env_int(name: &str, value: &str) -> Result<i64> {
    value.trim().parse().map_err(|_| {
        AggregateError::configuration(name, format!("must be an integer, got '{value}'"))
    })
}

fn positive(field: &str, value: i64) -> Result<NonZeroUsize> {
    usize::try_from(value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            AggregateError::configuration(field, format!("must be a positive integer, got {value}"))
        })
}

fn parse_delimiter(raw: &str) -> Result<char> {
    let delimiter = match raw {
        "\\t" | "tab" => '\t',
        _ => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(AggregateError::configuration(
                        "delimiter",
                        format!("must be a single character, got '{raw}'"),
                    ))
                }
            }
        }
    };

    if matches!(delimiter, '\n' | '\r') {
        return Err(AggregateError::configuration(
            "delimiter",
            "cannot be a line break",
        ));
    }
    Ok(delimiter)
}

fn column_name(field: &str, raw: &str, delimiter: char) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AggregateError::configuration(field, "cannot be empty"));
    }
    if name.contains(delimiter) {
        return Err(AggregateError::configuration(
            field,
            format!("'{name}' contains the delimiter"),
        ));
    }
    Ok(name.to_string())
}
