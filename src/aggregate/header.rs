//! Header resolution
//!
//! Locates the key and value columns in the header line by trimmed,
//! case-insensitive name match.

use crate::error::{AggregateError, Result};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Configured names of the two required columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub key: String,
    pub value: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            key: "userId".to_string(),
            value: "amount".to_string(),
        }
    }
}

/// Resolved zero-based positions of the required columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub key_index: usize,
    pub value_index: usize,
}

impl ColumnLayout {
    /// Resolve both required columns from a raw header line
    ///
    /// Fails with `MissingColumn` listing every column that was not found.
    pub fn resolve(header_line: &str, names: &ColumnNames, delimiter: char) -> Result<Self> {
        let header = header_line.trim_start_matches(BYTE_ORDER_MARK);
        let fields: Vec<&str> = header.split(delimiter).collect();

        let key_index = resolve_column(&fields, &names.key);
        let value_index = resolve_column(&fields, &names.value);

        match (key_index, value_index) {
            (Some(key_index), Some(value_index)) => Ok(Self {
                key_index,
                value_index,
            }),
            _ => {
                let missing = [(key_index, &names.key), (value_index, &names.value)]
                    .into_iter()
                    .filter(|(index, _)| index.is_none())
                    .map(|(_, name)| name.clone())
                    .collect();
                Err(AggregateError::MissingColumn {
                    missing,
                    header: header.to_string(),
                })
            }
        }
    }

    /// Number of fields a record needs before both columns can be read
    pub fn required_fields(&self) -> usize {
        self.key_index.max(self.value_index) + 1
    }
}

/// Position of the first field equal to `name`, ignoring case and surrounding whitespace
pub fn resolve_column(fields: &[&str], name: &str) -> Option<usize> {
    let wanted = name.trim().to_lowercase();
    fields
        .iter()
        .position(|field| field.trim().to_lowercase() == wanted)
}
