//! Record parsing
//!
//! Turns one raw delimited line into a `(key, value)` pair or a skip reason.
//! Skips are per-row conditions and never fail the batch.

use super::header::ColumnLayout;
use rust_decimal::Decimal;
use thiserror::Error;

/// A successfully parsed record, borrowing its key from the raw line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRecord<'a> {
    pub key: &'a str,
    pub value: Decimal,
}

/// Why a row was left out of the aggregate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("row has {fields} field(s), {required} required")]
    TooFewFields { fields: usize, required: usize },

    #[error("key field is empty")]
    EmptyKey,

    #[error("value field is empty")]
    EmptyValue,

    #[error("invalid numeric value: {text}")]
    InvalidNumber { text: String },
}

impl SkipReason {
    pub fn kind(&self) -> SkipKind {
        match self {
            Self::TooFewFields { .. } => SkipKind::TooFewFields,
            Self::EmptyKey | Self::EmptyValue => SkipKind::EmptyField,
            Self::InvalidNumber { .. } => SkipKind::InvalidNumber,
        }
    }
}

/// Coarse skip categories used for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipKind {
    TooFewFields,
    EmptyField,
    InvalidNumber,
}

/// Parse one record against the resolved column layout
pub fn parse_record<'a>(
    line: &'a str,
    layout: &ColumnLayout,
    delimiter: char,
) -> Result<ParsedRecord<'a>, SkipReason> {
    let required = layout.required_fields();
    let mut key = None;
    let mut value = None;
    let mut fields = 0;

    for (index, field) in line.split(delimiter).take(required).enumerate() {
        fields = index + 1;
        if index == layout.key_index {
            key = Some(field);
        }
        if index == layout.value_index {
            value = Some(field);
        }
    }

    let (Some(key), Some(value)) = (key, value) else {
        return Err(SkipReason::TooFewFields { fields, required });
    };

    let key = key.trim();
    let value = value.trim();
    if key.is_empty() {
        return Err(SkipReason::EmptyKey);
    }
    if value.is_empty() {
        return Err(SkipReason::EmptyValue);
    }

    let value = parse_decimal(value).ok_or_else(|| SkipReason::InvalidNumber {
        text: value.to_string(),
    })?;

    Ok(ParsedRecord { key, value })
}

/// Parse an exact decimal literal
///
/// Accepts an optional sign, digits with an optional fraction, and an
/// optional exponent. Values that need more than 28 significant digits are
/// rejected instead of rounded.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let well_formed = text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !well_formed || !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    if text.contains(['e', 'E']) {
        Decimal::from_scientific(&text.to_ascii_lowercase()).ok()
    } else {
        Decimal::from_str_exact(text).ok()
    }
}
