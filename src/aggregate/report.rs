//! Report formatting
//!
//! Renders the global aggregate as one line per key in ascending key order.
//! Decimal values are rounded half away from zero: sums straight to two
//! fractional digits, averages to six digits first and then to two.

use super::accumulator::KeyAccumulator;
use super::merge::GlobalAggregate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

const AVERAGE_SCALE: u32 = 6;
const OUTPUT_SCALE: u32 = 2;

/// Output format for the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    /// Delimited text with a header line
    #[default]
    Csv,
    /// JSON array of key objects
    Json,
}

/// Column labels for the CSV header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub key: String,
    pub sum: String,
    pub average: String,
}

impl ReportHeader {
    /// Default labels, naming the key column after the input's key column
    pub fn for_key_column(key_column: &str) -> Self {
        Self {
            key: key_column.to_string(),
            sum: "sum".to_string(),
            average: "avg".to_string(),
        }
    }
}

impl Default for ReportHeader {
    fn default() -> Self {
        Self::for_key_column("userId")
    }
}

/// One rendered output row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow<'a> {
    pub key: &'a str,
    pub sum: String,
    pub average: String,
    pub count: u64,
}

impl<'a> ReportRow<'a> {
    pub fn new(key: &'a str, acc: &KeyAccumulator) -> Self {
        Self {
            key,
            sum: format_sum(acc.sum()),
            average: format_average(acc),
            count: acc.count(),
        }
    }
}

/// Writes a `GlobalAggregate` in the configured format
#[derive(Debug, Clone, Default)]
pub struct ReportFormatter {
    format: FormatType,
    header: ReportHeader,
}

impl ReportFormatter {
    pub fn new(format: FormatType, header: ReportHeader) -> Self {
        Self { format, header }
    }

    pub fn format(&self) -> FormatType {
        self.format
    }

    /// Render the whole report to `out`
    pub fn render<W: Write>(&self, global: &GlobalAggregate, out: &mut W) -> io::Result<()> {
        match self.format {
            FormatType::Csv => self.render_csv(global, out),
            FormatType::Json => self.render_json(global, out),
        }?;
        out.flush()
    }

    /// Render to an in-memory string
    pub fn render_to_string(&self, global: &GlobalAggregate) -> io::Result<String> {
        let mut buf = Vec::new();
        self.render(global, &mut buf)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn render_csv<W: Write>(&self, global: &GlobalAggregate, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{},{},{}",
            self.header.key, self.header.sum, self.header.average
        )?;
        for (key, acc) in global {
            let row = ReportRow::new(key, acc);
            writeln!(out, "{},{},{}", row.key, row.sum, row.average)?;
        }
        Ok(())
    }

    fn render_json<W: Write>(&self, global: &GlobalAggregate, out: &mut W) -> io::Result<()> {
        let rows: Vec<ReportRow<'_>> = global
            .iter()
            .map(|(key, acc)| ReportRow::new(key, acc))
            .collect();
        serde_json::to_writer_pretty(&mut *out, &rows)?;
        writeln!(out)
    }
}

/// Round half away from zero to `scale` digits, padding with zeros
///
/// Past roughly 7.9e26 the mantissa has no room left for the padding, so the
/// result may carry fewer than `scale` digits. Use `format_fixed` for text.
pub fn round_half_up(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded
}

/// Mean of an accumulator at six fractional digits
pub fn average(acc: &KeyAccumulator) -> Decimal {
    round_half_up(acc.mean(), AVERAGE_SCALE)
}

/// Render rounded half-up with exactly `scale` fractional digits
pub fn format_fixed(value: Decimal, scale: u32) -> String {
    let rounded = round_half_up(value, scale);
    let mut text = rounded.to_string();
    let missing = scale.saturating_sub(rounded.scale());
    if missing > 0 {
        if rounded.scale() == 0 {
            text.push('.');
        }
        text.push_str(&"0".repeat(missing as usize));
    }
    text
}

fn format_sum(sum: Decimal) -> String {
    format_fixed(sum, OUTPUT_SCALE)
}

fn format_average(acc: &KeyAccumulator) -> String {
    format_fixed(average(acc), OUTPUT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::reducer::LocalAggregate;
    use rust_decimal_macros::dec;

    fn global(rows: &[(&str, Decimal)]) -> GlobalAggregate {
        let mut local = LocalAggregate::new(0);
        for (key, value) in rows {
            local.insert(key, *value).unwrap();
        }
        let mut global = GlobalAggregate::new();
        global.absorb(&local).unwrap();
        global
    }

    #[test]
    fn test_csv_report() {
        let global = global(&[
            ("u2", dec!(5.50)),
            ("u1", dec!(10.00)),
            ("u1", dec!(20.00)),
        ]);
        let out = ReportFormatter::default().render_to_string(&global).unwrap();

        insta::assert_snapshot!(out.trim_end(), @r"
        userId,sum,avg
        u1,30.00,15.00
        u2,5.50,5.50
        ");
    }

    #[test]
    fn test_empty_aggregate_renders_header_only() {
        let out = ReportFormatter::default()
            .render_to_string(&GlobalAggregate::new())
            .unwrap();
        assert_eq!(out, "userId,sum,avg\n");
    }

    #[test]
    fn test_custom_labels() {
        let header = ReportHeader {
            key: "account".to_string(),
            sum: "total".to_string(),
            average: "mean".to_string(),
        };
        let out = ReportFormatter::new(FormatType::Csv, header)
            .render_to_string(&global(&[("a", dec!(1))]))
            .unwrap();
        assert_eq!(out, "account,total,mean\na,1.00,1.00\n");
    }

    #[test]
    fn test_average_midpoint_rounds_up() {
        // 1.00 + 1.01 = 2.01, mean exactly 1.005
        let global = global(&[("k", dec!(1.00)), ("k", dec!(1.01))]);
        let row = ReportRow::new("k", global.get("k").unwrap());
        assert_eq!(row.sum, "2.01");
        assert_eq!(row.average, "1.01");
    }

    #[test]
    fn test_average_rounds_to_six_digits_first() {
        // 1/3 at six digits is 0.333333, which renders as 0.33
        let global = global(&[("k", dec!(1)), ("k", dec!(0)), ("k", dec!(0))]);
        let acc = global.get("k").unwrap();
        assert_eq!(average(acc), dec!(0.333333));
        assert_eq!(ReportRow::new("k", acc).average, "0.33");
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(dec!(2.345), 2).to_string(), "2.35");
        assert_eq!(round_half_up(dec!(-2.345), 2).to_string(), "-2.35");
        assert_eq!(round_half_up(dec!(7), 2).to_string(), "7.00");
        assert_eq!(round_half_up(dec!(1000), 2).to_string(), "1000.00");
        assert_eq!(round_half_up(dec!(-0.001), 2).to_string(), "0.00");
    }

    #[test]
    fn test_format_fixed_pads_values_without_room_for_scale() {
        let big = Decimal::from_i128_with_scale(10_i128.pow(28), 0);
        assert_eq!(
            format_fixed(big, 2),
            "10000000000000000000000000000.00"
        );
        assert_eq!(
            format_fixed(-big, 2),
            "-10000000000000000000000000000.00"
        );
        // one fractional digit fits, the second does not
        let tenths = Decimal::from_i128_with_scale(10_i128.pow(28) + 5, 1);
        assert_eq!(format_fixed(tenths, 2), "1000000000000000000000000000.50");
        assert_eq!(format_fixed(dec!(2.345), 2), "2.35");
        assert_eq!(format_fixed(dec!(-0.001), 2), "0.00");
    }

    #[test]
    fn test_csv_report_at_precision_limit() {
        let big = Decimal::from_i128_with_scale(10_i128.pow(28), 0);
        let out = ReportFormatter::default()
            .render_to_string(&global(&[("k", big)]))
            .unwrap();
        assert_eq!(
            out,
            "userId,sum,avg\nk,10000000000000000000000000000.00,10000000000000000000000000000.00\n"
        );
    }

    #[test]
    fn test_json_report() {
        let global = global(&[("u1", dec!(10)), ("u1", dec!(20)), ("u2", dec!(5.5))]);
        let out = ReportFormatter::new(FormatType::Json, ReportHeader::default())
            .render_to_string(&global)
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([
                { "key": "u1", "sum": "30.00", "average": "15.00", "count": 2 },
                { "key": "u2", "sum": "5.50", "average": "5.50", "count": 1 }
            ])
        );
    }
}
