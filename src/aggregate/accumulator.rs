//! Per-key accumulator and its merge operation
//!
//! `KeyAccumulator` holds the running (sum, count) state for one key. The
//! `combine` operation is associative and commutative, so partial results
//! from any batch partition can be merged in any order.

use rust_decimal::Decimal;
use thiserror::Error;

/// Decimal arithmetic left the representable range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decimal overflow while accumulating key '{key}'")]
pub struct OverflowError {
    pub key: String,
}

/// Aggregate state for a single key
///
/// Invariant: `count >= 1`. There is no empty accumulator; one only comes
/// into existence with its first value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyAccumulator {
    sum: Decimal,
    count: u64,
}

impl KeyAccumulator {
    /// Start an accumulator from its first value
    pub fn new(value: Decimal) -> Self {
        Self {
            sum: value,
            count: 1,
        }
    }

    pub fn sum(&self) -> Decimal {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Fold one more value in
    ///
    /// `None` leaves the accumulator unchanged.
    pub fn add(&mut self, value: Decimal) -> Option<()> {
        self.sum = exact_add(self.sum, value)?;
        self.count += 1;
        Some(())
    }

    /// `{a.sum + b.sum, a.count + b.count}`; `None` when the sum cannot be
    /// represented exactly
    pub fn combine(self, other: Self) -> Option<Self> {
        Some(Self {
            sum: exact_add(self.sum, other.sum)?,
            count: self.count.saturating_add(other.count),
        })
    }

    /// `sum / count`, exact up to the decimal type's 28 significant digits
    pub fn mean(&self) -> Decimal {
        // count >= 1 and |sum / count| <= |sum|, so this cannot fail
        self.sum / Decimal::from(self.count)
    }
}

/// `a + b` without rounding
///
/// `checked_add` only fails past `Decimal::MAX`; below that it drops
/// fractional digits to fit the 96-bit mantissa. The exact sum needs at least
/// the larger normalized scale of its operands, so a result carrying fewer
/// digits was rounded. A sum whose low digits cancel exactly at that size is
/// rejected as well.
fn exact_add(a: Decimal, b: Decimal) -> Option<Decimal> {
    let sum = a.checked_add(b)?;
    let needed = a.normalize().scale().max(b.normalize().scale());
    (sum.scale() >= needed).then_some(sum)
}
