//! Alignment of macro fields onto the asset trading calendar.
//!
//! The price table defines the trading-day calendar. Macro fields are
//! forward-filled onto it, since releases arrive at lower frequency than
//! trading days. Prices are never filled: a missing price stays NaN and
//! surfaces as a data gap when the simulator needs it.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::table::Table;

/// Macro fields and prices on a shared trading-day calendar.
#[derive(Debug, Clone)]
pub struct AlignedInputs {
    /// The common date axis (sorted ascending).
    pub dates: Vec<NaiveDate>,
    /// Macro fields, forward-filled onto `dates`.
    pub macro_data: Table,
    /// Asset prices on `dates`, NaN where missing.
    pub prices: Table,
}

impl AlignedInputs {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Align a macro table onto the price table's calendar.
///
/// Macro observations dated before `start` still seed the forward fill, so
/// a range restriction never opens with an artificial gap.
pub fn align_inputs(
    macro_data: &Table,
    prices: &Table,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> AlignedInputs {
    let calendar = prices.dates();
    let mut filled: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for name in macro_data.column_names() {
        let source = macro_data.column(name).unwrap_or(&[]);
        filled.insert(
            name.to_string(),
            forward_fill_onto(macro_data.dates(), source, calendar),
        );
    }

    // The calendar is strictly increasing and every filled column spans it.
    let macro_on_calendar = Table::new(calendar.to_vec(), filled).unwrap_or_default();

    let macro_cut = macro_on_calendar.restrict(start, end);
    let prices_cut = prices.restrict(start, end);

    AlignedInputs {
        dates: prices_cut.dates().to_vec(),
        macro_data: macro_cut,
        prices: prices_cut,
    }
}

/// For each calendar date, the last non-NaN source value dated on or before it.
fn forward_fill_onto(source_dates: &[NaiveDate], values: &[f64], calendar: &[NaiveDate]) -> Vec<f64> {
    let mut out = Vec::with_capacity(calendar.len());
    let mut cursor = 0;
    let mut last = f64::NAN;

    for date in calendar {
        while cursor < source_dates.len() && source_dates[cursor] <= *date {
            let v = values[cursor];
            if !v.is_nan() {
                last = v;
            }
            cursor += 1;
        }
        out.push(last);
    }
    out
}
