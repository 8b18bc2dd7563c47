//! Table: a date axis with named `f64` columns.
//!
//! Missing observations are stored as NaN. Macro fields and asset prices
//! both arrive from external collaborators in this shape.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::series::{check_increasing, SeriesError, TimeSeries};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl Table {
    /// Build a table, checking date order and that every column spans the axis.
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, SeriesError> {
        check_increasing(&dates)?;
        for (name, values) in &columns {
            if values.len() != dates.len() {
                return Err(SeriesError::ColumnLength {
                    column: name.clone(),
                    len: values.len(),
                    expected: dates.len(),
                });
            }
        }
        Ok(Self { dates, columns })
    }

    /// Build a table from rows of `(date, [(column, value)])`.
    ///
    /// Rows may be given in any order but dates must be unique. A column
    /// absent from a row is NaN on that date.
    pub fn from_rows<I, R, S>(rows: I) -> Result<Self, SeriesError>
    where
        I: IntoIterator<Item = (NaiveDate, R)>,
        R: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut by_date: BTreeMap<NaiveDate, Vec<(String, f64)>> = BTreeMap::new();
        let mut names = std::collections::BTreeSet::new();
        for (date, row) in rows {
            let cells: Vec<(String, f64)> = row.into_iter().map(|(k, v)| (k.into(), v)).collect();
            for (name, _) in &cells {
                names.insert(name.clone());
            }
            if by_date.insert(date, cells).is_some() {
                return Err(SeriesError::DuplicateDate(date));
            }
        }

        let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
        let mut columns: BTreeMap<String, Vec<f64>> = names
            .into_iter()
            .map(|n| (n, vec![f64::NAN; dates.len()]))
            .collect();
        for (i, cells) in by_date.into_values().enumerate() {
            for (name, value) in cells {
                if let Some(col) = columns.get_mut(&name) {
                    col[i] = value;
                }
            }
        }
        Self::new(dates, columns)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Row index of `date`, if the table has it.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    /// A column as a time series (NaN entries preserved).
    pub fn series(&self, name: &str) -> Option<TimeSeries<f64>> {
        let values = self.columns.get(name)?.clone();
        TimeSeries::new(self.dates.clone(), values).ok()
    }

    /// Finite value of `name` at row `index`; `None` for missing or NaN.
    pub fn value(&self, index: usize, name: &str) -> Option<f64> {
        self.columns
            .get(name)
            .and_then(|col| col.get(index))
            .copied()
            .filter(|v| !v.is_nan())
    }

    /// Add or replace a column.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, SeriesError> {
        let name = name.into();
        if values.len() != self.dates.len() {
            return Err(SeriesError::ColumnLength {
                column: name,
                len: values.len(),
                expected: self.dates.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(self)
    }

    /// Rows whose date falls inside `[start, end]` (either bound optional).
    pub fn restrict(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Table {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| start.map_or(true, |s| **d >= s) && end.map_or(true, |e| **d <= e))
            .map(|(i, _)| i)
            .collect();
        let dates = keep.iter().map(|&i| self.dates[i]).collect();
        let columns = self
            .columns
            .iter()
            .map(|(name, col)| (name.clone(), keep.iter().map(|&i| col[i]).collect()))
            .collect();
        Table { dates, columns }
    }
}
