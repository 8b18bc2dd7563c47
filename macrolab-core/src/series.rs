//! Date-indexed series with strictly increasing dates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a series or table violates its ordering contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("length mismatch: {dates} dates but {values} values")]
    LengthMismatch { dates: usize, values: usize },

    #[error("dates not strictly increasing at index {index} ({prev} then {next})")]
    NotIncreasing {
        index: usize,
        prev: NaiveDate,
        next: NaiveDate,
    },

    #[error("duplicate date {0}")]
    DuplicateDate(NaiveDate),

    #[error("column '{column}' has {len} values but the date axis has {expected}")]
    ColumnLength {
        column: String,
        len: usize,
        expected: usize,
    },
}

/// An ordered sequence of `(date, value)` pairs.
///
/// Dates are strictly increasing, so there are no duplicates. Once built the
/// series is never mutated; transformations produce a new series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries<T> {
    dates: Vec<NaiveDate>,
    values: Vec<T>,
}

impl<T> TimeSeries<T> {
    /// Build a series, rejecting unequal lengths and unordered dates.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<T>) -> Result<Self, SeriesError> {
        if dates.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                dates: dates.len(),
                values: values.len(),
            });
        }
        check_increasing(&dates)?;
        Ok(Self { dates, values })
    }

    pub fn from_pairs(pairs: Vec<(NaiveDate, T)>) -> Result<Self, SeriesError> {
        let (dates, values) = pairs.into_iter().unzip();
        Self::new(dates, values)
    }

    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Position of `date` in the series, if present.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Value on `date`, if the series has an entry for it.
    pub fn get(&self, date: NaiveDate) -> Option<&T> {
        self.index_of(date).map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &T)> + '_ {
        self.dates.iter().copied().zip(self.values.iter())
    }

    /// Apply `f` to every value, keeping the date axis.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> TimeSeries<U> {
        TimeSeries {
            dates: self.dates.clone(),
            values: self.values.iter().map(f).collect(),
        }
    }

    /// Same date axis, new values of equal length.
    pub(crate) fn map_values<U>(&self, values: Vec<U>) -> TimeSeries<U> {
        debug_assert_eq!(values.len(), self.dates.len());
        TimeSeries {
            dates: self.dates.clone(),
            values,
        }
    }

    /// The suffix of the series starting at index `start`.
    pub fn tail_from(&self, start: usize) -> Self
    where
        T: Clone,
    {
        let start = start.min(self.len());
        Self {
            dates: self.dates[start..].to_vec(),
            values: self.values[start..].to_vec(),
        }
    }

    pub fn into_parts(self) -> (Vec<NaiveDate>, Vec<T>) {
        (self.dates, self.values)
    }
}

impl TimeSeries<f64> {
    /// Values with NaN entries skipped.
    pub fn finite_values(&self) -> Vec<f64> {
        self.values.iter().copied().filter(|v| v.is_finite()).collect()
    }
}

pub(crate) fn check_increasing(dates: &[NaiveDate]) -> Result<(), SeriesError> {
    for (i, pair) in dates.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(SeriesError::NotIncreasing {
                index: i + 1,
                prev: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = TimeSeries::new(vec![d(1), d(2)], vec![1.0]).unwrap_err();
        assert_eq!(err, SeriesError::LengthMismatch { dates: 2, values: 1 });
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = TimeSeries::new(vec![d(1), d(2), d(2)], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, SeriesError::NotIncreasing { index: 2, .. }));
    }

    #[test]
    fn rejects_decreasing_dates() {
        assert!(TimeSeries::new(vec![d(3), d(1)], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn lookup_by_date() {
        let s = TimeSeries::new(vec![d(2), d(3), d(5)], vec![10.0, 20.0, 30.0]).unwrap();
        assert_eq!(s.get(d(3)), Some(&20.0));
        assert_eq!(s.get(d(4)), None);
        assert_eq!(s.index_of(d(5)), Some(2));
        assert_eq!(s.first_date(), Some(d(2)));
        assert_eq!(s.last_date(), Some(d(5)));
    }

    #[test]
    fn map_keeps_dates() {
        let s = TimeSeries::new(vec![d(1), d(2)], vec![1.0, 2.0]).unwrap();
        let doubled = s.map(|v| v * 2.0);
        assert_eq!(doubled.dates(), s.dates());
        assert_eq!(doubled.values(), &[2.0, 4.0]);
    }

    #[test]
    fn tail_from_clamps() {
        let s = TimeSeries::new(vec![d(1), d(2), d(3)], vec![1, 2, 3]).unwrap();
        assert_eq!(s.tail_from(1).values(), &[2, 3]);
        assert!(s.tail_from(10).is_empty());
    }

    #[test]
    fn finite_values_skip_nan() {
        let s = TimeSeries::new(vec![d(1), d(2), d(3)], vec![1.0, f64::NAN, 3.0]).unwrap();
        assert_eq!(s.finite_values(), vec![1.0, 3.0]);
    }
}
