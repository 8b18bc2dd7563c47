//! Allocation policy: normalised signal value → target weight vector.
//!
//! Policies are pure. They never see portfolio state, only the signal.

use serde::{Deserialize, Serialize};

use crate::domain::WeightVector;
use crate::error::ConfigError;
use crate::series::TimeSeries;

/// Signal thresholds. Comparisons are strict, so a value exactly on a
/// boundary takes the neutral branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high: f64,
    pub low: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { high: 0.5, low: -0.5 }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.high.is_finite() || !self.low.is_finite() {
            return Err(ConfigError::NonFiniteThreshold {
                low: self.low,
                high: self.high,
            });
        }
        if self.low > self.high {
            return Err(ConfigError::ThresholdOrder {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// The two tradable assets of the switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPair {
    pub risk_on: String,
    pub risk_off: String,
}

impl AssetPair {
    pub fn new(risk_on: impl Into<String>, risk_off: impl Into<String>) -> Self {
        Self {
            risk_on: risk_on.into(),
            risk_off: risk_off.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.risk_on.is_empty() || self.risk_off.is_empty() {
            return Err(ConfigError::EmptyAsset);
        }
        if self.risk_on == self.risk_off {
            return Err(ConfigError::SameAsset(self.risk_on.clone()));
        }
        Ok(())
    }
}

/// Maps one signal value to a target allocation.
pub trait AllocationPolicy: Send + Sync {
    /// `None` means "no decision": the caller carries the previous target.
    fn allocate(&self, signal: f64) -> Option<WeightVector>;
}

/// Three-state switch between a risk-on and a risk-off asset.
///
/// - `signal > high` → 100% risk_on
/// - `signal < low` → 100% risk_off
/// - otherwise → 50/50
/// - NaN → no decision
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdPolicy {
    thresholds: Thresholds,
    assets: AssetPair,
}

impl ThresholdPolicy {
    /// Fails fast on reversed or non-finite thresholds and on a degenerate pair.
    pub fn new(thresholds: Thresholds, assets: AssetPair) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        assets.validate()?;
        Ok(Self { thresholds, assets })
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn assets(&self) -> &AssetPair {
        &self.assets
    }
}

impl AllocationPolicy for ThresholdPolicy {
    fn allocate(&self, signal: f64) -> Option<WeightVector> {
        if signal.is_nan() {
            return None;
        }
        let w = if signal > self.thresholds.high {
            WeightVector::single(self.assets.risk_on.as_str())
        } else if signal < self.thresholds.low {
            WeightVector::single(self.assets.risk_off.as_str())
        } else {
            WeightVector::split(self.assets.risk_on.as_str(), self.assets.risk_off.as_str())
        };
        Some(w)
    }
}

/// Map a signal series to a target weight series.
///
/// A NaN value carries the previous target forward. NaN values before the
/// first decision produce no entry, so the output may start later than the
/// signal.
pub fn allocate_series(
    signal: &TimeSeries<f64>,
    policy: &dyn AllocationPolicy,
) -> TimeSeries<WeightVector> {
    let mut dates = Vec::with_capacity(signal.len());
    let mut weights: Vec<WeightVector> = Vec::with_capacity(signal.len());
    let mut carried = 0usize;

    for (date, value) in signal.iter() {
        let target = match policy.allocate(*value) {
            Some(w) => w,
            None => match weights.last() {
                Some(prev) => {
                    carried += 1;
                    prev.clone()
                }
                None => continue,
            },
        };
        dates.push(date);
        weights.push(target);
    }

    if carried > 0 {
        tracing::debug!(carried, "carried target weights over missing signal values");
    }

    // Dates are a subsequence of the signal's strictly increasing axis.
    TimeSeries::new(dates, weights).unwrap_or_else(|_| TimeSeries::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn policy() -> ThresholdPolicy {
        ThresholdPolicy::new(Thresholds::default(), AssetPair::new("SPY", "TLT")).unwrap()
    }

    #[test]
    fn above_high_is_risk_on() {
        let w = policy().allocate(0.6).unwrap();
        assert_eq!(w.get("SPY"), 1.0);
        assert_eq!(w.get("TLT"), 0.0);
    }

    #[test]
    fn below_low_is_risk_off() {
        let w = policy().allocate(-2.0).unwrap();
        assert_eq!(w.get("TLT"), 1.0);
    }

    #[test]
    fn boundaries_are_neutral() {
        for v in [0.5, -0.5, 0.0] {
            let w = policy().allocate(v).unwrap();
            assert_eq!(w.get("SPY"), 0.5);
            assert_eq!(w.get("TLT"), 0.5);
        }
    }

    #[test]
    fn nan_is_no_decision() {
        assert!(policy().allocate(f64::NAN).is_none());
    }

    #[test]
    fn reversed_thresholds_fail_fast() {
        let err = ThresholdPolicy::new(
            Thresholds { high: -1.0, low: 1.0 },
            AssetPair::new("SPY", "TLT"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ThresholdOrder { .. }));
    }

    #[test]
    fn equal_thresholds_are_allowed() {
        let p = ThresholdPolicy::new(Thresholds { high: 0.0, low: 0.0 }, AssetPair::new("A", "B"))
            .unwrap();
        assert_eq!(p.allocate(0.0).unwrap().get("A"), 0.5);
        assert_eq!(p.allocate(0.1).unwrap().get("A"), 1.0);
    }

    #[test]
    fn same_asset_rejected() {
        let err = ThresholdPolicy::new(Thresholds::default(), AssetPair::new("SPY", "SPY"))
            .unwrap_err();
        assert_eq!(err, ConfigError::SameAsset("SPY".into()));
    }

    #[test]
    fn series_carries_forward_and_skips_leading_nan() {
        let start = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
        let dates: Vec<_> = (0..5).map(|i| start + chrono::Duration::days(i)).collect();
        let signal =
            TimeSeries::new(dates.clone(), vec![f64::NAN, 1.0, f64::NAN, -1.0, f64::NAN]).unwrap();
        let out = allocate_series(&signal, &policy());
        assert_eq!(out.dates(), &dates[1..]);
        assert_eq!(out.values()[0].get("SPY"), 1.0);
        assert_eq!(out.values()[1].get("SPY"), 1.0);
        assert_eq!(out.values()[2].get("TLT"), 1.0);
        assert_eq!(out.values()[3].get("TLT"), 1.0);
    }
}
