//! Concrete macro signal sources.
//!
//! All lookbacks are counted in observations of the input table. When the
//! table has been aligned onto the trading calendar, that means trading days.

use serde::{Deserialize, Serialize};

use super::{required_column, SignalError, SignalSource};
use crate::data::Table;
use crate::series::TimeSeries;

// ─── Yield curve ────────────────────────────────────────────────────

/// Yield curve slope: long yield minus short yield (10Y - 2Y by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldCurveSignal {
    pub long_yield: String,
    pub short_yield: String,
    /// Negate the spread (long the risk-on asset when the curve flattens).
    #[serde(default)]
    pub invert: bool,
}

impl Default for YieldCurveSignal {
    fn default() -> Self {
        Self {
            long_yield: "yield_10y".into(),
            short_yield: "yield_2y".into(),
            invert: false,
        }
    }
}

impl SignalSource for YieldCurveSignal {
    fn name(&self) -> &str {
        "yield_curve"
    }

    fn required_fields(&self) -> Vec<&str> {
        vec![self.long_yield.as_str(), self.short_yield.as_str()]
    }

    fn raw(&self, data: &Table) -> Result<TimeSeries<f64>, SignalError> {
        let long = required_column(data, self.name(), &self.long_yield)?;
        let short = required_column(data, self.name(), &self.short_yield)?;
        let sign = if self.invert { -1.0 } else { 1.0 };
        let spread = long
            .iter()
            .zip(short)
            .map(|(l, s)| sign * (l - s))
            .collect();
        Ok(TimeSeries::new(data.dates().to_vec(), spread)?)
    }
}

// ─── Inflation surprise ─────────────────────────────────────────────

/// Inflation surprise: year-over-year CPI change minus its rolling trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflationSurpriseSignal {
    pub cpi_field: String,
    /// Observations between the two CPI prints of the YoY change.
    pub lookback: usize,
    /// Rolling window of the YoY trend (at least half must be observed).
    pub trend_window: usize,
}

impl Default for InflationSurpriseSignal {
    fn default() -> Self {
        Self {
            cpi_field: "cpi".into(),
            lookback: 252,
            trend_window: 252,
        }
    }
}

impl SignalSource for InflationSurpriseSignal {
    fn name(&self) -> &str {
        "inflation_surprise"
    }

    fn required_fields(&self) -> Vec<&str> {
        vec![self.cpi_field.as_str()]
    }

    fn raw(&self, data: &Table) -> Result<TimeSeries<f64>, SignalError> {
        if self.lookback == 0 || self.trend_window == 0 {
            return Err(SignalError::InvalidParameter {
                signal: self.name().into(),
                reason: "lookback and trend_window must be positive".into(),
            });
        }
        let cpi = required_column(data, self.name(), &self.cpi_field)?;
        let yoy = pct_change(cpi, self.lookback)
            .into_iter()
            .map(|g| g * 100.0)
            .collect::<Vec<_>>();
        let trend = rolling_mean(&yoy, self.trend_window, (self.trend_window / 2).max(1));
        let surprise = yoy.iter().zip(&trend).map(|(y, t)| y - t).collect();
        Ok(TimeSeries::new(data.dates().to_vec(), surprise)?)
    }
}

// ─── GDP momentum ───────────────────────────────────────────────────

/// GDP momentum: recent average growth minus the preceding average growth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdpMomentumSignal {
    pub gdp_field: String,
    /// Observations between the two GDP prints of one growth reading.
    pub growth_lag: usize,
    /// Total span compared; each half is averaged separately.
    pub momentum_window: usize,
}

impl Default for GdpMomentumSignal {
    fn default() -> Self {
        Self {
            gdp_field: "gdp".into(),
            growth_lag: 63,
            momentum_window: 252,
        }
    }
}

impl SignalSource for GdpMomentumSignal {
    fn name(&self) -> &str {
        "gdp_momentum"
    }

    fn required_fields(&self) -> Vec<&str> {
        vec![self.gdp_field.as_str()]
    }

    fn raw(&self, data: &Table) -> Result<TimeSeries<f64>, SignalError> {
        let half = self.momentum_window / 2;
        if self.growth_lag == 0 || half == 0 {
            return Err(SignalError::InvalidParameter {
                signal: self.name().into(),
                reason: "growth_lag must be positive and momentum_window at least 2".into(),
            });
        }
        let gdp = required_column(data, self.name(), &self.gdp_field)?;
        let growth = pct_change(gdp, self.growth_lag);
        let current = rolling_mean(&growth, half, half);

        let momentum = (0..growth.len())
            .map(|t| {
                if t < half {
                    return f64::NAN;
                }
                current[t] - current[t - half]
            })
            .collect();
        Ok(TimeSeries::new(data.dates().to_vec(), momentum)?)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

/// `x[t] / x[t - lag] - 1`; NaN without a valid base.
fn pct_change(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|t| {
            if t < lag {
                return f64::NAN;
            }
            let base = values[t - lag];
            if base.is_nan() || base == 0.0 {
                return f64::NAN;
            }
            values[t] / base - 1.0
        })
        .collect()
}

/// Trailing mean of finite values over `k` observations, NaN when fewer than
/// `min_periods` are finite.
fn rolling_mean(values: &[f64], k: usize, min_periods: usize) -> Vec<f64> {
    (0..values.len())
        .map(|t| {
            let start = (t + 1).saturating_sub(k);
            let (sum, count) = values[start..=t]
                .iter()
                .filter(|v| v.is_finite())
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count < min_periods || count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect()
}
