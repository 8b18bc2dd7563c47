//! Rolling z-score normalisation and post-normalisation transforms.
//!
//! Output for date `t` uses the `window` observations ending at `t`
//! (inclusive), so the normalised series starts `window - 1` dates after the
//! raw one. Dates without a full window are absent from the output rather
//! than zero-filled.

use serde::{Deserialize, Serialize};

use super::SignalError;
use crate::series::TimeSeries;

/// Normalisation settings applied after a source produces its raw series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeSettings {
    /// Rolling z-score lookback, in observations.
    pub window: usize,
    /// Trailing rolling-mean smoothing applied to the z-score.
    #[serde(default)]
    pub smoothing_window: Option<usize>,
    /// Symmetric clip applied last.
    #[serde(default)]
    pub signal_cap: Option<f64>,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            window: 252,
            smoothing_window: None,
            signal_cap: None,
        }
    }
}

impl NormalizeSettings {
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.window < 2 {
            return Err(SignalError::Window(self.window));
        }
        if self.smoothing_window == Some(0) {
            return Err(SignalError::Window(0));
        }
        if let Some(cap) = self.signal_cap {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(SignalError::Cap(cap));
            }
        }
        Ok(())
    }

    /// Normalise `raw`, then smooth and clip as configured.
    pub fn apply(&self, raw: &TimeSeries<f64>) -> Result<TimeSeries<f64>, SignalError> {
        self.validate()?;
        let mut out = normalize(raw, self.window)?;
        if let Some(k) = self.smoothing_window {
            out = smooth(&out, k);
        }
        if let Some(cap) = self.signal_cap {
            out = clip(&out, cap);
        }
        Ok(out)
    }
}

/// Rolling z-score: `(raw[t] - mean) / std` over the trailing window.
///
/// Uses the sample standard deviation (n - 1). A window whose values are all
/// identical yields exactly 0.0. A window containing NaN yields NaN for that
/// date, which downstream allocation treats as "hold previous weights".
pub fn normalize(raw: &TimeSeries<f64>, window: usize) -> Result<TimeSeries<f64>, SignalError> {
    if window < 2 {
        return Err(SignalError::Window(window));
    }
    let values = raw.values();
    let n = values.len();
    if n < window {
        return Ok(TimeSeries::empty());
    }

    let mut out = Vec::with_capacity(n + 1 - window);
    for t in (window - 1)..n {
        out.push(zscore(&values[t + 1 - window..=t]));
    }

    let dates = raw.dates()[window - 1..].to_vec();
    Ok(TimeSeries::new(dates, out)?)
}

fn zscore(window: &[f64]) -> f64 {
    if window.iter().any(|v| !v.is_finite()) {
        return f64::NAN;
    }
    let current = window[window.len() - 1];
    let first = window[0];
    if window.iter().all(|&v| v == first) {
        return 0.0;
    }

    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    (current - mean) / std
}

/// Trailing mean over up to `k` finite values ending at each date.
///
/// A NaN on date `t` stays NaN; smoothing never invents a value for a gap.
pub fn smooth(series: &TimeSeries<f64>, k: usize) -> TimeSeries<f64> {
    let values = series.values();
    let k = k.max(1);
    let smoothed: Vec<f64> = (0..values.len())
        .map(|t| {
            if values[t].is_nan() {
                return f64::NAN;
            }
            let start = (t + 1).saturating_sub(k);
            let finite: Vec<f64> = values[start..=t]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            finite.iter().sum::<f64>() / finite.len() as f64
        })
        .collect();
    series.map_values(smoothed)
}

/// Clip to `[-cap, cap]`; NaN passes through.
pub fn clip(series: &TimeSeries<f64>, cap: f64) -> TimeSeries<f64> {
    series.map(|v| if v.is_nan() { *v } else { v.clamp(-cap, cap) })
}
