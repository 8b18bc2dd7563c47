//! Summary statistics of a signal series.

use serde::{Deserialize, Serialize};

use crate::series::TimeSeries;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    /// Finite observations.
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1).
    pub std: f64,
    /// Adjusted Fisher-Pearson skewness; 0 below three observations.
    pub skew: f64,
    pub min: f64,
    pub max: f64,
}

impl SignalStats {
    pub fn compute(series: &TimeSeries<f64>) -> Self {
        let values = series.finite_values();
        let n = values.len();
        if n == 0 {
            return Self::default();
        }
        let nf = n as f64;
        let mean = values.iter().sum::<f64>() / nf;
        let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf;
        let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / nf;
        let std = if n > 1 { (m2 * nf / (nf - 1.0)).sqrt() } else { 0.0 };
        let skew = if n > 2 && m2 > 0.0 {
            let g1 = m3 / m2.powf(1.5);
            g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0)
        } else {
            0.0
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self { count: n, mean, std, skew, min, max }
    }
}
