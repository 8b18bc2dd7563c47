//! Error taxonomy shared by the pipeline components.
//!
//! Configuration problems fail before a run starts. Data problems abort the
//! run at the offending date. Zero-variance windows are not errors; they are
//! handled by the zero policy in the normaliser and the analyzer.

use chrono::NaiveDate;
use thiserror::Error;

use crate::series::SeriesError;

/// Invalid configuration, detected before any simulation step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("threshold_low ({low}) must be <= threshold_high ({high})")]
    ThresholdOrder { low: f64, high: f64 },

    #[error("thresholds must be finite (low = {low}, high = {high})")]
    NonFiniteThreshold { low: f64, high: f64 },

    #[error("risk_on and risk_off assets must differ (both '{0}')")]
    SameAsset(String),

    #[error("asset identifier must not be empty")]
    EmptyAsset,

    #[error("cost_rate must be in [0, 0.5), got {0}")]
    CostRate(f64),

    #[error("initial_capital must be positive and finite, got {0}")]
    InitialCapital(f64),

    #[error("rebalance_threshold must be non-negative and finite, got {0}")]
    RebalanceThreshold(f64),

    #[error("max_drawdown_limit must be in (0, 1], got {0}")]
    DrawdownLimit(f64),

    #[error("drawdown_reentry ({reentry}) must be in [0, max_drawdown_limit = {limit})")]
    DrawdownReentry { reentry: f64, limit: f64 },

    #[error("drawdown_reentry is set but max_drawdown_limit is not")]
    ReentryWithoutLimit,

    #[error("weight for '{asset}' is {weight}; weights must be finite and non-negative")]
    InvalidWeight { asset: String, weight: f64 },

    #[error("weights sum to {sum}, expected 1.0 (tolerance 1e-9)")]
    NotNormalized { sum: f64 },

    #[error("signal window must be at least 2, got {0}")]
    Window(usize),

    #[error("{0}")]
    Other(String),
}

/// Errors that abort a simulation run.
///
/// A run that fails never returns a partial NAV series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data gap on {date}: no {field}")]
    DataGap { date: NaiveDate, field: String },

    #[error("invalid price on {date} for '{asset}': {price}")]
    InvalidPrice {
        date: NaiveDate,
        asset: String,
        price: f64,
    },

    #[error("invalid input series: {0}")]
    Series(#[from] SeriesError),

    #[error("no trading dates with a target allocation")]
    NoTradingDates,

    #[error("simulator already ran; create a fresh instance per run")]
    AlreadyRun,
}

impl SimError {
    /// Date the run aborted on, when the error is tied to one.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            SimError::DataGap { date, .. } | SimError::InvalidPrice { date, .. } => Some(*date),
            _ => None,
        }
    }
}
