//! Simulator configuration.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::WeightVector;
use crate::error::ConfigError;

/// Upper bound (exclusive) on `cost_rate`. Total turnover per date is at most
/// 2, so any rate below one half keeps NAV strictly positive.
pub const MAX_COST_RATE: f64 = 0.5;

/// Slack on the drawdown limit, so a fall of exactly the limit trips it
/// despite rounding in `nav / peak - 1`.
pub const DRAWDOWN_TOLERANCE: f64 = 1e-12;

/// Calendar on which the simulator may trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    /// Every simulated date.
    #[default]
    Daily,
    /// The first trading date on or after each calendar month end.
    Monthly,
}

impl RebalanceFrequency {
    /// Whether `date` is on the schedule, given the previous simulated date.
    ///
    /// The first simulated date is always on the schedule.
    pub fn is_scheduled(self, prev: Option<NaiveDate>, date: NaiveDate) -> bool {
        match (self, prev) {
            (Self::Daily, _) | (_, None) => true,
            (Self::Monthly, Some(prev)) => {
                next_month_end(prev).map_or(false, |month_end| month_end <= date)
            }
        }
    }
}

/// Last day of the month containing `date`.
fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

/// First calendar month end strictly after `date`.
fn next_month_end(date: NaiveDate) -> Option<NaiveDate> {
    let end = month_end(date)?;
    if end > date {
        Some(end)
    } else {
        month_end(date.succ_opt()?)
    }
}

/// Drawdown-based de-risking with a hysteresis band.
///
/// Both bounds are positive fractions: a limit of `0.20` trips at a 20%
/// drawdown, a re-entry of `0.10` releases once drawdown is back within 10%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskOverlay {
    pub max_drawdown_limit: f64,
    pub drawdown_reentry: f64,
    pub derisked_weights: WeightVector,
}

impl RiskOverlay {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limit = self.max_drawdown_limit;
        if !limit.is_finite() || limit <= 0.0 || limit > 1.0 {
            return Err(ConfigError::DrawdownLimit(limit));
        }
        let reentry = self.drawdown_reentry;
        if !reentry.is_finite() || reentry < 0.0 || reentry >= limit {
            return Err(ConfigError::DrawdownReentry { reentry, limit });
        }
        Ok(())
    }

    /// Drawdown has breached the limit (within [`DRAWDOWN_TOLERANCE`]).
    pub fn breached(&self, drawdown: f64) -> bool {
        drawdown <= -self.max_drawdown_limit + DRAWDOWN_TOLERANCE
    }

    /// Drawdown has recovered into the re-entry band.
    pub fn recovered(&self, drawdown: f64) -> bool {
        drawdown >= -self.drawdown_reentry
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub initial_capital: f64,
    /// Proportional cost per unit of traded notional.
    pub cost_rate: f64,
    /// Minimum L1 weight distance that triggers a rebalance. At 0 the
    /// simulator rebalances whenever the target differs from the drifted
    /// weights.
    pub rebalance_threshold: f64,
    /// Dates on which trading is allowed. An overlay transition also allows
    /// a trade on the following date.
    pub rebalance_frequency: RebalanceFrequency,
    /// Opening allocation; `None` starts fully in cash.
    pub initial_weights: Option<WeightVector>,
    /// Risk overlay; `None` disables de-risking.
    pub overlay: Option<RiskOverlay>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1_000_000.0,
            cost_rate: 0.001,
            rebalance_threshold: 0.0,
            rebalance_frequency: RebalanceFrequency::Daily,
            initial_weights: None,
            overlay: None,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(ConfigError::InitialCapital(self.initial_capital));
        }
        if !self.cost_rate.is_finite() || self.cost_rate < 0.0 || self.cost_rate >= MAX_COST_RATE {
            return Err(ConfigError::CostRate(self.cost_rate));
        }
        if !self.rebalance_threshold.is_finite() || self.rebalance_threshold < 0.0 {
            return Err(ConfigError::RebalanceThreshold(self.rebalance_threshold));
        }
        if let Some(overlay) = &self.overlay {
            overlay.validate()?;
        }
        Ok(())
    }
}
