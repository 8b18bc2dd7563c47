//! Trade: an immutable record of one asset's rebalance on one date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single rebalancing leg.
///
/// `cost` is always `traded_notional * cost_rate`, so it is non-negative
/// and proportional to the traded notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub asset: String,
    /// Target weight minus post-drift weight (positive = buy).
    pub weight_delta: f64,
    /// `|weight_delta| * portfolio notional` at the time of the rebalance.
    pub traded_notional: f64,
    pub cost: f64,
}

impl Trade {
    pub fn is_buy(&self) -> bool {
        self.weight_delta > 0.0
    }
}
