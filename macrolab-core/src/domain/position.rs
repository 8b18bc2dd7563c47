//! Position: simulator-owned portfolio state.

use std::collections::BTreeMap;

use super::WeightVector;

/// Derived state held by the simulator between dates.
///
/// `weights` may sum to less than 1 only before the first rebalance (the
/// remainder is uninvested cash earning nothing).
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub weights: BTreeMap<String, f64>,
    pub nav: f64,
    pub cumulative_costs: f64,
    pub peak_nav: f64,
    pub overlay_active: bool,
}

impl Position {
    /// Opening state: NAV = capital, weights = initial allocation or all cash.
    pub fn open(initial_capital: f64, initial_weights: Option<&WeightVector>) -> Self {
        let weights = initial_weights
            .map(|w| w.as_map().clone())
            .unwrap_or_default();
        Self {
            weights,
            nav: initial_capital,
            cumulative_costs: 0.0,
            peak_nav: initial_capital,
            overlay_active: false,
        }
    }

    pub fn weight(&self, asset: &str) -> f64 {
        self.weights.get(asset).copied().unwrap_or(0.0)
    }

    /// Uninvested fraction of NAV.
    pub fn cash_weight(&self) -> f64 {
        (1.0 - self.weights.values().sum::<f64>()).max(0.0)
    }

    /// Current drawdown from the running peak.
    pub fn drawdown(&self) -> f64 {
        if self.peak_nav > 0.0 {
            (self.nav / self.peak_nav - 1.0).min(0.0)
        } else {
            0.0
        }
    }

    /// Raise the running peak if the current NAV exceeds it.
    pub fn mark_peak(&mut self) {
        if self.nav > self.peak_nav {
            self.peak_nav = self.nav;
        }
    }
}
