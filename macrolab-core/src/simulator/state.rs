//! Simulator lifecycle and overlay transitions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle of one simulator instance.
///
/// ```text
/// Uninitialized ──run──▶ Running ◀──▶ RiskOverlayActive
///                           │                 │
///                           └──── last date ──┴──▶ Terminated
/// ```
///
/// A failed run also ends in `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimState {
    Uninitialized,
    Running,
    RiskOverlayActive,
    Terminated,
}

impl SimState {
    pub fn is_terminal(self) -> bool {
        self == SimState::Terminated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayTransition {
    Activated,
    Deactivated,
}

/// A risk overlay state change, recorded on the date it was decided.
///
/// The new allocation takes effect from the following date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayEvent {
    pub date: NaiveDate,
    pub transition: OverlayTransition,
    pub drawdown: f64,
}
