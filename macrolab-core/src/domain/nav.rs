//! NavPoint: one date of the simulated equity curve.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub nav: f64,
    /// Return from the previous date's held weights, before costs.
    pub gross_return: f64,
    /// `nav / previous nav - 1`, after costs.
    pub net_return: f64,
    /// `nav / running peak - 1`; always <= 0.
    pub drawdown: f64,
    /// Transaction costs paid on this date.
    pub cost: f64,
    /// Whether the de-risked allocation was in force on this date.
    pub overlay_active: bool,
}
