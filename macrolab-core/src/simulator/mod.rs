//! Portfolio simulator: target weights + prices → NAV series and trade log.
//!
//! One step per trading date, in order:
//!
//! 1. Gross return from the previous date's held weights; weights drift with
//!    the differential asset returns.
//! 2. Target for the date: the allocation policy's weights, or the de-risked
//!    allocation while the risk overlay is active.
//! 3. Rebalance from drifted to target weights when the date is on the
//!    rebalance schedule (or follows an overlay transition) and the L1
//!    distance exceeds `rebalance_threshold`, paying
//!    `|delta| * notional * cost_rate` per leg.
//! 4. `NAV_t = NAV_{t-1} * (1 + gross_return) - total_cost`.
//! 5. Running peak and drawdown.
//! 6. Overlay transition, effective from the next date.

pub mod config;
pub mod state;

pub use config::{
    RebalanceFrequency, RiskOverlay, SimulatorConfig, DRAWDOWN_TOLERANCE, MAX_COST_RATE,
};
pub use state::{OverlayEvent, OverlayTransition, SimState};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::Table;
use crate::domain::{NavPoint, Position, Trade, WeightVector};
use crate::error::{ConfigError, SimError};
use crate::series::{check_increasing, TimeSeries};

/// Weight deltas at or below this size are not traded.
const TRADE_EPSILON: f64 = 1e-12;

/// Everything a completed run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub nav: Vec<NavPoint>,
    pub trades: Vec<Trade>,
    /// Weights held at the close of each date, after any rebalance.
    pub weights: TimeSeries<BTreeMap<String, f64>>,
    pub overlay_events: Vec<OverlayEvent>,
    /// Sum of every trade's cost, accumulated in trade-log order.
    pub total_costs: f64,
    /// Whether the overlay was still active after the last date.
    pub overlay_active_at_end: bool,
}

impl SimulationOutput {
    pub fn nav_series(&self) -> TimeSeries<f64> {
        TimeSeries::new(
            self.nav.iter().map(|p| p.date).collect(),
            self.nav.iter().map(|p| p.nav).collect(),
        )
        .unwrap_or_else(|_| TimeSeries::empty())
    }

    pub fn final_nav(&self) -> Option<f64> {
        self.nav.last().map(|p| p.nav)
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.nav.first().map(|p| p.date)
    }
}

/// Single-use simulator. Create a fresh instance per run.
#[derive(Debug)]
pub struct PortfolioSimulator {
    config: SimulatorConfig,
    state: SimState,
}

impl PortfolioSimulator {
    /// Validates the configuration up front.
    pub fn new(config: SimulatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: SimState::Uninitialized,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    /// Simulate over `dates`.
    ///
    /// Dates before the first target are warmup and are skipped. From there
    /// on every date needs a target and a positive price for each asset held
    /// or targeted. Any failure aborts the whole run; no partial output is
    /// returned. The simulator ends in [`SimState::Terminated`] either way.
    pub fn run(
        &mut self,
        dates: &[NaiveDate],
        targets: &TimeSeries<WeightVector>,
        prices: &Table,
    ) -> Result<SimulationOutput, SimError> {
        if self.state != SimState::Uninitialized {
            return Err(SimError::AlreadyRun);
        }
        self.state = SimState::Running;
        let result = self.simulate(dates, targets, prices);
        self.state = SimState::Terminated;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "simulation aborted");
        }
        result
    }

    fn simulate(
        &mut self,
        dates: &[NaiveDate],
        targets: &TimeSeries<WeightVector>,
        prices: &Table,
    ) -> Result<SimulationOutput, SimError> {
        check_increasing(dates)?;
        let first_target = targets.first_date().ok_or(SimError::NoTradingDates)?;
        let dates = &dates[dates.partition_point(|d| *d < first_target)..];
        if dates.is_empty() {
            return Err(SimError::NoTradingDates);
        }

        let config = &self.config;
        tracing::info!(
            start = %dates[0],
            days = dates.len(),
            capital = config.initial_capital,
            cost_rate = config.cost_rate,
            "simulation started"
        );

        let mut position = Position::open(config.initial_capital, config.initial_weights.as_ref());
        let mut nav = Vec::with_capacity(dates.len());
        let mut trades = Vec::new();
        let mut held_history = Vec::with_capacity(dates.len());
        let mut overlay_events = Vec::new();
        let mut prev: Option<(NaiveDate, usize)> = None;
        let mut prev_date: Option<NaiveDate> = None;
        let mut overlay_switched = false;

        for &date in dates {
            let row = prices.index_of(date);
            let prev_nav = position.nav;

            // ── 1. Gross return and drift ──
            let mut gross_return = 0.0;
            let mut asset_returns: BTreeMap<&str, f64> = BTreeMap::new();
            if let Some((prev_date, prev_row)) = prev {
                for (asset, &w) in &position.weights {
                    if w <= 0.0 {
                        continue;
                    }
                    let p0 = price_at(prices, Some(prev_row), asset, prev_date)?;
                    let p1 = price_at(prices, row, asset, date)?;
                    let r = p1 / p0 - 1.0;
                    gross_return += w * r;
                    asset_returns.insert(asset.as_str(), r);
                }
            }
            let growth = 1.0 + gross_return;
            let notional = prev_nav * growth;
            let drifted: BTreeMap<String, f64> = position
                .weights
                .iter()
                .filter(|(_, w)| **w > 0.0)
                .map(|(asset, w)| {
                    let r = asset_returns.get(asset.as_str()).copied().unwrap_or(0.0);
                    (asset.clone(), w * (1.0 + r) / growth)
                })
                .collect();

            // ── 2. Target ──
            let overlay_on = position.overlay_active;
            let target = match (&config.overlay, overlay_on) {
                (Some(overlay), true) => overlay.derisked_weights.clone(),
                _ => targets
                    .get(date)
                    .cloned()
                    .ok_or_else(|| SimError::DataGap {
                        date,
                        field: "target weights".into(),
                    })?,
            };
            for asset in target.assets() {
                price_at(prices, row, asset, date)?;
            }

            // ── 3. Rebalance ──
            let scheduled = std::mem::take(&mut overlay_switched)
                || config.rebalance_frequency.is_scheduled(prev_date, date);
            let deltas = weight_deltas(&drifted, &target);
            let turnover: f64 = deltas.values().map(|d| d.abs()).sum();
            let mut day_cost = 0.0;
            let held = if scheduled
                && turnover > TRADE_EPSILON
                && turnover > config.rebalance_threshold
            {
                for (asset, delta) in deltas {
                    if delta.abs() <= TRADE_EPSILON {
                        continue;
                    }
                    let traded_notional = delta.abs() * notional;
                    let cost = traded_notional * config.cost_rate;
                    day_cost += cost;
                    position.cumulative_costs += cost;
                    tracing::debug!(%date, asset = asset.as_str(), delta, cost, "rebalance leg");
                    trades.push(Trade {
                        date,
                        asset,
                        weight_delta: delta,
                        traded_notional,
                        cost,
                    });
                }
                target.as_map().clone()
            } else {
                drifted
            };

            // ── 4. NAV ──
            position.nav = notional - day_cost;
            position.weights = held;

            // ── 5. Peak and drawdown ──
            position.mark_peak();
            let drawdown = position.drawdown();
            nav.push(NavPoint {
                date,
                nav: position.nav,
                gross_return,
                net_return: position.nav / prev_nav - 1.0,
                drawdown,
                cost: day_cost,
                overlay_active: overlay_on,
            });
            held_history.push(position.weights.clone());

            // ── 6. Overlay transition ──
            if let Some(overlay) = &config.overlay {
                let transition = if !position.overlay_active && overlay.breached(drawdown) {
                    tracing::warn!(%date, drawdown, "drawdown limit breached; de-risking");
                    Some(OverlayTransition::Activated)
                } else if position.overlay_active && overlay.recovered(drawdown) {
                    tracing::info!(%date, drawdown, "drawdown recovered; risk overlay released");
                    Some(OverlayTransition::Deactivated)
                } else {
                    None
                };
                if let Some(transition) = transition {
                    overlay_switched = true;
                    position.overlay_active = transition == OverlayTransition::Activated;
                    self.state = if position.overlay_active {
                        SimState::RiskOverlayActive
                    } else {
                        SimState::Running
                    };
                    overlay_events.push(OverlayEvent {
                        date,
                        transition,
                        drawdown,
                    });
                }
            }

            prev = row.map(|r| (date, r));
            prev_date = Some(date);
        }

        let weights = TimeSeries::new(dates.to_vec(), held_history)?;
        tracing::info!(
            final_nav = position.nav,
            trades = trades.len(),
            total_costs = position.cumulative_costs,
            overlay_events = overlay_events.len(),
            "simulation finished"
        );

        Ok(SimulationOutput {
            nav,
            trades,
            weights,
            overlay_events,
            total_costs: position.cumulative_costs,
            overlay_active_at_end: position.overlay_active,
        })
    }
}

/// Build a simulator and run it once.
pub fn simulate(
    config: SimulatorConfig,
    dates: &[NaiveDate],
    targets: &TimeSeries<WeightVector>,
    prices: &Table,
) -> Result<SimulationOutput, SimError> {
    PortfolioSimulator::new(config)?.run(dates, targets, prices)
}

/// Target minus drifted weight over the union of assets, ordered by asset.
fn weight_deltas(drifted: &BTreeMap<String, f64>, target: &WeightVector) -> BTreeMap<String, f64> {
    let mut deltas: BTreeMap<String, f64> = drifted.iter().map(|(a, w)| (a.clone(), -w)).collect();
    for (asset, w) in target.iter() {
        *deltas.entry(asset.to_string()).or_insert(0.0) += w;
    }
    deltas
}

/// A finite, strictly positive price, or the matching error.
fn price_at(prices: &Table, row: Option<usize>, asset: &str, date: NaiveDate) -> Result<f64, SimError> {
    let gap = || SimError::DataGap {
        date,
        field: format!("price for '{asset}'"),
    };
    let price = row.and_then(|r| prices.value(r, asset)).ok_or_else(gap)?;
    if !price.is_finite() || price <= 0.0 {
        return Err(SimError::InvalidPrice {
            date,
            asset: asset.to_string(),
            price,
        });
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    fn flat_prices(days: u32) -> Table {
        Table::from_rows((1..=days).map(|i| (d(i), vec![("SPY", 100.0), ("TLT", 50.0)]))).unwrap()
    }

    fn targets(ws: Vec<WeightVector>) -> TimeSeries<WeightVector> {
        let dates = (1..=ws.len() as u32).map(d).collect();
        TimeSeries::new(dates, ws).unwrap()
    }

    fn ymd(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    #[test]
    fn monthly_schedule_defers_signal_flip_to_month_end() {
        let dates = [ymd(7, 15), ymd(7, 16), ymd(7, 17), ymd(7, 31), ymd(8, 1)];
        let prices =
            Table::from_rows(dates.iter().map(|&dt| (dt, vec![("SPY", 100.0), ("TLT", 50.0)])))
                .unwrap();
        let mut ws = vec![WeightVector::single("SPY")];
        ws.extend(vec![WeightVector::single("TLT"); 4]);
        let t = TimeSeries::new(dates.to_vec(), ws).unwrap();
        let config = SimulatorConfig {
            rebalance_frequency: RebalanceFrequency::Monthly,
            ..SimulatorConfig::default()
        };

        let out = simulate(config, &dates, &t, &prices).unwrap();

        let trade_dates: Vec<NaiveDate> = out.trades.iter().map(|t| t.date).collect();
        assert_eq!(trade_dates, vec![ymd(7, 15), ymd(7, 31), ymd(7, 31)]);
        let held = out.weights.values();
        assert_eq!(held[2].get("SPY"), Some(&1.0));
        assert_eq!(held[3].get("TLT"), Some(&1.0));
        assert_eq!(held[4].get("TLT"), Some(&1.0));
    }

    #[test]
    fn overlay_transition_trades_off_schedule() {
        let dates = [ymd(7, 15), ymd(7, 16), ymd(7, 17), ymd(7, 18)];
        let spy = [100.0, 70.0, 70.0, 70.0];
        let prices = Table::from_rows(
            dates
                .iter()
                .zip(spy)
                .map(|(&dt, p)| (dt, vec![("SPY", p), ("TLT", 50.0)])),
        )
        .unwrap();
        let t = TimeSeries::new(dates.to_vec(), vec![WeightVector::single("SPY"); 4]).unwrap();
        let config = SimulatorConfig {
            cost_rate: 0.0,
            rebalance_frequency: RebalanceFrequency::Monthly,
            overlay: Some(RiskOverlay {
                max_drawdown_limit: 0.2,
                drawdown_reentry: 0.1,
                derisked_weights: WeightVector::single("TLT"),
            }),
            ..SimulatorConfig::default()
        };

        let out = simulate(config, &dates, &t, &prices).unwrap();

        assert_eq!(out.overlay_events.len(), 1);
        assert_eq!(out.overlay_events[0].date, ymd(7, 16));
        assert!(out.trades.iter().any(|t| t.date == ymd(7, 17) && t.asset == "TLT"));
        assert_eq!(out.weights.values()[3].get("TLT"), Some(&1.0));
    }

    #[test]
    fn exact_limit_drawdown_activates_overlay() {
        let prices = Table::from_rows(vec![
            (d(1), vec![("SPY", 100.0), ("TLT", 50.0)]),
            (d(2), vec![("SPY", 80.0), ("TLT", 50.0)]),
        ])
        .unwrap();
        let config = SimulatorConfig {
            cost_rate: 0.0,
            initial_weights: Some(WeightVector::single("SPY")),
            overlay: Some(RiskOverlay {
                max_drawdown_limit: 0.2,
                drawdown_reentry: 0.1,
                derisked_weights: WeightVector::single("TLT"),
            }),
            ..SimulatorConfig::default()
        };
        let t = targets(vec![WeightVector::single("SPY"); 2]);
        let out = simulate(config, prices.dates(), &t, &prices).unwrap();
        assert_eq!(out.overlay_events.len(), 1);
        assert_eq!(out.overlay_events[0].date, d(2));
        assert!(out.overlay_active_at_end);
    }

    #[test]
    fn first_rebalance_from_cash_pays_full_turnover() {
        let prices = flat_prices(2);
        let t = targets(vec![WeightVector::split("SPY", "TLT"); 2]);
        let out = simulate(SimulatorConfig::default(), prices.dates(), &t, &prices).unwrap();
        assert_eq!(out.trades.len(), 2);
        assert!((out.total_costs - 1_000.0).abs() < 1e-9);
        assert!((out.nav[1].nav - 999_000.0).abs() < 1e-6);
        assert_eq!(out.nav[1].cost, 0.0);
    }

    #[test]
    fn weights_drift_without_rebalance_threshold_breach() {
        let prices = Table::from_rows(vec![
            (d(1), vec![("SPY", 100.0), ("TLT", 100.0)]),
            (d(2), vec![("SPY", 110.0), ("TLT", 100.0)]),
        ])
        .unwrap();
        let config = SimulatorConfig {
            cost_rate: 0.0,
            rebalance_threshold: 0.5,
            initial_weights: Some(WeightVector::split("SPY", "TLT")),
            ..SimulatorConfig::default()
        };
        let t = targets(vec![WeightVector::split("SPY", "TLT"); 2]);
        let out = simulate(config, prices.dates(), &t, &prices).unwrap();
        assert!(out.trades.is_empty());
        assert!((out.nav[1].gross_return - 0.05).abs() < 1e-12);
        let spy = out.weights.values()[1]["SPY"];
        assert!((spy - 0.55 / 1.05).abs() < 1e-12);
    }

    #[test]
    fn missing_target_asset_price_is_data_gap() {
        let prices = Table::from_rows(vec![
            (d(1), vec![("SPY", 100.0), ("TLT", 50.0)]),
            (d(2), vec![("SPY", 100.0)]),
        ])
        .unwrap();
        let t = targets(vec![WeightVector::split("SPY", "TLT"); 2]);
        let err = simulate(SimulatorConfig::default(), prices.dates(), &t, &prices).unwrap_err();
        assert_eq!(
            err,
            SimError::DataGap {
                date: d(2),
                field: "price for 'TLT'".into()
            }
        );
    }

    #[test]
    fn non_positive_price_is_invalid() {
        let prices = Table::from_rows(vec![(d(1), vec![("SPY", -1.0), ("TLT", 50.0)])]).unwrap();
        let t = targets(vec![WeightVector::single("SPY")]);
        let err = simulate(SimulatorConfig::default(), prices.dates(), &t, &prices).unwrap_err();
        assert!(matches!(err, SimError::InvalidPrice { ref asset, .. } if asset == "SPY"));
        assert_eq!(err.date(), Some(d(1)));
    }

    #[test]
    fn price_of_untargeted_asset_may_be_missing() {
        let prices = Table::from_rows(vec![
            (d(1), vec![("SPY", 100.0)]),
            (d(2), vec![("SPY", 101.0)]),
        ])
        .unwrap();
        let t = targets(vec![WeightVector::single("SPY"); 2]);
        assert!(simulate(SimulatorConfig::default(), prices.dates(), &t, &prices).is_ok());
    }

    #[test]
    fn warmup_dates_before_first_target_are_skipped() {
        let prices = flat_prices(4);
        let t = TimeSeries::new(vec![d(3), d(4)], vec![WeightVector::single("TLT"); 2]).unwrap();
        let out = simulate(SimulatorConfig::default(), prices.dates(), &t, &prices).unwrap();
        assert_eq!(out.start_date(), Some(d(3)));
        assert_eq!(out.nav.len(), 2);
    }

    #[test]
    fn missing_target_mid_run_is_data_gap() {
        let prices = flat_prices(3);
        let t = TimeSeries::new(vec![d(1), d(3)], vec![WeightVector::single("TLT"); 2]).unwrap();
        let err = simulate(SimulatorConfig::default(), prices.dates(), &t, &prices).unwrap_err();
        assert_eq!(err.date(), Some(d(2)));
    }

    #[test]
    fn simulator_is_single_use() {
        let prices = flat_prices(2);
        let t = targets(vec![WeightVector::single("SPY"); 2]);
        let mut sim = PortfolioSimulator::new(SimulatorConfig::default()).unwrap();
        assert_eq!(sim.state(), SimState::Uninitialized);
        sim.run(prices.dates(), &t, &prices).unwrap();
        assert_eq!(sim.state(), SimState::Terminated);
        assert_eq!(sim.run(prices.dates(), &t, &prices), Err(SimError::AlreadyRun));
    }

    #[test]
    fn failed_run_terminates() {
        let prices = flat_prices(2);
        let empty = TimeSeries::<WeightVector>::empty();
        let mut sim = PortfolioSimulator::new(SimulatorConfig::default()).unwrap();
        assert_eq!(sim.run(prices.dates(), &empty, &prices), Err(SimError::NoTradingDates));
        assert!(sim.state().is_terminal());
    }

    #[test]
    fn invalid_config_rejected_before_run() {
        let config = SimulatorConfig {
            initial_capital: 0.0,
            ..SimulatorConfig::default()
        };
        assert_eq!(
            PortfolioSimulator::new(config).unwrap_err(),
            ConfigError::InitialCapital(0.0)
        );
    }
}
