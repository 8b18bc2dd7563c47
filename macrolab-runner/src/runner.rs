//! Backtest runner: wires signal, allocation, simulator and metrics together.
//!
//! Entry points:
//! - `run_from_options()`: loads inputs per [`LoadOptions`], then runs. Used by the CLI.
//! - `run_loaded()`: takes pre-loaded inputs. Used by sweeps to avoid re-reading files.
//! - `run_backtest()`: takes raw tables, no I/O.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use macrolab_core::allocation::allocate_series;
use macrolab_core::data::{align_inputs, Table};
use macrolab_core::domain::{NavPoint, Trade};
use macrolab_core::signal::{SignalError, SignalStats};
use macrolab_core::simulator::{simulate, OverlayEvent};
use macrolab_core::{ConfigError, SimError, TimeSeries};

use crate::config::{BacktestConfig, RunId};
use crate::data_loader::{load_inputs, LoadError, LoadOptions, LoadedData};
use crate::metrics::{analyze_from_capital, Metrics, TradeStats};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),
    #[error("simulation error: {0}")]
    Simulation(#[from] SimError),
    #[error("asset '{0}' not found in price data")]
    MissingAsset(String),
    #[error("no trading dates in the requested range")]
    EmptyRange,
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub config: BacktestConfig,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    /// First and last simulated dates.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Aligned dates skipped before the first target allocation.
    pub warmup_days: usize,
    pub signal_names: Vec<String>,
    /// Composite signal; `None` where no component had a value.
    pub signal: TimeSeries<Option<f64>>,
    pub signal_stats: SignalStats,
    pub nav: Vec<NavPoint>,
    pub trades: Vec<Trade>,
    /// Held weights after each date's rebalance.
    pub weights: TimeSeries<BTreeMap<String, f64>>,
    pub overlay_events: Vec<OverlayEvent>,
    pub overlay_active_at_end: bool,
    pub total_costs: f64,
    pub metrics: Metrics,
    pub trade_stats: TradeStats,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
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

    /// First 12 hex characters of the run id.
    pub fn short_id(&self) -> &str {
        &self.run_id[..self.run_id.len().min(12)]
    }
}

/// Load inputs per `opts`, then run.
pub fn run_from_options(
    config: &BacktestConfig,
    opts: &LoadOptions,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let loaded = load_inputs(&config.required_fields(), &config.required_assets(), opts)?;
    run_loaded(config, &loaded)
}

/// Run against pre-loaded inputs.
pub fn run_loaded(config: &BacktestConfig, loaded: &LoadedData) -> Result<BacktestResult, RunError> {
    run_backtest(
        config,
        &loaded.macro_data,
        &loaded.prices,
        &loaded.dataset_hash,
        loaded.has_synthetic,
    )
}

/// Run one backtest on raw tables, without I/O.
///
/// validate → align → signal → allocation → simulation → metrics.
pub fn run_backtest(
    config: &BacktestConfig,
    macro_data: &Table,
    prices: &Table,
    dataset_hash: &str,
    has_synthetic: bool,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let run_id = config.run_id();

    for asset in config.required_assets() {
        if !prices.has_column(&asset) {
            return Err(RunError::MissingAsset(asset));
        }
    }

    let aligned = align_inputs(
        macro_data,
        prices,
        config.backtest.start_date,
        config.backtest.end_date,
    );
    if aligned.is_empty() {
        return Err(RunError::EmptyRange);
    }
    tracing::info!(
        run_id = &run_id[..12],
        dates = aligned.len(),
        first = %aligned.dates[0],
        "inputs aligned"
    );

    // Signal
    let composite = config.composite_signal()?;
    let settings = config.normalize_settings();
    let signal = composite.generate(&aligned.macro_data, &settings)?;
    let signal_stats = SignalStats::compute(&signal);
    tracing::info!(
        signals = ?composite.names(),
        len = signal.len(),
        mean = signal_stats.mean,
        std = signal_stats.std,
        "signal generated"
    );

    // Allocation
    let policy = config.policy()?;
    let targets = allocate_series(&signal, &policy);
    tracing::info!(targets = targets.len(), "targets allocated");

    // Simulation
    let output = simulate(
        config.simulator_config()?,
        &aligned.dates,
        &targets,
        &aligned.prices,
    )?;
    let warmup_days = output
        .start_date()
        .map_or(aligned.len(), |start| {
            aligned.dates.partition_point(|d| *d < start)
        });

    // Metrics
    let nav = output.nav_series();
    let metrics = analyze_from_capital(&nav, config.backtest.initial_capital);
    let trade_stats = TradeStats::from_trades(&output.trades);
    tracing::info!(
        days = metrics.trading_days,
        total_return = metrics.total_return,
        sharpe = metrics.sharpe,
        max_drawdown = metrics.max_drawdown,
        trades = trade_stats.trade_count,
        costs = output.total_costs,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        config: config.clone(),
        dataset_hash: dataset_hash.to_string(),
        has_synthetic,
        start_date: nav.first_date(),
        end_date: nav.last_date(),
        warmup_days,
        signal_names: composite.names().into_iter().map(String::from).collect(),
        signal: signal.map(|v| if v.is_nan() { None } else { Some(*v) }),
        signal_stats,
        nav: output.nav,
        trades: output.trades,
        weights: output.weights,
        overlay_events: output.overlay_events,
        overlay_active_at_end: output.overlay_active_at_end,
        total_costs: output.total_costs,
        metrics,
        trade_stats,
    })
}
