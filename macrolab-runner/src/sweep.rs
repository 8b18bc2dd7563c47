//! Parameter sweeps over signal window, thresholds and cost rate.
//!
//! Each grid point is an independent backtest on the same loaded inputs.
//! Runs execute in parallel with Rayon; a single run is always sequential
//! over its dates.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use macrolab_core::allocation::Thresholds;

use crate::config::{BacktestConfig, RunId};
use crate::data_loader::LoadedData;
use crate::runner::{run_loaded, BacktestResult};

/// Parameter grid: windows × threshold pairs × cost rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    /// Normalisation windows to test.
    pub windows: Vec<usize>,
    /// Threshold pairs to test.
    pub thresholds: Vec<Thresholds>,
    /// Cost rates to test.
    pub cost_rates: Vec<f64>,
}

impl ParamGrid {
    /// Symmetric threshold pairs `(+x, -x)` for each level.
    pub fn symmetric_thresholds(levels: &[f64]) -> Vec<Thresholds> {
        levels
            .iter()
            .map(|&x| Thresholds { high: x, low: -x })
            .collect()
    }

    /// Returns the total number of grid points, valid or not.
    pub fn size(&self) -> usize {
        self.windows.len() * self.thresholds.len() * self.cost_rates.len()
    }

    /// All valid configurations in the grid.
    ///
    /// Grid points that fail validation (e.g. `low > high`, window < 2)
    /// are skipped.
    pub fn generate_configs(&self, base: &BacktestConfig) -> Vec<BacktestConfig> {
        let mut configs = Vec::new();

        for &window in &self.windows {
            for thresholds in &self.thresholds {
                for &cost_rate in &self.cost_rates {
                    let mut config = base.clone();
                    config.signal.window = window;
                    config.allocation.threshold_high = thresholds.high;
                    config.allocation.threshold_low = thresholds.low;
                    config.portfolio.cost_rate = cost_rate;

                    if let Err(e) = config.validate() {
                        tracing::debug!(window, ?thresholds, cost_rate, error = %e, "skipping grid point");
                        continue;
                    }
                    configs.push(config);
                }
            }
        }

        configs
    }
}

/// One grid point that failed to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepFailure {
    pub run_id: RunId,
    pub error: String,
}

/// Results from a parameter sweep, ranked by Sharpe ratio (descending).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResults {
    results: Vec<BacktestResult>,
    failures: Vec<SweepFailure>,
}

impl SweepResults {
    fn new(mut results: Vec<BacktestResult>, failures: Vec<SweepFailure>) -> Self {
        results.sort_by(|a, b| {
            b.metrics
                .sharpe
                .total_cmp(&a.metrics.sharpe)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Self { results, failures }
    }

    /// All successful results, best first.
    pub fn ranked(&self) -> &[BacktestResult] {
        &self.results
    }

    pub fn failures(&self) -> &[SweepFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&BacktestResult> {
        self.results.iter().find(|r| r.run_id == run_id)
    }

    pub fn top_n(&self, n: usize) -> &[BacktestResult] {
        &self.results[..n.min(self.results.len())]
    }

    pub fn best(&self) -> Option<&BacktestResult> {
        self.results.first()
    }
}

/// Run every valid grid point against the same inputs, in parallel.
///
/// A failing grid point is recorded and does not abort the sweep.
pub fn run_sweep(grid: &ParamGrid, base: &BacktestConfig, data: &LoadedData) -> SweepResults {
    let configs = grid.generate_configs(base);
    tracing::info!(
        grid_points = grid.size(),
        valid = configs.len(),
        "starting sweep"
    );

    let outcomes: Vec<Result<BacktestResult, SweepFailure>> = configs
        .par_iter()
        .map(|config| {
            run_loaded(config, data).map_err(|e| SweepFailure {
                run_id: config.run_id(),
                error: e.to_string(),
            })
        })
        .collect();

    let mut results = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(r) => results.push(r),
            Err(f) => {
                tracing::warn!(run_id = %f.run_id, error = %f.error, "sweep run failed");
                failures.push(f);
            }
        }
    }

    tracing::info!(ok = results.len(), failed = failures.len(), "sweep complete");
    SweepResults::new(results, failures)
}
