//! macrolab runner: backtest orchestration on top of `macrolab-core`.
//!
//! This crate provides:
//! - TOML configuration with content-hashed run ids
//! - Input loading from wide CSV files with a synthetic fallback
//! - The single-backtest pipeline and performance metrics
//! - Parallel parameter sweeps
//! - JSON / CSV / Parquet / Markdown artifacts
//! - `tracing` subscriber setup for binaries

pub mod config;
pub mod data_loader;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use config::{BacktestConfig, ConfigLoadError, RunId, SignalSourceConfig};
pub use data_loader::{load_inputs, LoadError, LoadOptions, LoadedData};
pub use export::{generate_report, save_artifacts};
pub use logging::{init_logging, LogFormat};
pub use metrics::{analyze, analyze_from_capital, DrawdownEpisode, Metrics, TradeStats};
pub use runner::{
    run_backtest, run_from_options, run_loaded, BacktestResult, RunError, SCHEMA_VERSION,
};
pub use sweep::{run_sweep, ParamGrid, SweepResults};
