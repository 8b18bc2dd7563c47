//! macrolab CLI: run, sweep and validate commands.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config on CSV or synthetic inputs
//! - `sweep`: run a parameter grid in parallel and print a ranked table
//! - `validate`: check a config without touching any data

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use macrolab_runner::sweep::SweepResults;
use macrolab_runner::{
    init_logging, load_inputs, run_loaded, run_sweep, save_artifacts, BacktestConfig,
    BacktestResult, LoadOptions, LogFormat, ParamGrid,
};

#[derive(Parser)]
#[command(
    name = "macrolab",
    version,
    about = "macrolab CLI: yield-curve signal allocation backtester"
)]
struct Cli {
    /// Log level (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format: pretty or json.
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single backtest.
    Run {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        inputs: InputArgs,

        /// Directory for result artifacts. Nothing is written when omitted.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Also write nav.parquet.
        #[arg(long, default_value_t = false)]
        parquet: bool,
    },
    /// Run a parameter grid and rank the results by Sharpe ratio.
    Sweep {
        /// Path to the base TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        inputs: InputArgs,

        /// Normalisation windows (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        windows: Vec<usize>,

        /// Symmetric threshold levels x, tested as (+x, -x) (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        thresholds: Vec<f64>,

        /// Cost rates (comma-separated). Defaults to the config's cost_rate.
        #[arg(long, value_delimiter = ',')]
        cost_rates: Vec<f64>,

        /// Number of ranked results to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Write the full sweep results as JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a config file and print what it needs.
    Validate {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Wide CSV of macro fields (date,<field>...).
    #[arg(long = "macro")]
    macro_path: Option<PathBuf>,

    /// Wide CSV of asset prices (date,<asset>...).
    #[arg(long)]
    prices: Option<PathBuf>,

    /// Generate synthetic data for any input not given as a file.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// First date (YYYY-MM-DD). Overrides the config's start_date.
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last date (YYYY-MM-DD). Overrides the config's end_date.
    #[arg(long)]
    end: Option<NaiveDate>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    match cli.command {
        Commands::Run {
            config,
            inputs,
            output_dir,
            parquet,
        } => run_cmd(config.as_deref(), &inputs, output_dir.as_deref(), parquet),
        Commands::Sweep {
            config,
            inputs,
            windows,
            thresholds,
            cost_rates,
            top,
            output,
        } => sweep_cmd(
            config.as_deref(),
            &inputs,
            windows,
            &thresholds,
            cost_rates,
            top,
            output.as_deref(),
        ),
        Commands::Validate { config } => validate_cmd(&config),
    }
}

fn load_config(path: Option<&Path>, inputs: &InputArgs) -> Result<BacktestConfig> {
    let mut config = match path {
        Some(p) => BacktestConfig::from_file(p)
            .with_context(|| format!("loading {}", p.display()))?,
        None => BacktestConfig::default(),
    };
    if inputs.start.is_some() {
        config.backtest.start_date = inputs.start;
    }
    if inputs.end.is_some() {
        config.backtest.end_date = inputs.end;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_options(config: &BacktestConfig, inputs: &InputArgs) -> Result<LoadOptions> {
    if !inputs.synthetic && (inputs.macro_path.is_none() || inputs.prices.is_none()) {
        bail!("both --macro and --prices are required unless --synthetic is given");
    }
    Ok(LoadOptions {
        macro_path: inputs.macro_path.clone(),
        prices_path: inputs.prices.clone(),
        synthetic: inputs.synthetic,
        start: config.backtest.start_date,
        end: config.backtest.end_date,
    })
}

fn run_cmd(
    config_path: Option<&Path>,
    inputs: &InputArgs,
    output_dir: Option<&Path>,
    parquet: bool,
) -> Result<()> {
    let config = load_config(config_path, inputs)?;
    let opts = load_options(&config, inputs)?;
    tracing::info!(run_id = %config.run_id(), synthetic = opts.synthetic, "starting run");
    let loaded = load_inputs(&config.required_fields(), &config.required_assets(), &opts)?;

    let result = run_loaded(&config, &loaded)?;
    print_summary(&result);

    if let Some(dir) = output_dir {
        let run_dir = save_artifacts(&result, dir, parquet)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn sweep_cmd(
    config_path: Option<&Path>,
    inputs: &InputArgs,
    windows: Vec<usize>,
    levels: &[f64],
    cost_rates: Vec<f64>,
    top: usize,
    output: Option<&Path>,
) -> Result<()> {
    let base = load_config(config_path, inputs)?;
    let opts = load_options(&base, inputs)?;
    let loaded = load_inputs(&base.required_fields(), &base.required_assets(), &opts)?;

    tracing::info!(base_run_id = %base.run_id(), synthetic = opts.synthetic, "starting sweep");
    let cost_rates = if cost_rates.is_empty() {
        vec![base.portfolio.cost_rate]
    } else {
        cost_rates
    };
    let grid = ParamGrid {
        windows,
        thresholds: ParamGrid::symmetric_thresholds(levels),
        cost_rates,
    };
    let results = run_sweep(&grid, &base, &loaded);
    if results.is_empty() {
        bail!(
            "no grid point produced a result ({} failed)",
            results.failures().len()
        );
    }

    print_sweep_table(&results, top);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&results).context("serializing sweep results")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Sweep results saved to: {}", path.display());
    }
    Ok(())
}

fn validate_cmd(path: &Path) -> Result<()> {
    let config =
        BacktestConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?;
    config.validate().context("invalid configuration")?;

    println!("Config OK: {}", path.display());
    println!("Run ID:         {}", config.run_id());
    println!("Macro fields:   {}", config.required_fields().join(", "));
    println!("Assets:         {}", config.required_assets().join(", "));
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    let fmt_date = |d: Option<NaiveDate>| d.map_or_else(|| "-".to_string(), |d| d.to_string());

    println!();
    println!("=== Backtest Result ===");
    println!("Run ID:         {}", result.short_id());
    println!(
        "Period:         {} to {}",
        fmt_date(result.start_date),
        fmt_date(result.end_date)
    );
    println!(
        "Days:           {} ({} warmup)",
        result.nav.len(),
        result.warmup_days
    );
    println!("Signal:         {}", result.signal_names.join(" + "));
    println!(
        "Trades:         {} on {} rebalances",
        result.trade_stats.trade_count, result.trade_stats.rebalance_count
    );
    println!("Total Costs:    {:.2}", result.total_costs);
    println!();
    println!("--- Performance ---");
    println!("Final NAV:      {:.2}", result.final_nav().unwrap_or(0.0));
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("CAGR:           {:.2}%", m.cagr * 100.0);
    println!("Volatility:     {:.2}%", m.volatility * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Calmar:         {:.3}", m.calmar);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("VaR 95%:        {:.2}%", m.var_95 * 100.0);
    println!(
        "Best/Worst Mo:  {:.2}% / {:.2}% ({:.0}% positive)",
        m.best_month * 100.0,
        m.worst_month * 100.0,
        m.positive_months * 100.0
    );
    if !result.overlay_events.is_empty() {
        println!(
            "Overlay:        {} transitions{}",
            result.overlay_events.len(),
            if result.overlay_active_at_end { " (active at end)" } else { "" }
        );
    }
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
}

fn print_sweep_table(results: &SweepResults, top: usize) {
    println!();
    println!(
        "{:>4}  {:>6}  {:>6}  {:>7}  {:>8}  {:>9}  {:>8}  {:>12}",
        "rank", "window", "thresh", "cost", "sharpe", "return", "max dd", "run id"
    );
    for (i, r) in results.top_n(top).iter().enumerate() {
        println!(
            "{:>4}  {:>6}  {:>6.2}  {:>7.4}  {:>8.3}  {:>8.2}%  {:>7.2}%  {:>12}",
            i + 1,
            r.config.signal.window,
            r.config.allocation.threshold_high,
            r.config.portfolio.cost_rate,
            r.metrics.sharpe,
            r.metrics.total_return * 100.0,
            r.metrics.max_drawdown * 100.0,
            r.short_id()
        );
    }
    if !results.failures().is_empty() {
        println!();
        for f in results.failures() {
            println!("FAILED {}: {}", &f.run_id[..f.run_id.len().min(12)], f.error);
        }
    }
}
