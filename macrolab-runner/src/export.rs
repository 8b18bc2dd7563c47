//! Artifact export: JSON, CSV, Parquet and Markdown.
//!
//! - **JSON**: the full `BacktestResult` with schema versioning
//! - **CSV**: NAV path, trade log and held weights for external tools
//! - **Parquet**: the NAV path as a columnar file (optional)
//! - **Markdown**: a human-readable run report
//!
//! Persisted results carry `schema_version`; newer versions are rejected on load.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;

use macrolab_core::domain::{NavPoint, Trade};
use macrolab_core::simulator::OverlayTransition;
use macrolab_core::TimeSeries;

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// NAV path as CSV.
///
/// Columns: date, nav, gross_return, net_return, drawdown, cost, overlay_active
pub fn export_nav_csv(nav: &[NavPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "nav",
        "gross_return",
        "net_return",
        "drawdown",
        "cost",
        "overlay_active",
    ])?;
    for p in nav {
        wtr.write_record([
            p.date.to_string(),
            format!("{:.6}", p.nav),
            format!("{:.8}", p.gross_return),
            format!("{:.8}", p.net_return),
            format!("{:.8}", p.drawdown),
            format!("{:.6}", p.cost),
            p.overlay_active.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Trade log as CSV.
///
/// Columns: date, asset, side, weight_delta, traded_notional, cost
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "asset",
        "side",
        "weight_delta",
        "traded_notional",
        "cost",
    ])?;
    for t in trades {
        wtr.write_record([
            t.date.to_string(),
            t.asset.clone(),
            if t.is_buy() { "buy" } else { "sell" }.to_string(),
            format!("{:.8}", t.weight_delta),
            format!("{:.6}", t.traded_notional),
            format!("{:.6}", t.cost),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Held weights as a wide CSV: one column per asset ever held, 0 where absent.
pub fn export_weights_csv(weights: &TimeSeries<BTreeMap<String, f64>>) -> Result<String> {
    let assets: BTreeSet<&str> = weights
        .values()
        .iter()
        .flat_map(|w| w.keys().map(|k| k.as_str()))
        .collect();

    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["date".to_string()];
    header.extend(assets.iter().map(|a| a.to_string()));
    wtr.write_record(&header)?;

    for (date, w) in weights.iter() {
        let mut row = vec![date.to_string()];
        row.extend(
            assets
                .iter()
                .map(|a| format!("{:.8}", w.get(*a).copied().unwrap_or(0.0))),
        );
        wtr.write_record(&row)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Parquet export ─────────────────────────────────────────────────

fn nav_to_dataframe(nav: &[NavPoint]) -> Result<DataFrame> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).context("epoch date")?;
    let dates: Vec<i32> = nav.iter().map(|p| (p.date - epoch).num_days() as i32).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .context("date cast")?,
        Column::new("nav".into(), nav.iter().map(|p| p.nav).collect::<Vec<f64>>()),
        Column::new(
            "net_return".into(),
            nav.iter().map(|p| p.net_return).collect::<Vec<f64>>(),
        ),
        Column::new(
            "drawdown".into(),
            nav.iter().map(|p| p.drawdown).collect::<Vec<f64>>(),
        ),
        Column::new("cost".into(), nav.iter().map(|p| p.cost).collect::<Vec<f64>>()),
        Column::new(
            "overlay_active".into(),
            nav.iter().map(|p| p.overlay_active).collect::<Vec<bool>>(),
        ),
    ])
    .context("dataframe creation")
}

/// Write the NAV path to a Parquet file.
pub fn write_nav_parquet(nav: &[NavPoint], path: &Path) -> Result<()> {
    let mut df = nav_to_dataframe(nav)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .context("write parquet")?;
    Ok(())
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates `run_{short_id}/` under `output_dir` containing:
/// - `result.json`: the full `BacktestResult`
/// - `nav.csv`, `trades.csv`, `weights.csv`
/// - `report.md`
/// - `nav.parquet` when `parquet` is set
///
/// The directory name derives from the config hash, so re-running the same
/// config overwrites its artifacts. Returns the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path, parquet: bool) -> Result<PathBuf> {
    let run_dir = output_dir.join(format!("run_{}", result.short_id()));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("result.json"), export_json(result)?)?;
    std::fs::write(run_dir.join("nav.csv"), export_nav_csv(&result.nav)?)?;
    std::fs::write(run_dir.join("trades.csv"), export_trades_csv(&result.trades)?)?;
    std::fs::write(run_dir.join("weights.csv"), export_weights_csv(&result.weights)?)?;
    std::fs::write(run_dir.join("report.md"), generate_report(result))?;
    if parquet {
        write_nav_parquet(&result.nav, &run_dir.join("nav.parquet"))?;
    }

    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's result.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a single backtest run.
pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);
    let cfg = &result.config;

    md.push_str("# Macro Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run ID | {} |\n", result.short_id()));
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        fmt_date(result.start_date),
        fmt_date(result.end_date)
    ));
    md.push_str(&format!(
        "| Days | {} ({} warmup) |\n",
        result.nav.len(),
        result.warmup_days
    ));
    md.push_str(&format!(
        "| Initial Capital | {:.0} |\n",
        cfg.backtest.initial_capital
    ));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    if result.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    md.push_str("## Strategy\n\n");
    md.push_str(&format!(
        "- Signal: {} (window {})\n",
        result.signal_names.join(" + "),
        cfg.signal.window
    ));
    md.push_str(&format!(
        "- Allocation: {} above {:+.2}, {} below {:+.2}, 50/50 between\n",
        cfg.allocation.risk_on_asset,
        cfg.allocation.threshold_high,
        cfg.allocation.risk_off_asset,
        cfg.allocation.threshold_low
    ));
    md.push_str(&format!(
        "- Costs: {:.1} bps per unit traded\n",
        cfg.portfolio.cost_rate * 10_000.0
    ));
    match cfg.risk.max_drawdown_limit {
        Some(limit) => md.push_str(&format!(
            "- Risk overlay: de-risk at {:.1}% drawdown\n",
            limit * 100.0
        )),
        None => md.push_str("- Risk overlay: off\n"),
    }
    md.push('\n');

    let m = &result.metrics;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total Return | {:.2}% |\n", m.total_return * 100.0));
    md.push_str(&format!("| CAGR | {:.2}% |\n", m.cagr * 100.0));
    md.push_str(&format!("| Volatility | {:.2}% |\n", m.volatility * 100.0));
    md.push_str(&format!("| Sharpe | {:.3} |\n", m.sharpe));
    md.push_str(&format!("| Sortino | {:.3} |\n", m.sortino));
    md.push_str(&format!("| Calmar | {:.3} |\n", m.calmar));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", m.max_drawdown * 100.0));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| VaR 95% | {:.2}% |\n", m.var_95 * 100.0));
    md.push_str(&format!("| CVaR 95% | {:.2}% |\n", m.cvar_95 * 100.0));
    md.push_str(&format!("| Skew / Kurtosis | {:.2} / {:.2} |\n", m.skew, m.kurtosis));
    md.push_str(&format!(
        "| Best / Worst Month | {:.2}% / {:.2}% |\n",
        m.best_month * 100.0,
        m.worst_month * 100.0
    ));
    md.push_str(&format!("| Positive Months | {:.1}% |\n", m.positive_months * 100.0));
    md.push('\n');

    let t = &result.trade_stats;
    md.push_str("## Trading\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Rebalances | {} |\n", t.rebalance_count));
    md.push_str(&format!("| Trades | {} ({} buys, {} sells) |\n", t.trade_count, t.buys, t.sells));
    md.push_str(&format!("| Avg Turnover | {:.3} |\n", t.avg_turnover));
    md.push_str(&format!("| Total Costs | {:.2} |\n", result.total_costs));
    md.push('\n');

    if !result.overlay_events.is_empty() {
        md.push_str("## Risk Overlay\n\n");
        for e in &result.overlay_events {
            let verb = match e.transition {
                OverlayTransition::Activated => "activated",
                OverlayTransition::Deactivated => "released",
            };
            md.push_str(&format!(
                "- {}: {verb} at {:.2}% drawdown\n",
                e.date,
                e.drawdown * 100.0
            ));
        }
        md.push('\n');
    }

    if !m.drawdown_episodes.is_empty() {
        let mut worst: Vec<_> = m.drawdown_episodes.iter().collect();
        worst.sort_by(|a, b| a.depth.total_cmp(&b.depth));
        md.push_str("## Worst Drawdowns\n\n");
        md.push_str("| Start | Trough | Recovery | Depth | Days |\n");
        md.push_str("| --- | --- | --- | --- | --- |\n");
        for ep in worst.into_iter().take(5) {
            md.push_str(&format!(
                "| {} | {} | {} | {:.2}% | {} |\n",
                ep.start,
                ep.trough,
                fmt_date(ep.recovery),
                ep.depth * 100.0,
                ep.length
            ));
        }
        md.push('\n');
    }

    md
}

// ─── Helpers ────────────────────────────────────────────────────────

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "-".to_string(), |d| d.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fixtures::{config, tables};
    use crate::runner::run_backtest;

    fn assert_navs_close(a: &[NavPoint], b: &[NavPoint]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert_eq!(x.date, y.date);
            assert!((x.nav - y.nav).abs() < 1e-6);
        }
    }

    fn sample_result() -> BacktestResult {
        let (macro_data, prices) = tables(120);
        let mut cfg = config(20);
        cfg.risk.max_drawdown_limit = Some(0.05);
        run_backtest(&cfg, &macro_data, &prices, "abc", false).unwrap()
    }

    #[test]
    fn json_round_trip() {
        let result = sample_result();
        let json = export_json(&result).unwrap();
        let back = import_json(&json).unwrap();
        assert_eq!(back.run_id, result.run_id);
        assert_navs_close(&back.nav, &result.nav);
        assert_eq!(back.trades.len(), result.trades.len());
        assert_eq!(back.signal.len(), result.signal.len());
        assert_eq!(back.config, result.config);
    }

    #[test]
    fn newer_schema_rejected() {
        let mut result = sample_result();
        result.schema_version = SCHEMA_VERSION + 1;
        let json = export_json(&result).unwrap();
        let err = import_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version"));
    }

    #[test]
    fn missing_schema_version_defaults() {
        let result = sample_result();
        let mut value: serde_json::Value = serde_json::from_str(&export_json(&result).unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("schema_version");
        let back = import_json(&value.to_string()).unwrap();
        assert_eq!(back.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn nav_csv_has_one_row_per_date() {
        let result = sample_result();
        let csv = export_nav_csv(&result.nav).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), result.nav.len() + 1);
        assert!(lines[0].starts_with("date,nav,"));
    }

    #[test]
    fn trades_csv_marks_sides() {
        let result = sample_result();
        let csv = export_trades_csv(&result.trades).unwrap();
        assert_eq!(csv.lines().count(), result.trades.len() + 1);
        assert!(csv.contains(",buy,"));
    }

    #[test]
    fn weights_csv_has_asset_columns() {
        let result = sample_result();
        let csv = export_weights_csv(&result.weights).unwrap();
        let header = csv.lines().next().unwrap();
        assert!(header.starts_with("date"));
        assert!(header.contains("SPY") || header.contains("TLT"));
    }

    #[test]
    fn save_and_load_artifacts() {
        let result = sample_result();
        let dir = tempfile::tempdir().unwrap();
        let run_dir = save_artifacts(&result, dir.path(), true).unwrap();

        for name in ["result.json", "nav.csv", "trades.csv", "weights.csv", "report.md", "nav.parquet"] {
            assert!(run_dir.join(name).exists(), "missing {name}");
        }
        assert!(run_dir.ends_with(format!("run_{}", result.short_id())));

        let loaded = load_artifacts(&run_dir).unwrap();
        assert_navs_close(&loaded.nav, &result.nav);
    }

    #[test]
    fn parquet_reads_back() {
        let result = sample_result();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav.parquet");
        write_nav_parquet(&result.nav, &path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let df = ParquetReader::new(file).finish().unwrap();
        assert_eq!(df.height(), result.nav.len());
        assert!(df.column("nav").is_ok());
    }

    #[test]
    fn report_contains_sections() {
        let result = sample_result();
        let md = generate_report(&result);
        assert!(md.contains("# Macro Backtest Report"));
        assert!(md.contains("## Performance Summary"));
        assert!(md.contains("yield_curve"));
        assert!(md.contains("de-risk at 5.0% drawdown"));
        assert!(!md.contains("SYNTHETIC"));
    }
}
