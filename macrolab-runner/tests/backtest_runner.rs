use chrono::{Datelike, NaiveDate, Weekday};
use std::fmt::Write as _;
use std::path::Path;

use macrolab_core::simulator::OverlayTransition;
use macrolab_runner::{
    run_from_options, run_loaded, run_sweep, BacktestConfig, LoadOptions, ParamGrid, RunError,
};

fn weekdays(n: usize) -> Vec<NaiveDate> {
    NaiveDate::from_ymd_opt(2021, 1, 4)
        .unwrap()
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(n)
        .collect()
}

/// Daily prices; macro observations only every tenth trading day.
fn write_inputs(dir: &Path, n: usize) -> LoadOptions {
    let dates = weekdays(n);

    let mut prices = String::from("date,SPY,TLT\n");
    for (i, d) in dates.iter().enumerate() {
        writeln!(prices, "{d},{},{}", 100.0 + i as f64, 100.0 - 0.2 * i as f64).unwrap();
    }

    let mut macro_csv = String::from("date,yield_10y,yield_2y\n");
    for (k, d) in dates.iter().step_by(10).enumerate() {
        writeln!(macro_csv, "{d},{},1.5", 2.0 + (k % 3) as f64 * 0.5).unwrap();
    }

    let macro_path = dir.join("macro.csv");
    let prices_path = dir.join("prices.csv");
    std::fs::write(&macro_path, macro_csv).unwrap();
    std::fs::write(&prices_path, prices).unwrap();

    LoadOptions {
        macro_path: Some(macro_path),
        prices_path: Some(prices_path),
        ..LoadOptions::default()
    }
}

fn config_from_toml(text: &str) -> BacktestConfig {
    BacktestConfig::from_toml(text).unwrap()
}

#[test]
fn csv_inputs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let opts = write_inputs(dir.path(), 80);
    let config = config_from_toml(
        r#"
        [signal]
        window = 10
        "#,
    );

    let result = run_from_options(&config, &opts).unwrap();

    // Sparse macro rows are forward-filled onto every trading day.
    assert_eq!(result.warmup_days, 9);
    assert_eq!(result.nav.len(), 71);
    assert!(!result.has_synthetic);
    assert_eq!(result.metrics.trading_days, 71);
    assert!(result.trade_stats.rebalance_count >= 1);
    assert!(result.nav.iter().all(|p| p.nav > 0.0));
}

#[test]
fn monthly_rebalancing_trades_only_on_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let opts = write_inputs(dir.path(), 80);
    let daily = run_from_options(&config_from_toml("[signal]\nwindow = 10\n"), &opts).unwrap();
    let monthly = run_from_options(
        &config_from_toml(
            r#"
            [signal]
            window = 10

            [portfolio]
            rebalance_frequency = "monthly"
            "#,
        ),
        &opts,
    )
    .unwrap();

    assert_eq!(monthly.nav.len(), daily.nav.len());
    assert!(monthly.trade_stats.rebalance_count < daily.trade_stats.rebalance_count);

    let dates: Vec<NaiveDate> = monthly.nav.iter().map(|p| p.date).collect();
    for trade in &monthly.trades {
        let i = dates.iter().position(|d| *d == trade.date).unwrap();
        if i == 0 {
            continue;
        }
        let prev = dates[i - 1];
        let month_end = trade.date.succ_opt().unwrap().day() == 1;
        assert!(
            prev.month() != trade.date.month() || month_end,
            "off-schedule trade on {}",
            trade.date
        );
    }
}

#[test]
fn date_range_restricts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let opts = write_inputs(dir.path(), 80);
    let start = weekdays(80)[20];
    let mut config = config_from_toml("[signal]\nwindow = 10\n");
    config.backtest.start_date = Some(start);

    let result = run_from_options(&config, &opts).unwrap();
    assert_eq!(result.nav.len(), 60 - 9);
    assert!(result.nav[0].date > start);
}

#[test]
fn missing_file_is_a_data_error() {
    let opts = LoadOptions {
        macro_path: Some("/nonexistent/macro.csv".into()),
        prices_path: Some("/nonexistent/prices.csv".into()),
        ..LoadOptions::default()
    };
    let err = run_from_options(&BacktestConfig::default(), &opts).unwrap_err();
    assert!(matches!(err, RunError::Data(_)));
}

#[test]
fn drawdown_overlay_derisks_through_runner() {
    let dir = tempfile::tempdir().unwrap();
    let dates = weekdays(60);

    // SPY rallies, then gaps down 30% on day 30 and stays there.
    let mut prices = String::from("date,SPY,TLT\n");
    for (i, d) in dates.iter().enumerate() {
        let spy = if i < 30 { 100.0 + i as f64 } else { 90.0 };
        writeln!(prices, "{d},{spy},100").unwrap();
    }
    let mut macro_csv = String::from("date,yield_10y,yield_2y\n");
    for (i, d) in dates.iter().enumerate() {
        writeln!(macro_csv, "{d},{},1.0", 2.0 + (i % 4) as f64 * 0.1).unwrap();
    }
    std::fs::write(dir.path().join("m.csv"), macro_csv).unwrap();
    std::fs::write(dir.path().join("p.csv"), prices).unwrap();

    // Thresholds below any reachable z-score: always risk-on.
    let config = config_from_toml(
        r#"
        [signal]
        window = 10

        [allocation]
        threshold_high = -10.0
        threshold_low = -10.0

        [risk]
        max_drawdown_limit = 0.2
        "#,
    );
    let opts = LoadOptions {
        macro_path: Some(dir.path().join("m.csv")),
        prices_path: Some(dir.path().join("p.csv")),
        ..LoadOptions::default()
    };

    let result = run_from_options(&config, &opts).unwrap();

    assert_eq!(result.overlay_events.len(), 1);
    let event = &result.overlay_events[0];
    assert_eq!(event.transition, OverlayTransition::Activated);
    assert_eq!(event.date, dates[30]);
    assert!(result.overlay_active_at_end);
    assert!(result.metrics.max_drawdown <= -0.2);

    // After activation the book moves into TLT and stays there.
    let last = result.weights.values().last().unwrap();
    assert!((last.get("TLT").copied().unwrap_or(0.0) - 1.0).abs() < 1e-9);
}

#[test]
fn synthetic_run_is_reproducible() {
    let opts = LoadOptions {
        synthetic: true,
        start: NaiveDate::from_ymd_opt(2015, 1, 1),
        end: NaiveDate::from_ymd_opt(2016, 12, 31),
        ..LoadOptions::default()
    };
    let config = config_from_toml("[signal]\nwindow = 63\n");

    let a = run_from_options(&config, &opts).unwrap();
    let b = run_from_options(&config, &opts).unwrap();

    assert!(a.has_synthetic);
    assert_eq!(a.dataset_hash, b.dataset_hash);
    assert_eq!(a.run_id, b.run_id);
    assert_eq!(a.nav, b.nav);
    assert_eq!(a.trades, b.trades);
}

#[test]
fn sweep_over_loaded_inputs_is_deterministic() {
    let opts = LoadOptions {
        synthetic: true,
        start: NaiveDate::from_ymd_opt(2018, 1, 1),
        end: NaiveDate::from_ymd_opt(2019, 12, 31),
        ..LoadOptions::default()
    };
    let base = BacktestConfig::default();
    let loaded = macrolab_runner::load_inputs(
        &base.required_fields(),
        &base.required_assets(),
        &opts,
    )
    .unwrap();
    let grid = ParamGrid {
        windows: vec![21, 63],
        thresholds: ParamGrid::symmetric_thresholds(&[0.25, 0.5, 1.0]),
        cost_rates: vec![0.0, 0.001],
    };

    let first = run_sweep(&grid, &base, &loaded);
    let second = run_sweep(&grid, &base, &loaded);

    assert_eq!(first.len(), 12);
    assert_eq!(first.len(), second.len());
    for (left, right) in first.ranked().iter().zip(second.ranked()) {
        assert_eq!(left.run_id, right.run_id);
        assert_eq!(left.nav, right.nav);
    }

    let best = first.best().unwrap();
    let rerun = run_loaded(&best.config, &loaded).unwrap();
    assert_eq!(rerun.metrics.sharpe, best.metrics.sharpe);
}
