//! End-to-end scenarios through signal → allocation → simulation.

use chrono::NaiveDate;
use macrolab_core::allocation::{allocate_series, AssetPair, ThresholdPolicy, Thresholds};
use macrolab_core::data::{align_inputs, Table};
use macrolab_core::domain::WeightVector;
use macrolab_core::signal::{NormalizeSettings, SignalSource, YieldCurveSignal};
use macrolab_core::simulator::{
    simulate, OverlayTransition, RiskOverlay, SimulatorConfig,
};
use macrolab_core::TimeSeries;

const CAPITAL: f64 = 1_000_000.0;

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap() + chrono::Duration::days(i as i64)
}

fn policy() -> ThresholdPolicy {
    ThresholdPolicy::new(Thresholds { high: 0.5, low: -0.5 }, AssetPair::new("SPY", "TLT")).unwrap()
}

fn signal(values: &[f64]) -> TimeSeries<f64> {
    TimeSeries::new((0..values.len()).map(day).collect(), values.to_vec()).unwrap()
}

fn prices(spy: &[f64], tlt: &[f64]) -> Table {
    Table::from_rows(
        spy.iter()
            .zip(tlt)
            .enumerate()
            .map(|(i, (s, t))| (day(i), vec![("SPY", *s), ("TLT", *t)])),
    )
    .unwrap()
}

// ── Constant signal ──────────────────────────────────────────────────

#[test]
fn constant_signal_holds_nav_at_initial_capital() {
    let n = 300;
    let macro_data = Table::from_rows(
        (0..n).map(|i| (day(i), vec![("yield_10y", 4.0), ("yield_2y", 3.0)])),
    )
    .unwrap();
    let prices = prices(&vec![420.0; n], &vec![95.0; n]);
    let aligned = align_inputs(&macro_data, &prices, None, None);

    let normalized = YieldCurveSignal::default()
        .generate(&aligned.macro_data, &NormalizeSettings::default())
        .unwrap();
    assert_eq!(normalized.len(), n - 251);
    assert!(normalized.values().iter().all(|&z| z == 0.0));

    let targets = allocate_series(&normalized, &policy());
    assert!(targets
        .values()
        .iter()
        .all(|w| w.get("SPY") == 0.5 && w.get("TLT") == 0.5));

    let config = SimulatorConfig {
        initial_capital: CAPITAL,
        cost_rate: 0.0,
        ..SimulatorConfig::default()
    };
    let out = simulate(config, &aligned.dates, &targets, &aligned.prices).unwrap();
    assert_eq!(out.nav.len(), n - 251);
    assert!(out.nav.iter().all(|p| p.nav == CAPITAL));
    assert!(out.nav.iter().all(|p| p.drawdown == 0.0));
}

// ── Threshold crossing ───────────────────────────────────────────────

#[test]
fn signal_jump_rebalances_with_proportional_cost() {
    let targets = allocate_series(&signal(&[0.0, 0.6]), &policy());
    let prices = prices(&[100.0, 100.0], &[50.0, 50.0]);
    let config = SimulatorConfig {
        initial_capital: CAPITAL,
        cost_rate: 0.001,
        initial_weights: Some(WeightVector::split("SPY", "TLT")),
        ..SimulatorConfig::default()
    };

    let out = simulate(config, prices.dates(), &targets, &prices).unwrap();

    assert_eq!(out.nav[0].nav, CAPITAL);
    assert_eq!(out.trades.len(), 2);
    for trade in &out.trades {
        assert_eq!(trade.date, day(1));
        assert!((trade.weight_delta.abs() - 0.5).abs() < 1e-12);
        assert!((trade.cost - 500.0).abs() < 1e-9);
    }
    assert!(out.trades.iter().any(|t| t.asset == "SPY" && t.is_buy()));
    assert!(out.trades.iter().any(|t| t.asset == "TLT" && !t.is_buy()));
    assert!((out.total_costs - 1_000.0).abs() < 1e-9);
    assert!((out.nav[1].nav - 999_000.0).abs() < 1e-6);
    assert_eq!(out.weights.values()[1].get("SPY"), Some(&1.0));
}

// ── Risk overlay ─────────────────────────────────────────────────────

#[test]
fn drawdown_overlay_forces_risk_off_until_reentry() {
    let targets = allocate_series(&signal(&[1.0; 6]), &policy());
    let prices = prices(
        &[100.0, 79.0, 79.0, 79.0, 79.0, 80.0],
        &[50.0, 50.0, 50.0, 55.0, 60.0, 60.0],
    );
    let config = SimulatorConfig {
        initial_capital: CAPITAL,
        cost_rate: 0.0,
        initial_weights: Some(WeightVector::single("SPY")),
        overlay: Some(RiskOverlay {
            max_drawdown_limit: 0.20,
            drawdown_reentry: 0.10,
            derisked_weights: WeightVector::single("TLT"),
        }),
        ..SimulatorConfig::default()
    };

    let out = simulate(config, prices.dates(), &targets, &prices).unwrap();

    // 21% fall on day 1 trips the limit; the overlay applies from day 2.
    assert!((out.nav[1].drawdown + 0.21).abs() < 1e-12);
    assert!(!out.nav[1].overlay_active);
    assert!(out.nav[2].overlay_active);
    assert_eq!(out.weights.values()[2].get("TLT"), Some(&1.0));

    // Day 3: -13.1% is still outside the re-entry band.
    assert!(out.nav[3].overlay_active);
    // Day 4: -5.2% recovers; risk-on again from day 5.
    assert!(out.nav[4].overlay_active);
    assert!(!out.nav[5].overlay_active);
    assert_eq!(out.weights.values()[5].get("SPY"), Some(&1.0));

    let transitions: Vec<_> = out
        .overlay_events
        .iter()
        .map(|e| (e.date, e.transition))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (day(1), OverlayTransition::Activated),
            (day(4), OverlayTransition::Deactivated),
        ]
    );
    assert!(!out.overlay_active_at_end);
}

#[test]
fn overlay_ignores_signal_while_active() {
    // Signal is risk-on every day, but the overlay keeps the book in TLT.
    let targets = allocate_series(&signal(&[1.0; 4]), &policy());
    let prices = prices(&[100.0, 70.0, 60.0, 50.0], &[50.0; 4]);
    let config = SimulatorConfig {
        cost_rate: 0.0,
        initial_weights: Some(WeightVector::single("SPY")),
        overlay: Some(RiskOverlay {
            max_drawdown_limit: 0.2,
            drawdown_reentry: 0.0,
            derisked_weights: WeightVector::single("TLT"),
        }),
        ..SimulatorConfig::default()
    };
    let out = simulate(config, prices.dates(), &targets, &prices).unwrap();
    // Day 2 still earns day 1's SPY return, then rotates into TLT, so the
    // further SPY slide on day 3 no longer hurts.
    assert!((out.nav[2].nav - 600_000.0).abs() < 1e-6);
    assert!((out.nav[3].nav - out.nav[2].nav).abs() < 1e-9);
    assert!(out.overlay_active_at_end);
}
