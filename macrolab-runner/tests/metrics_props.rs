//! Property tests for the performance analyzer.
//!
//! 1. Drawdown: never positive; max drawdown is the series minimum
//! 2. Episodes: disjoint, ordered, depth matches the drawdown series
//! 3. Ratios: finite for any positive NAV path

use chrono::NaiveDate;
use proptest::prelude::*;

use macrolab_core::TimeSeries;
use macrolab_runner::metrics::{
    analyze, analyze_from_capital, drawdown_series, drawdown_series_from, value_at_risk,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_nav() -> impl Strategy<Value = TimeSeries<f64>> {
    prop::collection::vec(-0.1..0.1_f64, 1..200).prop_map(|returns| {
        let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        let mut nav = 1_000_000.0;
        let mut values = vec![nav];
        for r in returns {
            nav *= 1.0 + r;
            values.push(nav);
        }
        let dates = (0..values.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        TimeSeries::new(dates, values).unwrap()
    })
}

// ── 1. Drawdown ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn drawdown_never_positive(nav in arb_nav()) {
        let dd = drawdown_series(nav.values());
        prop_assert_eq!(dd.len(), nav.len());
        prop_assert!(dd.iter().all(|d| *d <= 0.0));
        prop_assert_eq!(dd[0], 0.0);

        let m = analyze(&nav);
        let min = dd.iter().copied().fold(0.0, f64::min);
        prop_assert_eq!(m.max_drawdown, min);
    }
}

// ── 2. Episodes ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn episodes_are_ordered_and_disjoint(nav in arb_nav()) {
        let m = analyze(&nav);
        let dd = drawdown_series(nav.values());

        for ep in &m.drawdown_episodes {
            prop_assert!(ep.start <= ep.trough);
            if let Some(rec) = ep.recovery {
                prop_assert!(ep.trough < rec);
            }
            prop_assert!(ep.depth < 0.0);
            prop_assert!(ep.length >= 1);
        }
        for pair in m.drawdown_episodes.windows(2) {
            let end = pair[0].recovery.expect("only the last episode may be open");
            prop_assert!(end <= pair[1].start);
        }
        if let Some(worst) = m
            .drawdown_episodes
            .iter()
            .map(|e| e.depth)
            .reduce(f64::min)
        {
            prop_assert_eq!(worst, dd.iter().copied().fold(0.0, f64::min));
        }
    }
}

proptest! {
    #[test]
    fn capital_anchor_never_hides_a_drawdown(nav in arb_nav(), capital in 900_000.0..1_100_000.0_f64) {
        let anchored = analyze_from_capital(&nav, capital);
        let plain = analyze(&nav);
        let dd = drawdown_series_from(capital, nav.values());
        prop_assert_eq!(anchored.max_drawdown, dd.iter().copied().fold(0.0, f64::min));
        prop_assert!(anchored.max_drawdown <= plain.max_drawdown || capital < nav.values()[0]);
        prop_assert_eq!(anchored.trading_days, nav.len());
    }
}

// ── 3. Ratios ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn metrics_are_finite(nav in arb_nav()) {
        let m = analyze(&nav);
        for v in [
            m.total_return, m.annualized_return, m.cagr, m.volatility, m.sharpe,
            m.sortino, m.calmar, m.win_rate, m.var_95, m.cvar_95, m.skew, m.kurtosis,
            m.best_month, m.worst_month, m.positive_months,
        ] {
            prop_assert!(v.is_finite());
        }
        prop_assert!((0.0..=1.0).contains(&m.win_rate));
        prop_assert!((0.0..=1.0).contains(&m.positive_months));
        prop_assert!(m.worst_month <= m.best_month);
        prop_assert!(m.cvar_95 <= m.var_95 + 1e-15);
    }

    #[test]
    fn var_is_monotone_in_alpha(returns in prop::collection::vec(-0.1..0.1_f64, 1..100)) {
        prop_assert!(value_at_risk(&returns, 0.01) <= value_at_risk(&returns, 0.05));
        prop_assert!(value_at_risk(&returns, 0.05) <= value_at_risk(&returns, 0.5));
    }
}
