//! Performance analysis: pure functions over a NAV series and trade log.
//!
//! Every metric is a pure function: NAV values and/or trades in, scalar out.
//! Zero-variance inputs yield 0.0 ratios rather than errors.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use macrolab_core::domain::Trade;
use macrolab_core::TimeSeries;

/// Trading days per year used for annualisation.
pub const TRADING_DAYS: f64 = 252.0;

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return: f64,
    /// Mean daily return × 252.
    pub annualized_return: f64,
    pub cagr: f64,
    /// Sample std of daily returns × √252.
    pub volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    /// Most negative drawdown (≤ 0).
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// 5th percentile of daily returns.
    pub var_95: f64,
    /// Mean of daily returns at or below `var_95`.
    pub cvar_95: f64,
    pub best_day: f64,
    pub worst_day: f64,
    /// Adjusted Fisher-Pearson skewness of daily returns.
    #[serde(default)]
    pub skew: f64,
    /// Excess kurtosis of daily returns (bias-corrected).
    #[serde(default)]
    pub kurtosis: f64,
    /// Calendar-month returns, compounded from the daily returns.
    #[serde(default)]
    pub best_month: f64,
    #[serde(default)]
    pub worst_month: f64,
    /// Fraction of calendar months with a positive return.
    #[serde(default)]
    pub positive_months: f64,
    pub trading_days: usize,
    pub drawdown_episodes: Vec<DrawdownEpisode>,
}

/// A maximal run of dates with NAV below its running peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownEpisode {
    /// First date below the peak.
    pub start: NaiveDate,
    /// Date of the deepest drawdown in the run.
    pub trough: NaiveDate,
    /// First date back at the peak; `None` if the series ends underwater.
    pub recovery: Option<NaiveDate>,
    /// Drawdown at the trough (< 0).
    pub depth: f64,
    /// Observations spent below the peak.
    pub length: usize,
}

impl DrawdownEpisode {
    pub fn is_recovered(&self) -> bool {
        self.recovery.is_some()
    }
}

/// Analyze a NAV series on its own.
///
/// The first observation is the opening peak and the base for returns.
pub fn analyze(nav: &TimeSeries<f64>) -> Metrics {
    let values = nav.values();
    let return_dates = nav.dates().get(1..).unwrap_or_default();
    analyze_path(nav, values.to_vec(), return_dates)
}

/// Analyze a simulated NAV series that opened at `initial_capital` before
/// its first date.
///
/// Returns, drawdowns and episodes are measured from the capital, so a cost
/// paid on the first date counts. The drawdowns match the simulator's
/// `NavPoint::drawdown` column exactly.
pub fn analyze_from_capital(nav: &TimeSeries<f64>, initial_capital: f64) -> Metrics {
    let path = std::iter::once(initial_capital)
        .chain(nav.values().iter().copied())
        .collect();
    analyze_path(nav, path, nav.dates())
}

/// `path` is the NAV path returns are taken over (optionally led by an
/// opening value); `path[0]` is the opening peak.
fn analyze_path(nav: &TimeSeries<f64>, path: Vec<f64>, return_dates: &[NaiveDate]) -> Metrics {
    let values = nav.values();
    let returns = daily_returns(&path);
    let opening_peak = path.first().copied().unwrap_or(0.0);
    let drawdowns = drawdown_series_from(opening_peak, values);
    let max_drawdown = drawdowns.iter().copied().fold(0.0, f64::min);
    let var = value_at_risk(&returns, 0.05);
    let growth = cagr(&path);
    let months: Vec<f64> = monthly_returns(return_dates, &returns).into_values().collect();

    Metrics {
        total_return: total_return(&path),
        annualized_return: mean_f64(&returns) * TRADING_DAYS,
        cagr: growth,
        volatility: volatility(&returns),
        sharpe: sharpe_ratio(&returns),
        sortino: sortino_ratio(&returns),
        calmar: calmar_ratio(growth, max_drawdown),
        max_drawdown,
        win_rate: win_rate(&returns),
        avg_win: mean_f64(&returns.iter().copied().filter(|r| *r > 0.0).collect::<Vec<_>>()),
        avg_loss: mean_f64(&returns.iter().copied().filter(|r| *r < 0.0).collect::<Vec<_>>()),
        var_95: var,
        cvar_95: conditional_var(&returns, var),
        best_day: returns.iter().copied().reduce(f64::max).unwrap_or(0.0),
        worst_day: returns.iter().copied().reduce(f64::min).unwrap_or(0.0),
        skew: skewness(&returns),
        kurtosis: excess_kurtosis(&returns),
        best_month: months.iter().copied().reduce(f64::max).unwrap_or(0.0),
        worst_month: months.iter().copied().reduce(f64::min).unwrap_or(0.0),
        positive_months: if months.is_empty() {
            0.0
        } else {
            months.iter().filter(|m| **m > 0.0).count() as f64 / months.len() as f64
        },
        trading_days: values.len(),
        drawdown_episodes: drawdown_episodes(nav.dates(), &drawdowns),
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// `nav[-1] / nav[0] - 1`.
pub fn total_return(nav: &[f64]) -> f64 {
    match (nav.first(), nav.last()) {
        (Some(&first), Some(&last)) if nav.len() >= 2 && first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Compound annual growth rate over `len - 1` daily steps.
pub fn cagr(nav: &[f64]) -> f64 {
    if nav.len() < 2 {
        return 0.0;
    }
    let (first, last) = (nav[0], nav[nav.len() - 1]);
    if first <= 0.0 || last <= 0.0 {
        return 0.0;
    }
    let years = (nav.len() - 1) as f64 / TRADING_DAYS;
    (last / first).powf(1.0 / years) - 1.0
}

/// Annualized volatility.
pub fn volatility(returns: &[f64]) -> f64 {
    std_dev(returns) * TRADING_DAYS.sqrt()
}

/// `mean / std * √252`; 0.0 when the std is zero or there are fewer than
/// two returns.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(returns) / std * TRADING_DAYS.sqrt()
}

/// Like Sharpe, with downside deviation in the denominator.
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let downside_sq: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(returns) / downside_std * TRADING_DAYS.sqrt()
}

/// CAGR / |max drawdown|; 0.0 without a drawdown or with non-positive CAGR.
pub fn calmar_ratio(cagr: f64, max_drawdown: f64) -> f64 {
    if max_drawdown >= 0.0 || cagr <= 0.0 {
        return 0.0;
    }
    cagr / max_drawdown.abs()
}

/// Fraction of daily returns that are strictly positive.
pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
}

/// Historical value at risk: the `alpha` quantile of returns (linear
/// interpolation between order statistics).
pub fn value_at_risk(returns: &[f64], alpha: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = alpha.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Expected shortfall: mean of returns at or below `var`.
pub fn conditional_var(returns: &[f64], var: f64) -> f64 {
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= var).collect();
    if tail.is_empty() {
        return var;
    }
    mean_f64(&tail)
}

/// Adjusted Fisher-Pearson skewness; 0.0 below three returns or on zero
/// variance.
pub fn skewness(returns: &[f64]) -> f64 {
    let n = returns.len() as f64;
    if returns.len() < 3 {
        return 0.0;
    }
    let mean = mean_f64(returns);
    let m2 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    if m2 < 1e-30 {
        return 0.0;
    }
    let m3 = returns.iter().map(|r| (r - mean).powi(3)).sum::<f64>() / n;
    m3 / m2.powf(1.5) * (n * (n - 1.0)).sqrt() / (n - 2.0)
}

/// Bias-corrected excess kurtosis (0 for a normal sample); 0.0 below four
/// returns or on zero variance.
pub fn excess_kurtosis(returns: &[f64]) -> f64 {
    let n = returns.len() as f64;
    if returns.len() < 4 {
        return 0.0;
    }
    let mean = mean_f64(returns);
    let s2 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    if s2 < 1e-30 {
        return 0.0;
    }
    let m4 = returns.iter().map(|r| (r - mean).powi(4)).sum::<f64>();
    let scale = n * (n + 1.0) / ((n - 1.0) * (n - 2.0) * (n - 3.0));
    let bias = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
    scale * m4 / s2.powi(2) - bias
}

/// Compound daily returns into calendar-month returns, keyed by
/// `(year, month)`. `dates[i]` is the date `returns[i]` was earned on.
pub fn monthly_returns(dates: &[NaiveDate], returns: &[f64]) -> BTreeMap<(i32, u32), f64> {
    let mut growth: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for (date, r) in dates.iter().zip(returns) {
        *growth.entry((date.year(), date.month())).or_insert(1.0) *= 1.0 + r;
    }
    growth.into_iter().map(|(month, g)| (month, g - 1.0)).collect()
}

/// `nav / running peak - 1`, opening peak = first value.
pub fn drawdown_series(nav: &[f64]) -> Vec<f64> {
    match nav.first() {
        Some(&first) => drawdown_series_from(first, nav),
        None => Vec::new(),
    }
}

/// `nav / running peak - 1` with the peak opened at `opening_peak`.
///
/// Same peak update and rounding as the simulator's position, so the result
/// is bit-identical to `NavPoint::drawdown`.
pub fn drawdown_series_from(opening_peak: f64, nav: &[f64]) -> Vec<f64> {
    let mut peak = opening_peak;
    nav.iter()
        .map(|&v| {
            if v > peak {
                peak = v;
            }
            if peak > 0.0 {
                (v / peak - 1.0).min(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Split a drawdown series into maximal runs below zero.
pub fn drawdown_episodes(dates: &[NaiveDate], drawdowns: &[f64]) -> Vec<DrawdownEpisode> {
    let mut episodes = Vec::new();
    let mut open: Option<(usize, usize)> = None; // (start, trough)

    for (i, &dd) in drawdowns.iter().enumerate() {
        match (open, dd < 0.0) {
            (None, true) => open = Some((i, i)),
            (Some((start, trough)), true) => {
                if dd < drawdowns[trough] {
                    open = Some((start, i));
                }
            }
            (Some((start, trough)), false) => {
                episodes.push(DrawdownEpisode {
                    start: dates[start],
                    trough: dates[trough],
                    recovery: Some(dates[i]),
                    depth: drawdowns[trough],
                    length: i - start,
                });
                open = None;
            }
            (None, false) => {}
        }
    }
    if let Some((start, trough)) = open {
        episodes.push(DrawdownEpisode {
            start: dates[start],
            trough: dates[trough],
            recovery: None,
            depth: drawdowns[trough],
            length: drawdowns.len() - start,
        });
    }
    episodes
}

// ─── Trade statistics ───────────────────────────────────────────────

/// Summary of the rebalancing activity in a trade log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub trade_count: usize,
    /// Dates with at least one trade.
    pub rebalance_count: usize,
    pub buys: usize,
    pub sells: usize,
    pub total_cost: f64,
    pub total_traded_notional: f64,
    /// Mean one-way turnover (sum of |weight delta| / 2) per rebalance.
    pub avg_turnover: f64,
}

impl TradeStats {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let mut per_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for t in trades {
            *per_date.entry(t.date).or_insert(0.0) += t.weight_delta.abs();
        }
        let turnovers: Vec<f64> = per_date.values().map(|l1| l1 / 2.0).collect();

        Self {
            trade_count: trades.len(),
            rebalance_count: per_date.len(),
            buys: trades.iter().filter(|t| t.is_buy()).count(),
            sells: trades.iter().filter(|t| !t.is_buy()).count(),
            total_cost: trades.iter().fold(0.0, |acc, t| acc + t.cost),
            total_traded_notional: trades.iter().map(|t| t.traded_notional).sum(),
            avg_turnover: mean_f64(&turnovers),
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple daily returns from consecutive NAV values.
pub fn daily_returns(nav: &[f64]) -> Vec<f64> {
    nav.windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
