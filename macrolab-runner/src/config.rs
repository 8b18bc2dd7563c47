//! Serializable backtest configuration, loaded from TOML.
//!
//! ```toml
//! [backtest]
//! start_date = "2005-01-03"
//! initial_capital = 1000000.0
//!
//! [signal]
//! window = 252
//!
//! [[signal.sources]]
//! type = "yield_curve"
//!
//! [allocation]
//! threshold_high = 0.5
//! threshold_low = -0.5
//! risk_on_asset = "SPY"
//! risk_off_asset = "TLT"
//!
//! [portfolio]
//! cost_rate = 0.001
//! rebalance_frequency = "monthly"
//!
//! [risk]
//! max_drawdown_limit = 0.20
//! drawdown_reentry = 0.10
//! ```
//!
//! Every section is optional; omitted values take the defaults below.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use macrolab_core::allocation::{AssetPair, ThresholdPolicy, Thresholds};
use macrolab_core::domain::WeightVector;
use macrolab_core::signal::{
    CompositeSignal, GdpMomentumSignal, InflationSurpriseSignal, NormalizeSettings, SignalError,
    SignalSource, WeightedSource, YieldCurveSignal,
};
use macrolab_core::simulator::{RebalanceFrequency, RiskOverlay, SimulatorConfig};
use macrolab_core::ConfigError;

/// Content hash of a configuration.
pub type RunId = String;

/// Errors reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Complete configuration of one backtest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    pub signal: SignalSection,
    pub allocation: AllocationSection,
    pub portfolio: PortfolioSection,
    pub risk: RiskSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    /// Inclusive; `None` = first available date.
    pub start_date: Option<NaiveDate>,
    /// Inclusive; `None` = last available date.
    pub end_date: Option<NaiveDate>,
    pub initial_capital: f64,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            initial_capital: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSection {
    pub window: usize,
    pub smoothing_window: Option<usize>,
    pub signal_cap: Option<f64>,
    pub sources: Vec<SignalSourceConfig>,
}

impl Default for SignalSection {
    fn default() -> Self {
        Self {
            window: 252,
            smoothing_window: None,
            signal_cap: None,
            sources: vec![SignalSourceConfig::default()],
        }
    }
}

/// One signal source and its weight in the composite (serializable enum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalSourceConfig {
    /// Long yield minus short yield.
    YieldCurve {
        #[serde(default = "default_long_yield")]
        long_yield: String,
        #[serde(default = "default_short_yield")]
        short_yield: String,
        #[serde(default)]
        invert: bool,
        #[serde(default = "default_weight")]
        weight: f64,
    },

    /// CPI year-over-year change minus its rolling trend.
    InflationSurprise {
        #[serde(default = "default_cpi_field")]
        cpi_field: String,
        #[serde(default = "default_lookback")]
        lookback: usize,
        #[serde(default = "default_lookback")]
        trend_window: usize,
        #[serde(default = "default_weight")]
        weight: f64,
    },

    /// Recent average GDP growth minus the preceding average.
    GdpMomentum {
        #[serde(default = "default_gdp_field")]
        gdp_field: String,
        #[serde(default = "default_growth_lag")]
        growth_lag: usize,
        #[serde(default = "default_lookback")]
        momentum_window: usize,
        #[serde(default = "default_weight")]
        weight: f64,
    },
}

fn default_long_yield() -> String {
    "yield_10y".into()
}
fn default_short_yield() -> String {
    "yield_2y".into()
}
fn default_cpi_field() -> String {
    "cpi".into()
}
fn default_gdp_field() -> String {
    "gdp".into()
}
fn default_lookback() -> usize {
    252
}
fn default_growth_lag() -> usize {
    63
}
fn default_weight() -> f64 {
    1.0
}

impl Default for SignalSourceConfig {
    fn default() -> Self {
        SignalSourceConfig::YieldCurve {
            long_yield: default_long_yield(),
            short_yield: default_short_yield(),
            invert: false,
            weight: default_weight(),
        }
    }
}

impl SignalSourceConfig {
    pub fn weight(&self) -> f64 {
        match self {
            SignalSourceConfig::YieldCurve { weight, .. }
            | SignalSourceConfig::InflationSurprise { weight, .. }
            | SignalSourceConfig::GdpMomentum { weight, .. } => *weight,
        }
    }

    /// Instantiate the configured source.
    pub fn build(&self) -> Box<dyn SignalSource> {
        match self {
            SignalSourceConfig::YieldCurve {
                long_yield,
                short_yield,
                invert,
                ..
            } => Box::new(YieldCurveSignal {
                long_yield: long_yield.clone(),
                short_yield: short_yield.clone(),
                invert: *invert,
            }),
            SignalSourceConfig::InflationSurprise {
                cpi_field,
                lookback,
                trend_window,
                ..
            } => Box::new(InflationSurpriseSignal {
                cpi_field: cpi_field.clone(),
                lookback: *lookback,
                trend_window: *trend_window,
            }),
            SignalSourceConfig::GdpMomentum {
                gdp_field,
                growth_lag,
                momentum_window,
                ..
            } => Box::new(GdpMomentumSignal {
                gdp_field: gdp_field.clone(),
                growth_lag: *growth_lag,
                momentum_window: *momentum_window,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationSection {
    pub threshold_high: f64,
    pub threshold_low: f64,
    pub risk_on_asset: String,
    pub risk_off_asset: String,
}

impl Default for AllocationSection {
    fn default() -> Self {
        Self {
            threshold_high: 0.5,
            threshold_low: -0.5,
            risk_on_asset: "SPY".into(),
            risk_off_asset: "TLT".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioSection {
    pub cost_rate: f64,
    pub rebalance_threshold: f64,
    /// `daily` or `monthly` (first trading date on or after each month end).
    pub rebalance_frequency: RebalanceFrequency,
    /// Opening allocation; all cash when absent.
    pub initial_weights: Option<BTreeMap<String, f64>>,
}

impl Default for PortfolioSection {
    fn default() -> Self {
        Self {
            cost_rate: 0.001,
            rebalance_threshold: 0.0,
            rebalance_frequency: RebalanceFrequency::Daily,
            initial_weights: None,
        }
    }
}

/// Drawdown overlay. Disabled unless `max_drawdown_limit` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    pub max_drawdown_limit: Option<f64>,
    /// Defaults to half the limit.
    pub drawdown_reentry: Option<f64>,
    /// Defaults to 100% in the risk-off asset.
    pub derisked_weights: Option<BTreeMap<String, f64>>,
}

impl BacktestConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigLoadError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deterministic BLAKE3 hash of the configuration's JSON form.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Run every configuration check without touching any data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(start), Some(end)) = (self.backtest.start_date, self.backtest.end_date) {
            if start > end {
                return Err(ConfigError::Other(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }
        self.normalize_settings().validate()?;
        self.composite_signal()?;
        self.policy()?;
        self.simulator_config()?.validate()
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            high: self.allocation.threshold_high,
            low: self.allocation.threshold_low,
        }
    }

    pub fn assets(&self) -> AssetPair {
        AssetPair::new(
            self.allocation.risk_on_asset.as_str(),
            self.allocation.risk_off_asset.as_str(),
        )
    }

    pub fn policy(&self) -> Result<ThresholdPolicy, ConfigError> {
        ThresholdPolicy::new(self.thresholds(), self.assets())
    }

    pub fn normalize_settings(&self) -> NormalizeSettings {
        NormalizeSettings {
            window: self.signal.window,
            smoothing_window: self.signal.smoothing_window,
            signal_cap: self.signal.signal_cap,
        }
    }

    pub fn composite_signal(&self) -> Result<CompositeSignal, SignalError> {
        if self.signal.sources.is_empty() {
            return Err(SignalError::EmptyComposite);
        }
        CompositeSignal::new(
            self.signal
                .sources
                .iter()
                .map(|s| WeightedSource {
                    source: s.build(),
                    weight: s.weight(),
                })
                .collect(),
        )
    }

    /// Build the simulator configuration, resolving overlay defaults.
    pub fn simulator_config(&self) -> Result<SimulatorConfig, ConfigError> {
        let initial_weights = self
            .portfolio
            .initial_weights
            .as_ref()
            .map(|w| WeightVector::new(w.clone()))
            .transpose()?;

        let overlay = match (self.risk.max_drawdown_limit, self.risk.drawdown_reentry) {
            (None, Some(_)) => return Err(ConfigError::ReentryWithoutLimit),
            (None, None) => None,
            (Some(limit), reentry) => {
                let derisked_weights = match &self.risk.derisked_weights {
                    Some(w) => WeightVector::new(w.clone())?,
                    None => WeightVector::single(self.allocation.risk_off_asset.as_str()),
                };
                Some(RiskOverlay {
                    max_drawdown_limit: limit,
                    drawdown_reentry: reentry.unwrap_or(limit / 2.0),
                    derisked_weights,
                })
            }
        };

        Ok(SimulatorConfig {
            initial_capital: self.backtest.initial_capital,
            cost_rate: self.portfolio.cost_rate,
            rebalance_threshold: self.portfolio.rebalance_threshold,
            rebalance_frequency: self.portfolio.rebalance_frequency,
            initial_weights,
            overlay,
        })
    }

    /// Every asset the run may need prices for.
    pub fn required_assets(&self) -> Vec<String> {
        let mut assets = vec![
            self.allocation.risk_on_asset.clone(),
            self.allocation.risk_off_asset.clone(),
        ];
        for weights in [&self.portfolio.initial_weights, &self.risk.derisked_weights]
            .into_iter()
            .flatten()
        {
            assets.extend(weights.iter().filter(|(_, w)| **w > 0.0).map(|(a, _)| a.clone()));
        }
        assets.sort();
        assets.dedup();
        assets
    }

    /// Every macro field the signal sources read.
    pub fn required_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .signal
            .sources
            .iter()
            .flat_map(|s| {
                s.build()
                    .required_fields()
                    .into_iter()
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .collect();
        fields.sort();
        fields.dedup();
        fields
    }
}
