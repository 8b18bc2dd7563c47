//! Signal generation: raw macro series → normalised signal.
//!
//! A [`SignalSource`] turns macro fields into a raw, unbounded series. The
//! shared [`NormalizeSettings`] then applies the rolling z-score and the
//! optional smoothing/clipping transforms. Sources never see portfolio state.

pub mod composite;
pub mod normalize;
pub mod sources;
pub mod stats;

pub use composite::{CompositeSignal, WeightedSource};
pub use normalize::{clip, normalize, smooth, NormalizeSettings};
pub use sources::{GdpMomentumSignal, InflationSurpriseSignal, YieldCurveSignal};
pub use stats::SignalStats;

use thiserror::Error;

use crate::data::Table;
use crate::error::ConfigError;
use crate::series::{SeriesError, TimeSeries};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("signal window must be at least 2, got {0}")]
    Window(usize),

    #[error("signal_cap must be positive and finite, got {0}")]
    Cap(f64),

    #[error("signal '{signal}' needs macro field '{field}' which is not in the input")]
    MissingField { signal: String, field: String },

    #[error("invalid parameter for signal '{signal}': {reason}")]
    InvalidParameter { signal: String, reason: String },

    #[error("composite signal has no components with positive weight")]
    EmptyComposite,

    #[error(transparent)]
    Series(#[from] SeriesError),
}

impl From<SignalError> for ConfigError {
    fn from(e: SignalError) -> Self {
        match e {
            SignalError::Window(w) => ConfigError::Window(w),
            other => ConfigError::Other(other.to_string()),
        }
    }
}

/// A capability that derives a raw signal from macro fields.
pub trait SignalSource: Send + Sync {
    /// Human-readable name, used in logs and result artifacts.
    fn name(&self) -> &str;

    /// Macro fields this source reads.
    fn required_fields(&self) -> Vec<&str>;

    /// Raw (unnormalised) series on the table's date axis.
    fn raw(&self, data: &Table) -> Result<TimeSeries<f64>, SignalError>;

    /// Raw series, normalised and transformed.
    fn generate(
        &self,
        data: &Table,
        settings: &NormalizeSettings,
    ) -> Result<TimeSeries<f64>, SignalError> {
        let raw = self.raw(data)?;
        let signal = settings.apply(&raw)?;
        tracing::debug!(
            signal = self.name(),
            raw_len = raw.len(),
            len = signal.len(),
            "generated signal"
        );
        Ok(signal)
    }
}

/// Fetch a required column or fail with a [`SignalError::MissingField`].
pub(crate) fn required_column<'a>(
    data: &'a Table,
    signal: &str,
    field: &str,
) -> Result<&'a [f64], SignalError> {
    data.column(field).ok_or_else(|| SignalError::MissingField {
        signal: signal.to_string(),
        field: field.to_string(),
    })
}
