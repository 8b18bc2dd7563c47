//! Weighted combination of several normalised signals.

use super::{NormalizeSettings, SignalError, SignalSource};
use crate::data::Table;
use crate::series::TimeSeries;

/// A source and its weight in the combined signal.
pub struct WeightedSource {
    pub source: Box<dyn SignalSource>,
    pub weight: f64,
}

/// Weighted average of normalised component signals.
///
/// On each date, components with a NaN value are skipped and the remaining
/// weights are renormalised. A date where every component is NaN stays NaN.
pub struct CompositeSignal {
    components: Vec<WeightedSource>,
}

impl CompositeSignal {
    pub fn new(components: Vec<WeightedSource>) -> Result<Self, SignalError> {
        for c in &components {
            if !c.weight.is_finite() || c.weight < 0.0 {
                return Err(SignalError::InvalidParameter {
                    signal: c.source.name().to_string(),
                    reason: format!("weight must be finite and non-negative, got {}", c.weight),
                });
            }
        }
        if !components.iter().any(|c| c.weight > 0.0) {
            return Err(SignalError::EmptyComposite);
        }
        Ok(Self { components })
    }

    pub fn single(source: Box<dyn SignalSource>) -> Self {
        Self {
            components: vec![WeightedSource {
                source,
                weight: 1.0,
            }],
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.source.name()).collect()
    }

    pub fn required_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .components
            .iter()
            .flat_map(|c| c.source.required_fields())
            .collect();
        fields.sort_unstable();
        fields.dedup();
        fields
    }

    /// Normalise every component, then combine per date.
    ///
    /// The output covers the union of the components' dates.
    pub fn generate(
        &self,
        data: &Table,
        settings: &NormalizeSettings,
    ) -> Result<TimeSeries<f64>, SignalError> {
        let mut parts = Vec::with_capacity(self.components.len());
        for c in self.components.iter().filter(|c| c.weight > 0.0) {
            parts.push((c.source.generate(data, settings)?, c.weight));
        }

        let mut dates: Vec<_> = parts
            .iter()
            .flat_map(|(s, _)| s.dates().iter().copied())
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let values = dates
            .iter()
            .map(|date| {
                let (sum, weight) = parts
                    .iter()
                    .filter_map(|(s, w)| s.get(*date).filter(|v| v.is_finite()).map(|v| (v * w, *w)))
                    .fold((0.0, 0.0), |(s, tw), (v, w)| (s + v, tw + w));
                if weight > 0.0 {
                    sum / weight
                } else {
                    f64::NAN
                }
            })
            .collect();

        Ok(TimeSeries::new(dates, values)?)
    }
}
