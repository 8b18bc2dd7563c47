//! WeightVector: a fully invested allocation over assets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Tolerance on the sum of weights.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Mapping from asset to weight in `[0, 1]`, weights summing to 1.
///
/// Keys are kept sorted so iteration (and therefore trade emission order)
/// is deterministic. Zero weights are dropped on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct WeightVector {
    weights: BTreeMap<String, f64>,
}

impl WeightVector {
    /// Validate and build a weight vector.
    ///
    /// Rejects negative or non-finite weights and any vector whose weights
    /// do not sum to 1 within [`WEIGHT_TOLERANCE`].
    pub fn new<I, S>(weights: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        let mut sum = 0.0;
        for (asset, weight) in weights {
            let asset = asset.into();
            if asset.is_empty() {
                return Err(ConfigError::EmptyAsset);
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight { asset, weight });
            }
            sum += weight;
            if weight > 0.0 {
                *map.entry(asset).or_insert(0.0) += weight;
            }
        }
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::NotNormalized { sum });
        }
        Ok(Self { weights: map })
    }

    /// 100% in a single asset.
    pub fn single(asset: impl Into<String>) -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(asset.into(), 1.0);
        Self { weights }
    }

    /// Equal split between two assets.
    pub fn split(a: impl Into<String>, b: impl Into<String>) -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(a.into(), 0.5);
        weights.insert(b.into(), 0.5);
        Self { weights }
    }

    /// Weight of `asset` (0.0 when absent).
    pub fn get(&self, asset: &str) -> f64 {
        self.weights.get(asset).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Assets with a nonzero weight.
    pub fn assets(&self) -> impl Iterator<Item = &str> + '_ {
        self.weights.keys().map(|k| k.as_str())
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// L1 distance between two weight vectors over the union of their assets.
    pub fn l1_distance(&self, other: &WeightVector) -> f64 {
        let mut total = 0.0;
        for (asset, w) in &self.weights {
            total += (w - other.get(asset)).abs();
        }
        for (asset, w) in &other.weights {
            if !self.weights.contains_key(asset) {
                total += w.abs();
            }
        }
        total
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }
}

impl TryFrom<BTreeMap<String, f64>> for WeightVector {
    type Error = ConfigError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        WeightVector::new(map)
    }
}

impl From<WeightVector> for BTreeMap<String, f64> {
    fn from(w: WeightVector) -> Self {
        w.weights
    }
}
