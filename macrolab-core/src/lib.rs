//! macrolab core: time series, macro signals, allocation and portfolio simulation.
//!
//! The pipeline is strictly linear:
//! - [`data`]: macro fields and prices aligned onto one trading calendar
//! - [`signal`]: raw macro series → rolling z-score signal
//! - [`allocation`]: signal → target weights by threshold
//! - [`simulator`]: target weights + prices → NAV series and trade log
//!
//! Each stage produces a new series consumed by the next. No stage performs
//! I/O, reads global state, or installs a logging subscriber.

pub mod allocation;
pub mod data;
pub mod domain;
pub mod error;
pub mod series;
pub mod signal;
pub mod simulator;

pub use error::{ConfigError, SimError};
pub use series::{SeriesError, TimeSeries};
