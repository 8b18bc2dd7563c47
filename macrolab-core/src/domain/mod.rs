//! Domain types for the macro allocation pipeline.

pub mod nav;
pub mod position;
pub mod trade;
pub mod weights;

pub use nav::NavPoint;
pub use position::Position;
pub use trade::Trade;
pub use weights::{WeightVector, WEIGHT_TOLERANCE};

/// Asset identifier type alias
pub type Asset = String;
