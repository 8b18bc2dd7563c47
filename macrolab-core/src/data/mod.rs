//! Input tables and alignment onto the trading calendar.

pub mod align;
pub mod table;

pub use align::{align_inputs, AlignedInputs};
pub use table::Table;
