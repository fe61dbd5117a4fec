//! Nutrition calculation module
//!
//! The measurement-to-nutrient transformation: name normalization, mass
//! estimation and per-100 g scaling.

pub mod mass;
pub mod normalizer;
pub mod scaler;
pub mod units;

pub use mass::estimate_mass;
pub use normalizer::{is_relevant, normalize, RELEVANT_NUTRIENTS};
pub use scaler::scale;
