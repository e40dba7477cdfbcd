//! Vision-based secondary area estimation
//!
//! The estimator itself (outline detection, shape decomposition) lives in an
//! external calculator; this module only launches it and reads its answer.

pub mod estimator;
pub mod scale;

pub use estimator::{EstimatorConfig, ScriptAreaEstimator};
pub use scale::{normalize_scale_hint, parse_scale};
