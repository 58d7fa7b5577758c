//! Core topographic correction modules

pub mod elementwise;
pub mod geometry;
pub mod illumination;
pub mod masking;
pub mod method;
pub mod regression;
pub mod topographic_correction;

// Re-export main types
pub use elementwise::ElementwiseMapper;
pub use geometry::{AspectConvention, SolarGeometry};
pub use illumination::{
    compute_illumination, mean_illumination, validate_il_epsilon, DEFAULT_IL_EPSILON,
};
pub use masking::{clamp_to_range, mask_sentinel, restore_flat_pixels};
pub use method::{CorrectionCoefficient, CorrectionMethod};
pub use regression::{
    fit_c_coefficient, fit_minnaert_k, minnaert_slope_threshold, regular_sample_indices,
    LinearFit, OlsAccumulator, PixelSelection,
};
pub use topographic_correction::{CorrectionOutput, TopographicCorrectionParams, TopographicCorrector};
