//! terracorr: Topographic Illumination Correction for Optical Imagery
//!
//! Normalises a reflectance band for terrain-induced illumination differences
//! using per-pixel slope, aspect and the solar position. Eight published
//! correction methods are available, three of which fit an empirical
//! coefficient by regression over all pixels or a caller-supplied sample.

pub mod types;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{Band, TopoError, TopoResult, NODATA};

pub use crate::core::{
    AspectConvention, CorrectionCoefficient, CorrectionMethod, CorrectionOutput,
    TopographicCorrectionParams, TopographicCorrector,
};

/// Correct a reflectance band for topographic illumination effects.
///
/// `slope` is in radians from horizontal and `aspect` follows
/// `params.aspect_convention` (compass radians by default). All three rasters
/// must share one grid. `sample_indices` restricts the regression of the
/// Minnaert and C-correction methods to the given flat row-major pixels.
pub fn correct(
    x: &Band,
    slope: &Band,
    aspect: &Band,
    sun_elevation_deg: f64,
    sun_azimuth_deg: f64,
    params: &TopographicCorrectionParams,
    sample_indices: Option<&[usize]>,
) -> TopoResult<Band> {
    TopographicCorrector::new(params.clone()).correct(
        x,
        slope,
        aspect,
        sun_elevation_deg,
        sun_azimuth_deg,
        sample_indices,
    )
}
