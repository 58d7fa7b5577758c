use ndarray::Array2;

/// Real-valued raster band (rows x cols), NaN marks no-data
pub type Band = Array2<f64>;

/// Value used inside every [`Band`] to mark a missing measurement
pub const NODATA: f64 = f64::NAN;

/// Error types for topographic correction
#[derive(Debug, thiserror::Error)]
pub enum TopoError {
    #[error("Invalid sun geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid correction method: {0}")]
    InvalidMethod(String),

    #[error("Raster shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Sample index {index} is out of bounds for {len} pixels")]
    InvalidSampleIndex { index: usize, len: usize },
}

/// Result type for topographic correction operations
pub type TopoResult<T> = Result<T, TopoError>;

/// Fail with [`TopoError::ShapeMismatch`] unless both rasters share a grid
pub fn ensure_same_shape(expected: &Band, other: &Band) -> TopoResult<()> {
    if expected.dim() != other.dim() {
        return Err(TopoError::ShapeMismatch {
            expected: expected.dim(),
            found: other.dim(),
        });
    }
    Ok(())
}
