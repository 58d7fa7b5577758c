//! Per-pixel map over one or more aligned rasters.
//!
//! Every stage of the correction pipeline that is independent per pixel goes
//! through [`ElementwiseMapper`], which chooses between a rayon-backed and a
//! sequential traversal. Both paths produce identical output.

use crate::types::{ensure_same_shape, Band, TopoResult};
use ndarray::Zip;

/// Elementwise map facility with an optional parallel path
#[derive(Debug, Clone, Copy)]
pub struct ElementwiseMapper {
    enable_parallel: bool,
    /// Rasters with no more rows than this are processed sequentially
    chunk_size: usize,
}

impl ElementwiseMapper {
    pub fn new(enable_parallel: bool, chunk_size: usize) -> Self {
        Self {
            enable_parallel,
            chunk_size,
        }
    }

    /// Mapper that never spawns parallel work
    pub fn sequential() -> Self {
        Self::new(false, usize::MAX)
    }

    /// Whether a raster with `rows` rows is processed in parallel
    pub fn is_parallel_for(&self, rows: usize) -> bool {
        cfg!(feature = "parallel") && self.enable_parallel && rows > self.chunk_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Apply `f` to every sample of `a`
    pub fn map<F>(&self, a: &Band, f: F) -> Band
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        if self.is_parallel_for(a.nrows()) {
            Zip::from(a).par_map_collect(|&v| f(v))
        } else {
            Zip::from(a).map_collect(|&v| f(v))
        }
    }

    /// Apply `f` pairwise over two rasters of identical shape
    pub fn map2<F>(&self, a: &Band, b: &Band, f: F) -> TopoResult<Band>
    where
        F: Fn(f64, f64) -> f64 + Sync + Send,
    {
        ensure_same_shape(a, b)?;

        let out = if self.is_parallel_for(a.nrows()) {
            Zip::from(a).and(b).par_map_collect(|&va, &vb| f(va, vb))
        } else {
            Zip::from(a).and(b).map_collect(|&va, &vb| f(va, vb))
        };
        Ok(out)
    }

    /// Apply `f` over three rasters of identical shape
    pub fn map3<F>(&self, a: &Band, b: &Band, c: &Band, f: F) -> TopoResult<Band>
    where
        F: Fn(f64, f64, f64) -> f64 + Sync + Send,
    {
        ensure_same_shape(a, b)?;
        ensure_same_shape(a, c)?;

        let out = if self.is_parallel_for(a.nrows()) {
            Zip::from(a)
                .and(b)
                .and(c)
                .par_map_collect(|&va, &vb, &vc| f(va, vb, vc))
        } else {
            Zip::from(a)
                .and(b)
                .and(c)
                .map_collect(|&va, &vb, &vc| f(va, vb, vc))
        };
        Ok(out)
    }
}

impl Default for ElementwiseMapper {
    fn default() -> Self {
        Self::new(true, 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TopoError;
    use ndarray::Array2;

    #[test]
    fn test_parallel_matches_sequential() {
        let a = Array2::from_shape_fn((200, 17), |(i, j)| (i * 17 + j) as f64 * 0.01);
        let b = Array2::from_shape_fn((200, 17), |(i, j)| ((i + j) % 7) as f64);

        let parallel = ElementwiseMapper::new(true, 8);
        let sequential = ElementwiseMapper::sequential();
        assert!(!sequential.is_parallel_for(200));

        let p = parallel.map2(&a, &b, |x, y| x * y + 1.0).unwrap();
        let s = sequential.map2(&a, &b, |x, y| x * y + 1.0).unwrap();
        assert_eq!(p, s);

        let p3 = parallel.map3(&a, &b, &a, |x, y, z| x - y * z).unwrap();
        let s3 = sequential.map3(&a, &b, &a, |x, y, z| x - y * z).unwrap();
        assert_eq!(p3, s3);
    }

    #[test]
    fn test_map_propagates_nan() {
        let mut a = Array2::<f64>::from_elem((3, 3), 2.0);
        a[[1, 1]] = f64::NAN;
        let b = Array2::<f64>::from_elem((3, 3), 3.0);

        let out = ElementwiseMapper::default().map2(&a, &b, |x, y| x + y).unwrap();
        assert!(out[[1, 1]].is_nan());
        assert_eq!(out[[0, 0]], 5.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let a = Array2::<f64>::zeros((3, 3));
        let b = Array2::<f64>::zeros((3, 4));

        let result = ElementwiseMapper::default().map2(&a, &b, |x, y| x + y);
        assert!(matches!(
            result,
            Err(TopoError::ShapeMismatch { expected: (3, 3), found: (3, 4) })
        ));
    }
}
