//! Regression fitting for the empirical correction coefficients.
//!
//! Minnaert methods fit `log10(x) = a + K log10(IL / cos(zenith))` and the
//! C-correction fits `x = a + b IL`. Both run over the whole valid-pixel
//! population or over a caller-supplied sample of flat row-major indices.

use crate::core::elementwise::ElementwiseMapper;
use crate::types::{ensure_same_shape, Band, TopoError, TopoResult};
use rayon::prelude::*;

/// Slope below which terrain is too flat for a reliable Minnaert fit (5% grade)
pub fn minnaert_slope_threshold() -> f64 {
    0.05_f64.atan()
}

/// Pixels that take part in a regression
#[derive(Debug, Clone, Copy)]
pub enum PixelSelection<'a> {
    /// Every pixel of the raster
    All,
    /// Flat row-major indices; duplicates are kept and weigh twice
    Sample(&'a [usize]),
}

impl<'a> PixelSelection<'a> {
    pub fn from_option(sample: Option<&'a [usize]>) -> Self {
        match sample {
            Some(indices) => PixelSelection::Sample(indices),
            None => PixelSelection::All,
        }
    }

    /// Check every sample index against a raster of the given shape
    pub fn validate(&self, shape: (usize, usize)) -> TopoResult<()> {
        if let PixelSelection::Sample(indices) = self {
            let len = shape.0 * shape.1;
            if let Some(&index) = indices.iter().find(|&&i| i >= len) {
                return Err(TopoError::InvalidSampleIndex { index, len });
            }
        }
        Ok(())
    }
}

/// Result of an ordinary least squares fit `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    /// Number of points the fit was computed from
    pub n: usize,
}

/// Running least squares state.
///
/// Keeps means and centred co-moments so partial results from separate row
/// blocks can be merged without loss of precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct OlsAccumulator {
    n: usize,
    mean_x: f64,
    mean_y: f64,
    m2_x: f64,
    c_xy: f64,
}

impl OlsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.n += 1;
        let n = self.n as f64;
        let dx = x - self.mean_x;
        self.mean_x += dx / n;
        self.mean_y += (y - self.mean_y) / n;
        self.m2_x += dx * (x - self.mean_x);
        self.c_xy += dx * (y - self.mean_y);
    }

    pub fn merge(self, other: Self) -> Self {
        if self.n == 0 {
            return other;
        }
        if other.n == 0 {
            return self;
        }

        let n = self.n + other.n;
        let (na, nb, nf) = (self.n as f64, other.n as f64, n as f64);
        let dx = other.mean_x - self.mean_x;
        let dy = other.mean_y - self.mean_y;

        Self {
            n,
            mean_x: self.mean_x + dx * nb / nf,
            mean_y: self.mean_y + dy * nb / nf,
            m2_x: self.m2_x + other.m2_x + dx * dx * na * nb / nf,
            c_xy: self.c_xy + other.c_xy + dx * dy * na * nb / nf,
        }
    }

    /// Finish the fit. None with fewer than two points or a constant predictor.
    pub fn fit(&self) -> Option<LinearFit> {
        if self.n < 2 || self.m2_x <= 0.0 || !self.m2_x.is_finite() {
            return None;
        }

        let slope = self.c_xy / self.m2_x;
        let intercept = self.mean_y - slope * self.mean_x;
        if slope.is_nan() || intercept.is_nan() {
            return None;
        }

        Some(LinearFit {
            intercept,
            slope,
            n: self.n,
        })
    }
}

impl FromIterator<(f64, f64)> for OlsAccumulator {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        let mut acc = OlsAccumulator::new();
        for (x, y) in iter {
            acc.push(x, y);
        }
        acc
    }
}

/// Collect regression pairs over the selected pixels.
///
/// `pair` maps a pixel position to an `(x, y)` observation or None to skip it.
/// Sample indices are checked against `shape` before `pair` is called.
pub fn accumulate_pairs<F>(
    shape: (usize, usize),
    selection: &PixelSelection,
    mapper: &ElementwiseMapper,
    pair: F,
) -> TopoResult<OlsAccumulator>
where
    F: Fn(usize, usize) -> Option<(f64, f64)> + Sync,
{
    selection.validate(shape)?;
    let (rows, cols) = shape;

    let acc: OlsAccumulator = match selection {
        PixelSelection::Sample(indices) => indices
            .iter()
            .filter_map(|&index| pair(index / cols, index % cols))
            .collect(),
        PixelSelection::All if mapper.is_parallel_for(rows) => {
            let row_indices: Vec<usize> = (0..rows).collect();
            row_indices
                .par_chunks(mapper.chunk_size())
                .map(|row_chunk| {
                    let mut local = OlsAccumulator::new();
                    for &i in row_chunk {
                        for j in 0..cols {
                            if let Some((x, y)) = pair(i, j) {
                                local.push(x, y);
                            }
                        }
                    }
                    local
                })
                .reduce(OlsAccumulator::new, OlsAccumulator::merge)
        }
        PixelSelection::All => (0..rows)
            .flat_map(|i| (0..cols).map(move |j| (i, j)))
            .filter_map(|(i, j)| pair(i, j))
            .collect(),
    };
    Ok(acc)
}

/// Fit the Minnaert constant K over pixels whose slope passes `eligible`.
///
/// Returns 1 when every eligible input value is negative (including the case
/// of no eligible pixels at all) or when no usable pair survives masking.
/// The fitted value is clamped to [0, 1]. All three rasters must share a shape.
pub fn fit_minnaert_k<P>(
    x: &Band,
    slope: &Band,
    il: &Band,
    cos_zenith: f64,
    selection: &PixelSelection,
    mapper: &ElementwiseMapper,
    eligible: P,
) -> TopoResult<f64>
where
    P: Fn(f64) -> bool + Sync,
{
    ensure_same_shape(x, slope)?;
    ensure_same_shape(x, il)?;

    let all_negative = x
        .iter()
        .zip(slope.iter())
        .filter(|&(&v, &s)| eligible(s) && !v.is_nan())
        .all(|(&v, _)| v < 0.0);
    if all_negative {
        log::debug!("All eligible pixels are negative, using K = 1");
        return Ok(1.0);
    }

    let acc = accumulate_pairs(x.dim(), selection, mapper, |i, j| {
        if !eligible(slope[[i, j]]) {
            return None;
        }
        let y = x[[i, j]];
        let t = il[[i, j]] / cos_zenith;
        if y.is_nan() || t.is_nan() || y <= 0.0 || t <= 0.0 {
            return None;
        }
        Some((t.log10(), y.log10()))
    })?;

    let k = match acc.fit() {
        Some(fit) => {
            let k = fit.slope.clamp(0.0, 1.0);
            log::debug!(
                "Minnaert fit over {} pixels: slope {:.6}, K = {:.6}",
                fit.n,
                fit.slope,
                k
            );
            k
        }
        None => {
            log::warn!(
                "Minnaert regression impossible with {} usable pixels, using K = 1",
                acc.len()
            );
            1.0
        }
    };
    Ok(k)
}

/// Fit the C-correction coefficient `C = a / b` from `x = a + b IL`.
///
/// A near-zero slope gives a huge or infinite C which is passed through
/// unchanged. An impossible fit yields NaN.
pub fn fit_c_coefficient(
    x: &Band,
    il: &Band,
    selection: &PixelSelection,
    mapper: &ElementwiseMapper,
) -> TopoResult<f64> {
    ensure_same_shape(x, il)?;

    let acc = accumulate_pairs(x.dim(), selection, mapper, |i, j| {
        let (v, t) = (x[[i, j]], il[[i, j]]);
        if v.is_nan() || t.is_nan() {
            None
        } else {
            Some((t, v))
        }
    })?;

    let Some(fit) = acc.fit() else {
        log::warn!(
            "C-correction regression impossible with {} usable pixels",
            acc.len()
        );
        return Ok(f64::NAN);
    };

    let c = fit.intercept / fit.slope;
    log::debug!(
        "C-correction fit over {} pixels: intercept {:.6}, slope {:.6}, C = {:.6}",
        fit.n,
        fit.intercept,
        fit.slope,
        c
    );
    if !c.is_finite() {
        log::warn!("C-correction coefficient is not finite ({})", c);
    }
    Ok(c)
}

/// Up to `n` evenly strided row-major indices over a `rows x cols` raster
pub fn regular_sample_indices(rows: usize, cols: usize, n: usize) -> Vec<usize> {
    let len = rows * cols;
    if n == 0 || len == 0 {
        return Vec::new();
    }
    if n >= len {
        return (0..len).collect();
    }

    (0..n)
        .map(|k| ((k as u128 * len as u128) / n as u128) as usize)
        .collect()
}
