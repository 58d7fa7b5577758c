use crate::core::elementwise::ElementwiseMapper;
use crate::core::geometry::{AspectConvention, SolarGeometry};
use crate::core::illumination::{
    compute_illumination, mean_illumination, validate_il_epsilon, DEFAULT_IL_EPSILON,
};
use crate::core::masking::{clamp_to_range, mask_sentinel, restore_flat_pixels};
use crate::core::method::{apply_formula, CorrectionCoefficient, CorrectionMethod, FormulaContext};
use crate::core::regression::{
    fit_c_coefficient, fit_minnaert_k, minnaert_slope_threshold, PixelSelection,
};
use crate::types::{ensure_same_shape, Band, TopoError, TopoResult};
use serde::{Deserialize, Serialize};

/// Parameters for topographic correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopographicCorrectionParams {
    /// Correction formula to apply
    pub method: CorrectionMethod,
    /// Input band value meaning "no measurement" (NaN by default)
    pub nodata_sentinel: f64,
    /// Substitute for an illumination of exactly zero
    pub il_epsilon: f64,
    /// Corrected values below this become no-data
    pub dn_min: Option<f64>,
    /// Corrected values above this become no-data
    pub dn_max: Option<f64>,
    /// Convention of the aspect raster
    pub aspect_convention: AspectConvention,
    /// Enable parallel processing
    pub enable_parallel: bool,
    /// Rows per parallel work unit
    pub chunk_size: usize,
}

impl Default for TopographicCorrectionParams {
    fn default() -> Self {
        Self {
            method: CorrectionMethod::Cosine,
            nodata_sentinel: f64::NAN,
            il_epsilon: DEFAULT_IL_EPSILON,
            dn_min: None,
            dn_max: None,
            aspect_convention: AspectConvention::Compass,
            enable_parallel: true,
            chunk_size: 64,
        }
    }
}

impl TopographicCorrectionParams {
    /// Default parameters for a method given by (possibly abbreviated) name
    pub fn for_method(name: &str) -> TopoResult<Self> {
        Ok(Self {
            method: name.parse()?,
            ..Self::default()
        })
    }

    pub fn validate(&self) -> TopoResult<()> {
        validate_il_epsilon(self.il_epsilon)?;
        if self.chunk_size == 0 {
            return Err(TopoError::InvalidParameter(
                "chunk size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a correction run
#[derive(Debug, Clone)]
pub struct CorrectionOutput {
    /// Corrected band (or the illumination raster for the illumination method)
    pub corrected: Band,
    /// Illumination raster used by the formulas
    pub illumination: Band,
    /// Fitted coefficient for Minnaert, Minnaert-with-slope and C-correction
    pub coefficient: Option<CorrectionCoefficient>,
    /// True when sample indices were supplied to a method that does not fit anything
    pub sample_ignored: bool,
}

/// Topographic correction processor
pub struct TopographicCorrector {
    params: TopographicCorrectionParams,
    mapper: ElementwiseMapper,
}

impl TopographicCorrector {
    /// Create a new topographic correction processor
    pub fn new(params: TopographicCorrectionParams) -> Self {
        let mapper = ElementwiseMapper::new(params.enable_parallel, params.chunk_size);
        Self { params, mapper }
    }

    /// Cosine correction with default parameters
    pub fn standard() -> Self {
        Self::new(TopographicCorrectionParams::default())
    }

    pub fn params(&self) -> &TopographicCorrectionParams {
        &self.params
    }

    /// Correct `x` and return only the corrected band
    pub fn correct(
        &self,
        x: &Band,
        slope: &Band,
        aspect: &Band,
        sun_elevation_deg: f64,
        sun_azimuth_deg: f64,
        sample_indices: Option<&[usize]>,
    ) -> TopoResult<Band> {
        self.process(x, slope, aspect, sun_elevation_deg, sun_azimuth_deg, sample_indices)
            .map(|output| output.corrected)
    }

    /// Complete topographic correction workflow.
    ///
    /// `slope` is in radians from horizontal. `aspect` follows the configured
    /// convention. `sample_indices` are flat row-major pixel indices that restrict
    /// the regression of the fitted methods; other methods ignore them.
    pub fn process(
        &self,
        x: &Band,
        slope: &Band,
        aspect: &Band,
        sun_elevation_deg: f64,
        sun_azimuth_deg: f64,
        sample_indices: Option<&[usize]>,
    ) -> TopoResult<CorrectionOutput> {
        let method = self.params.method;
        log::info!(
            "Starting {} topographic correction on {:?} pixels",
            method,
            x.dim()
        );

        // Validation happens before any raster work
        self.params.validate()?;
        let geometry = SolarGeometry::from_degrees(sun_elevation_deg, sun_azimuth_deg)?;
        ensure_same_shape(x, slope)?;
        ensure_same_shape(x, aspect)?;

        let sample_ignored = sample_indices.is_some() && !method.requires_fit();
        let selection = if method.requires_fit() {
            let selection = PixelSelection::from_option(sample_indices);
            selection.validate(x.dim())?;
            selection
        } else {
            if sample_ignored {
                log::warn!(
                    "Sample indices are ignored by the {} method, which fits no coefficient",
                    method
                );
            }
            PixelSelection::All
        };

        log::debug!("Masking input values equal to {}", self.params.nodata_sentinel);
        let x = mask_sentinel(x, self.params.nodata_sentinel, &self.mapper);

        let aspect = self.params.aspect_convention.normalize(aspect, &self.mapper);
        let il = compute_illumination(slope, &aspect, &geometry, self.params.il_epsilon, &self.mapper)?;

        let coefficient = self.fit_coefficient(method, &x, slope, &il, &geometry, &selection)?;

        let mean_il = if method == CorrectionMethod::ImprovedCosine {
            let mean = mean_illumination(&il).unwrap_or(f64::NAN);
            log::debug!("Mean illumination: {:.6}", mean);
            mean
        } else {
            f64::NAN
        };

        let ctx = FormulaContext {
            cos_zenith: geometry.cos_zenith(),
            mean_il,
            coefficient: coefficient.map_or(f64::NAN, |c| c.value()),
        };

        log::debug!("Applying {} formula", method);
        let mut corrected = self
            .mapper
            .map3(&x, slope, &il, |v, s, l| apply_formula(method, v, s, l, &ctx))?;

        if method.restores_flat_pixels() {
            log::debug!("Restoring input values on flat pixels");
            corrected = restore_flat_pixels(&corrected, &x, slope, &self.mapper)?;
        }

        let corrected = clamp_to_range(&corrected, self.params.dn_min, self.params.dn_max, &self.mapper);

        log::info!("Topographic correction completed");

        Ok(CorrectionOutput {
            corrected,
            illumination: il,
            coefficient,
            sample_ignored,
        })
    }

    fn fit_coefficient(
        &self,
        method: CorrectionMethod,
        x: &Band,
        slope: &Band,
        il: &Band,
        geometry: &SolarGeometry,
        selection: &PixelSelection,
    ) -> TopoResult<Option<CorrectionCoefficient>> {
        let coefficient = match method {
            CorrectionMethod::Minnaert | CorrectionMethod::MinSlope => {
                let threshold = minnaert_slope_threshold();
                let k = fit_minnaert_k(
                    x,
                    slope,
                    il,
                    geometry.cos_zenith(),
                    selection,
                    &self.mapper,
                    |s| s >= threshold,
                )?;
                log::debug!("Minnaert K = {:.6}", k);
                Some(CorrectionCoefficient::MinnaertK(k))
            }
            CorrectionMethod::CCorrection => {
                let c = fit_c_coefficient(x, il, selection, &self.mapper)?;
                log::debug!("C-correction C = {:.6}", c);
                Some(CorrectionCoefficient::CCorrection(c))
            }
            CorrectionMethod::Cosine
            | CorrectionMethod::ImprovedCosine
            | CorrectionMethod::Gamma
            | CorrectionMethod::Scs
            | CorrectionMethod::Illumination => None,
        };
        Ok(coefficient)
    }
}

impl Default for TopographicCorrector {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn test_terrain() -> (Band, Band, Band) {
        let x = Array2::from_shape_fn((6, 6), |(i, j)| 40.0 + (i * 6 + j) as f64);
        let slope = Array2::from_shape_fn((6, 6), |(i, j)| 0.05 + 0.04 * ((i + 2 * j) % 9) as f64);
        let aspect = Array2::from_shape_fn((6, 6), |(i, j)| 0.3 * ((3 * i + j) % 21) as f64);
        (x, slope, aspect)
    }

    #[test]
    fn test_default_params() {
        let params = TopographicCorrectionParams::default();
        assert_eq!(params.method, CorrectionMethod::Cosine);
        assert!(params.nodata_sentinel.is_nan());
        assert_eq!(params.il_epsilon, 1e-6);
        assert!(params.dn_min.is_none() && params.dn_max.is_none());
        assert!(params.validate().is_ok());

        let minnaert = TopographicCorrectionParams::for_method("minn").unwrap();
        assert_eq!(minnaert.method, CorrectionMethod::Minnaert);
        assert!(TopographicCorrectionParams::for_method("m").is_err());
    }

    #[test]
    fn test_invalid_parameters_fail_before_work() {
        let (x, slope, aspect) = test_terrain();

        let corrector = TopographicCorrector::new(TopographicCorrectionParams {
            il_epsilon: 0.0,
            ..Default::default()
        });
        assert!(matches!(
            corrector.correct(&x, &slope, &aspect, 45.0, 180.0, None),
            Err(TopoError::InvalidParameter(_))
        ));
        assert_eq!(
            corrector.params().validate().unwrap_err().to_string(),
            validate_il_epsilon(0.0).unwrap_err().to_string()
        );

        let corrector = TopographicCorrector::new(TopographicCorrectionParams {
            chunk_size: 0,
            ..Default::default()
        });
        assert!(corrector.correct(&x, &slope, &aspect, 45.0, 180.0, None).is_err());

        let corrector = TopographicCorrector::standard();
        assert!(matches!(
            corrector.correct(&x, &slope, &aspect, 95.0, 180.0, None),
            Err(TopoError::InvalidGeometry(_))
        ));

        let narrow = Array2::<f64>::zeros((6, 5));
        assert!(matches!(
            corrector.correct(&x, &narrow, &aspect, 45.0, 180.0, None),
            Err(TopoError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_out_of_range_sample_rejected_for_fitted_methods() {
        let (x, slope, aspect) = test_terrain();
        let sample = [0, 36];

        let minnaert = TopographicCorrector::new(TopographicCorrectionParams {
            method: CorrectionMethod::Minnaert,
            ..Default::default()
        });
        assert!(matches!(
            minnaert.correct(&x, &slope, &aspect, 45.0, 180.0, Some(&sample[..])),
            Err(TopoError::InvalidSampleIndex { index: 36, len: 36 })
        ));

        // Ignored entirely by a method without a fit
        let cosine = TopographicCorrector::standard();
        let output = cosine
            .process(&x, &slope, &aspect, 45.0, 180.0, Some(&sample[..]))
            .unwrap();
        assert!(output.sample_ignored);
    }

    #[test]
    fn test_coefficient_reported() {
        let (x, slope, aspect) = test_terrain();

        for (method, expect_k) in [
            (CorrectionMethod::Minnaert, true),
            (CorrectionMethod::MinSlope, true),
            (CorrectionMethod::CCorrection, false),
        ] {
            let corrector = TopographicCorrector::new(TopographicCorrectionParams {
                method,
                ..Default::default()
            });
            let output = corrector.process(&x, &slope, &aspect, 35.0, 150.0, None).unwrap();
            match output.coefficient {
                Some(CorrectionCoefficient::MinnaertK(k)) => {
                    assert!(expect_k);
                    assert!((0.0..=1.0).contains(&k));
                }
                Some(CorrectionCoefficient::CCorrection(_)) => assert!(!expect_k),
                None => panic!("{} should report a coefficient", method),
            }
        }

        let output = TopographicCorrector::standard()
            .process(&x, &slope, &aspect, 35.0, 150.0, None)
            .unwrap();
        assert!(output.coefficient.is_none());
        assert!(!output.sample_ignored);
    }

    #[test]
    fn test_sentinel_is_masked() {
        let (mut x, slope, aspect) = test_terrain();
        x[[2, 3]] = -9999.0;

        let corrector = TopographicCorrector::new(TopographicCorrectionParams {
            nodata_sentinel: -9999.0,
            ..Default::default()
        });
        let out = corrector.correct(&x, &slope, &aspect, 50.0, 120.0, None).unwrap();
        assert!(out[[2, 3]].is_nan());
        assert!(!out[[0, 0]].is_nan());
    }

    #[test]
    fn test_grass_aspect_matches_compass() {
        let (x, slope, aspect_compass) = test_terrain();
        // Compass radians -> GRASS degrees counter-clockwise from east
        let aspect_grass = aspect_compass.mapv(|a| (90.0 - a.to_degrees()).rem_euclid(360.0));

        let compass = TopographicCorrector::standard()
            .correct(&x, &slope, &aspect_compass, 40.0, 200.0, None)
            .unwrap();
        let grass = TopographicCorrector::new(TopographicCorrectionParams {
            aspect_convention: AspectConvention::Grass,
            ..Default::default()
        })
        .correct(&x, &slope, &aspect_grass, 40.0, 200.0, None)
        .unwrap();

        for (a, b) in compass.iter().zip(grass.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}
