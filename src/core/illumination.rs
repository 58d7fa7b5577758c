use crate::core::elementwise::ElementwiseMapper;
use crate::core::geometry::SolarGeometry;
use crate::types::{Band, TopoError, TopoResult};

/// Default substitute for an illumination of exactly zero
pub const DEFAULT_IL_EPSILON: f64 = 1e-6;

/// Illumination value for a single pixel.
///
/// IL = cos(slope)cos(zenith) + sin(slope)sin(zenith)cos(azimuth - aspect)
///
/// An exact zero is replaced by `epsilon`; values merely close to zero are kept.
#[inline]
pub fn pixel_illumination(slope: f64, aspect: f64, geometry: &SolarGeometry, epsilon: f64) -> f64 {
    let il = slope.cos() * geometry.cos_zenith()
        + slope.sin() * geometry.sin_zenith() * (geometry.azimuth - aspect).cos();
    nudge_zero(il, epsilon)
}

#[inline]
fn nudge_zero(il: f64, epsilon: f64) -> f64 {
    if il == 0.0 {
        epsilon
    } else {
        il
    }
}

/// Fail with [`TopoError::InvalidParameter`] unless `epsilon` is finite and positive
pub fn validate_il_epsilon(epsilon: f64) -> TopoResult<()> {
    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(TopoError::InvalidParameter(format!(
            "illumination epsilon must be finite and strictly positive, got {}",
            epsilon
        )));
    }
    Ok(())
}

/// Compute the illumination raster from slope and aspect (both compass radians).
///
/// No-data in either input yields no-data in the output.
pub fn compute_illumination(
    slope: &Band,
    aspect: &Band,
    geometry: &SolarGeometry,
    epsilon: f64,
    mapper: &ElementwiseMapper,
) -> TopoResult<Band> {
    validate_il_epsilon(epsilon)?;

    log::debug!(
        "Computing illumination for {:?} pixels (zenith {:.4} rad, azimuth {:.4} rad)",
        slope.dim(),
        geometry.zenith,
        geometry.azimuth
    );

    let geometry = *geometry;
    mapper.map2(slope, aspect, move |s, a| {
        pixel_illumination(s, a, &geometry, epsilon)
    })
}

/// Mean illumination over valid pixels, or None when every pixel is no-data
pub fn mean_illumination(il: &Band) -> Option<f64> {
    let (sum, count) = il
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), &v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use std::f64::consts::PI;

    #[test]
    fn test_flat_terrain_illumination_is_cos_zenith() {
        let geometry = SolarGeometry::from_degrees(30.0, 135.0).unwrap();
        let slope = Array2::<f64>::zeros((4, 4));
        let aspect = Array2::<f64>::from_elem((4, 4), 1.3);

        let il = compute_illumination(
            &slope,
            &aspect,
            &geometry,
            DEFAULT_IL_EPSILON,
            &ElementwiseMapper::default(),
        )
        .unwrap();

        for &v in il.iter() {
            assert_abs_diff_eq!(v, geometry.cos_zenith(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sun_facing_slope_is_brighter() {
        let geometry = SolarGeometry::from_degrees(40.0, 180.0).unwrap();
        let slope = 0.3;

        let facing = pixel_illumination(slope, PI, &geometry, DEFAULT_IL_EPSILON);
        let away = pixel_illumination(slope, 0.0, &geometry, DEFAULT_IL_EPSILON);

        assert!(facing > geometry.cos_zenith());
        assert!(away < geometry.cos_zenith());
    }

    #[test]
    fn test_illumination_stays_in_unit_range() {
        let geometry = SolarGeometry::from_degrees(12.0, 300.0).unwrap();
        let slope = Array2::from_shape_fn((20, 20), |(i, _)| i as f64 * (PI / 2.0) / 19.0);
        let aspect = Array2::from_shape_fn((20, 20), |(_, j)| j as f64 * (2.0 * PI) / 19.0);

        let il = compute_illumination(
            &slope,
            &aspect,
            &geometry,
            DEFAULT_IL_EPSILON,
            &ElementwiseMapper::sequential(),
        )
        .unwrap();

        assert!(il.iter().all(|&v| (-1.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_only_exact_zero_is_nudged() {
        assert_eq!(nudge_zero(0.0, 0.25), 0.25);
        assert_eq!(nudge_zero(-0.0, 0.25), 0.25);
        assert_eq!(nudge_zero(1e-300, 0.25), 1e-300);
        assert_eq!(nudge_zero(-1e-12, 0.25), -1e-12);
        assert!(nudge_zero(f64::NAN, 0.25).is_nan());

        // Sun on the horizon over flat ground: cos(pi/2) is tiny but not zero
        let sun_on_horizon = SolarGeometry::from_degrees(0.0, 90.0).unwrap();
        let il = pixel_illumination(0.0, 0.0, &sun_on_horizon, 0.25);
        assert!(il != 0.25 && il.abs() < 1e-15);
    }

    #[test]
    fn test_nodata_propagates() {
        let geometry = SolarGeometry::from_degrees(45.0, 180.0).unwrap();
        let mut slope = Array2::<f64>::from_elem((2, 2), 0.2);
        let mut aspect = Array2::<f64>::from_elem((2, 2), 1.0);
        slope[[0, 0]] = f64::NAN;
        aspect[[1, 1]] = f64::NAN;

        let il = compute_illumination(
            &slope,
            &aspect,
            &geometry,
            DEFAULT_IL_EPSILON,
            &ElementwiseMapper::default(),
        )
        .unwrap();
        assert!(il[[0, 0]].is_nan());
        assert!(il[[1, 1]].is_nan());
        assert!(!il[[0, 1]].is_nan());
    }

    #[test]
    fn test_invalid_epsilon_rejected() {
        let geometry = SolarGeometry::from_degrees(45.0, 180.0).unwrap();
        let slope = Array2::<f64>::zeros((2, 2));
        let mapper = ElementwiseMapper::default();
        for eps in [0.0, -1e-6, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                compute_illumination(&slope, &slope, &geometry, eps, &mapper),
                Err(TopoError::InvalidParameter(_))
            ));
            assert!(validate_il_epsilon(eps).is_err());
        }
        assert!(validate_il_epsilon(DEFAULT_IL_EPSILON).is_ok());
    }

    #[test]
    fn test_mean_illumination_skips_nodata() {
        let mut il = Array2::<f64>::from_elem((2, 2), 0.5);
        il[[0, 0]] = f64::NAN;
        il[[1, 1]] = 0.8;
        assert_abs_diff_eq!(mean_illumination(&il).unwrap(), 0.6, epsilon = 1e-12);

        let empty = Array2::<f64>::from_elem((2, 2), f64::NAN);
        assert!(mean_illumination(&empty).is_none());
    }
}
