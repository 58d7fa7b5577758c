//! Input sanitisation and output masking around the correction formulas.

use crate::core::elementwise::ElementwiseMapper;
use crate::types::{Band, TopoResult, NODATA};

/// Replace every sample equal to `sentinel` with no-data.
///
/// A NaN sentinel leaves the band unchanged since NaN already marks no-data.
pub fn mask_sentinel(band: &Band, sentinel: f64, mapper: &ElementwiseMapper) -> Band {
    if sentinel.is_nan() {
        return band.clone();
    }
    mapper.map(band, |v| if v == sentinel { NODATA } else { v })
}

/// Put the original value back wherever slope is defined and exactly zero
pub fn restore_flat_pixels(
    corrected: &Band,
    original: &Band,
    slope: &Band,
    mapper: &ElementwiseMapper,
) -> TopoResult<Band> {
    mapper.map3(corrected, original, slope, |c, x, s| if s == 0.0 { x } else { c })
}

/// Set every sample outside `[min, max]` to no-data. Either bound may be absent.
pub fn clamp_to_range(
    band: &Band,
    min: Option<f64>,
    max: Option<f64>,
    mapper: &ElementwiseMapper,
) -> Band {
    if min.is_none() && max.is_none() {
        return band.clone();
    }
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            log::warn!(
                "Output range [{}, {}] is empty, every pixel will become no-data",
                lo,
                hi
            );
        }
    }

    mapper.map(band, |v| {
        let below = min.map_or(false, |lo| v < lo);
        let above = max.map_or(false, |hi| v > hi);
        if below || above {
            NODATA
        } else {
            v
        }
    })
}
