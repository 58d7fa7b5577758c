use crate::core::elementwise::ElementwiseMapper;
use crate::types::{Band, TopoError, TopoResult};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::f64::consts::PI;

/// Sun position converted to the angles used by the illumination model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarGeometry {
    /// Solar zenith angle in radians
    pub zenith: f64,
    /// Solar azimuth in radians, clockwise from north
    pub azimuth: f64,
}

impl SolarGeometry {
    /// Build the geometry from sun elevation and azimuth given in degrees.
    ///
    /// Elevation must lie in [0, 90] and azimuth in [0, 360].
    pub fn from_degrees(sun_elevation_deg: f64, sun_azimuth_deg: f64) -> TopoResult<Self> {
        if !(0.0..=90.0).contains(&sun_elevation_deg) {
            return Err(TopoError::InvalidGeometry(format!(
                "sun elevation {} is outside [0, 90] degrees",
                sun_elevation_deg
            )));
        }
        if !(0.0..=360.0).contains(&sun_azimuth_deg) {
            return Err(TopoError::InvalidGeometry(format!(
                "sun azimuth {} is outside [0, 360] degrees",
                sun_azimuth_deg
            )));
        }

        Ok(Self {
            zenith: (PI / 180.0) * (90.0 - sun_elevation_deg),
            azimuth: (PI / 180.0) * sun_azimuth_deg,
        })
    }

    pub fn cos_zenith(&self) -> f64 {
        self.zenith.cos()
    }

    pub fn sin_zenith(&self) -> f64 {
        self.zenith.sin()
    }
}

/// Convention in which an aspect raster is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectConvention {
    /// Radians clockwise from north
    #[default]
    Compass,
    /// Degrees counter-clockwise from east, as written by GRASS r.slope.aspect
    Grass,
}

impl AspectConvention {
    /// Convert a single aspect sample to compass radians
    #[inline]
    pub fn to_compass(self, aspect: f64) -> f64 {
        match self {
            AspectConvention::Compass => aspect,
            AspectConvention::Grass => (90.0 - aspect).rem_euclid(360.0).to_radians(),
        }
    }

    /// Convert a whole aspect raster to compass radians.
    ///
    /// Compass rasters are borrowed as-is.
    pub fn normalize<'a>(self, aspect: &'a Band, mapper: &ElementwiseMapper) -> Cow<'a, Band> {
        match self {
            AspectConvention::Compass => Cow::Borrowed(aspect),
            AspectConvention::Grass => Cow::Owned(mapper.map(aspect, |a| self.to_compass(a))),
        }
    }
}
