use crate::types::{TopoError, TopoResult, NODATA};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::str::FromStr;

/// Available topographic correction methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionMethod {
    /// x cos(zenith) / IL
    #[default]
    Cosine,
    /// Cosine correction relative to the scene mean illumination
    ImprovedCosine,
    /// x (cos(zenith) / IL)^K
    Minnaert,
    /// Minnaert with slope term: x cos(slope) (cos(zenith) / (IL cos(slope)))^K
    MinSlope,
    /// x (cos(zenith) + C) / (IL + C)
    CCorrection,
    /// x (cos(zenith) + cos(pi/2)) / (IL + cos(pi/2 - slope))
    Gamma,
    /// Sun-canopy-sensor: x cos(zenith) cos(slope) / IL
    Scs,
    /// The illumination raster itself, input band ignored
    Illumination,
}

/// Scalar fitted once per call for the empirical methods
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CorrectionCoefficient {
    /// Minnaert constant, always within [0, 1]
    MinnaertK(f64),
    /// C-correction additive term, unconstrained
    CCorrection(f64),
}

impl CorrectionCoefficient {
    pub fn value(&self) -> f64 {
        match *self {
            CorrectionCoefficient::MinnaertK(k) => k,
            CorrectionCoefficient::CCorrection(c) => c,
        }
    }
}

impl CorrectionMethod {
    /// All methods in their conventional numbering order (1..=8)
    pub const ALL: [CorrectionMethod; 8] = [
        CorrectionMethod::Cosine,
        CorrectionMethod::ImprovedCosine,
        CorrectionMethod::Minnaert,
        CorrectionMethod::MinSlope,
        CorrectionMethod::CCorrection,
        CorrectionMethod::Gamma,
        CorrectionMethod::Scs,
        CorrectionMethod::Illumination,
    ];

    /// Canonical lowercase name, also accepted by [`FromStr`]
    pub fn name(&self) -> &'static str {
        match self {
            CorrectionMethod::Cosine => "cosine",
            CorrectionMethod::ImprovedCosine => "improvedcosine",
            CorrectionMethod::Minnaert => "minnaert",
            CorrectionMethod::MinSlope => "minslope",
            CorrectionMethod::CCorrection => "ccorrection",
            CorrectionMethod::Gamma => "gamma",
            CorrectionMethod::Scs => "scs",
            CorrectionMethod::Illumination => "illumination",
        }
    }

    /// Conventional method number, 1 to 8
    pub fn code(&self) -> u8 {
        match self {
            CorrectionMethod::Cosine => 1,
            CorrectionMethod::ImprovedCosine => 2,
            CorrectionMethod::Minnaert => 3,
            CorrectionMethod::MinSlope => 4,
            CorrectionMethod::CCorrection => 5,
            CorrectionMethod::Gamma => 6,
            CorrectionMethod::Scs => 7,
            CorrectionMethod::Illumination => 8,
        }
    }

    pub fn from_code(code: u8) -> TopoResult<Self> {
        code.checked_sub(1)
            .and_then(|i| Self::ALL.get(i as usize).copied())
            .ok_or_else(|| {
                TopoError::InvalidMethod(format!("method code {} is not in 1..=8", code))
            })
    }

    /// Whether a coefficient must be fitted by regression before correcting
    pub fn requires_fit(&self) -> bool {
        matches!(
            self,
            CorrectionMethod::Minnaert | CorrectionMethod::MinSlope | CorrectionMethod::CCorrection
        )
    }

    /// Whether pixels on exactly flat ground keep their input value
    pub fn restores_flat_pixels(&self) -> bool {
        !matches!(self, CorrectionMethod::Illumination)
    }
}

impl std::fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CorrectionMethod {
    type Err = TopoError;

    /// Resolve a method from its name, an unambiguous prefix of it, or its code.
    ///
    /// Matching ignores case and the characters `-`, `_`, `+` and space.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | '+' | ' '))
            .collect::<String>()
            .to_lowercase();

        if key.is_empty() {
            return Err(TopoError::InvalidMethod("empty method name".to_string()));
        }

        if let Ok(code) = key.parse::<u8>() {
            return Self::from_code(code);
        }

        if let Some(exact) = Self::ALL.iter().find(|m| m.name() == key) {
            return Ok(*exact);
        }

        let candidates: Vec<CorrectionMethod> = Self::ALL
            .iter()
            .copied()
            .filter(|m| m.name().starts_with(&key))
            .collect();

        match candidates.as_slice() {
            [single] => Ok(*single),
            [] => Err(TopoError::InvalidMethod(format!("unknown method '{}'", s))),
            many => Err(TopoError::InvalidMethod(format!(
                "'{}' is ambiguous: {}",
                s,
                many.iter().map(|m| m.name()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}

/// Inputs available to a per-pixel correction formula
#[derive(Debug, Clone, Copy)]
pub struct FormulaContext {
    pub cos_zenith: f64,
    /// Mean illumination over valid pixels (improved cosine only)
    pub mean_il: f64,
    /// Fitted K or C, NaN when the method needs none
    pub coefficient: f64,
}

/// Corrected value of one pixel for the given method.
///
/// `x` is the masked input value, `slope` in radians and `il` the illumination.
/// No-data in any of them yields no-data, whatever the coefficient.
#[inline]
pub fn apply_formula(method: CorrectionMethod, x: f64, slope: f64, il: f64, ctx: &FormulaContext) -> f64 {
    if method == CorrectionMethod::Illumination {
        return il;
    }
    // NaN.powf(0.0) is 1, so a zero K would otherwise leak x through
    if x.is_nan() || slope.is_nan() || il.is_nan() {
        return NODATA;
    }

    match method {
        CorrectionMethod::Cosine => cosine(x, il, ctx),
        CorrectionMethod::ImprovedCosine => improved_cosine(x, il, ctx),
        CorrectionMethod::Minnaert => minnaert(x, il, ctx),
        CorrectionMethod::MinSlope => minnaert_slope(x, slope, il, ctx),
        CorrectionMethod::CCorrection => c_correction(x, il, ctx),
        CorrectionMethod::Gamma => gamma(x, slope, il, ctx),
        CorrectionMethod::Scs => scs(x, slope, il, ctx),
        CorrectionMethod::Illumination => il,
    }
}

fn cosine(x: f64, il: f64, ctx: &FormulaContext) -> f64 {
    x * ctx.cos_zenith / il
}

fn improved_cosine(x: f64, il: f64, ctx: &FormulaContext) -> f64 {
    x + x * (ctx.mean_il - il) / ctx.mean_il
}

fn minnaert(x: f64, il: f64, ctx: &FormulaContext) -> f64 {
    x * (ctx.cos_zenith / il).powf(ctx.coefficient)
}

fn minnaert_slope(x: f64, slope: f64, il: f64, ctx: &FormulaContext) -> f64 {
    let cos_slope = slope.cos();
    x * cos_slope * (ctx.cos_zenith / (il * cos_slope)).powf(ctx.coefficient)
}

fn c_correction(x: f64, il: f64, ctx: &FormulaContext) -> f64 {
    x * (ctx.cos_zenith + ctx.coefficient) / (il + ctx.coefficient)
}

fn gamma(x: f64, slope: f64, il: f64, ctx: &FormulaContext) -> f64 {
    // cos(pi/2) is kept literally, it is ~6e-17 rather than 0
    x * (ctx.cos_zenith + FRAC_PI_2.cos()) / (il + (FRAC_PI_2 - slope).cos())
}

fn scs(x: f64, slope: f64, il: f64, ctx: &FormulaContext) -> f64 {
    x * (ctx.cos_zenith * slope.cos()) / il
}
