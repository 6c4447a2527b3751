//! Intensity scaling modes and their forward/inverse transforms
//!
//! A [`ScalingMode`] is the caller's choice; [`resolve`] turns it into a
//! [`Transform`] against the current plane's statistics and calibration.
//! Transforms are element-wise; the engine maps them over the active view.

use ndarray::{Array2, ArrayView2};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::CcdError;
use crate::stats::GlobalStats;

/// Element-wise scaling function
pub type ScaleFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Available scaling modes
#[derive(Clone)]
pub enum ScalingMode {
    /// Identity
    Linear,
    /// Logarithmic, see [`resolve`] for how `lower`/`upper` pick the policy
    Log {
        lower: Option<f64>,
        upper: Option<f64>,
        base: f64,
    },
    /// Magnitudes per square arcsecond; needs zero point and pixel scale
    SurfaceBrightness,
    /// `v^exponent`
    Power { exponent: f64 },
    /// `base^v`
    Exp { base: f64 },
    /// Inverse hyperbolic sine
    Asinh,
    /// Caller-supplied functions. Without an inverse, edits cannot be committed.
    Custom {
        forward: ScaleFn,
        inverse: Option<ScaleFn>,
    },
}

impl ScalingMode {
    /// Log scaling with the default bounds (10^0 to 10^3)
    pub fn log() -> Self {
        ScalingMode::Log {
            lower: Some(0.0),
            upper: Some(3.0),
            base: 10.0,
        }
    }

    pub fn power() -> Self {
        ScalingMode::Power { exponent: 2.0 }
    }

    pub fn exp() -> Self {
        ScalingMode::Exp { base: 10.0 }
    }

    pub fn custom<F>(forward: F, inverse: Option<ScaleFn>) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        ScalingMode::Custom {
            forward: Arc::new(forward),
            inverse,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalingMode::Linear => "linear",
            ScalingMode::Log { .. } => "log",
            ScalingMode::SurfaceBrightness => "sb",
            ScalingMode::Power { .. } => "power",
            ScalingMode::Exp { .. } => "exp",
            ScalingMode::Asinh => "asinh",
            ScalingMode::Custom { .. } => "custom",
        }
    }
}

impl Default for ScalingMode {
    fn default() -> Self {
        ScalingMode::Linear
    }
}

impl fmt::Debug for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScalingMode::Linear => write!(f, "Linear"),
            ScalingMode::Log { lower, upper, base } => f
                .debug_struct("Log")
                .field("lower", lower)
                .field("upper", upper)
                .field("base", base)
                .finish(),
            ScalingMode::SurfaceBrightness => write!(f, "SurfaceBrightness"),
            ScalingMode::Power { exponent } => {
                f.debug_struct("Power").field("exponent", exponent).finish()
            }
            ScalingMode::Exp { base } => f.debug_struct("Exp").field("base", base).finish(),
            ScalingMode::Asinh => write!(f, "Asinh"),
            ScalingMode::Custom { inverse, .. } => f
                .debug_struct("Custom")
                .field("has_inverse", &inverse.is_some())
                .finish(),
        }
    }
}

impl fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalingMode {
    type Err = CcdError;

    /// Parse a mode name into its default-parameter variant
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(ScalingMode::Linear),
            "log" => Ok(ScalingMode::log()),
            "sb" => Ok(ScalingMode::SurfaceBrightness),
            "exp" => Ok(ScalingMode::exp()),
            "power" => Ok(ScalingMode::power()),
            "asinh" => Ok(ScalingMode::Asinh),
            _ => Err(CcdError::UnknownScalingMode(s.to_string())),
        }
    }
}

/// What a transform may depend on besides its own parameters
#[derive(Debug, Clone, Copy)]
pub struct ScalingContext<'a> {
    pub stats: &'a GlobalStats,
    pub zero_point: Option<f64>,
    /// (x, y) pixel scale in arcsec/pixel
    pub pixel_scale: Option<(f64, f64)>,
}

/// A resolved forward/inverse pair
#[derive(Clone)]
pub struct Transform {
    name: &'static str,
    forward: ScaleFn,
    inverse: Option<ScaleFn>,
    identity: bool,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            name: "linear",
            forward: Arc::new(|v| v),
            inverse: Some(Arc::new(|v| v)),
            identity: true,
        }
    }

    fn new(name: &'static str, forward: ScaleFn, inverse: Option<ScaleFn>) -> Self {
        Self {
            name,
            forward,
            inverse,
            identity: false,
        }
    }

    fn pair<F, G>(name: &'static str, forward: F, inverse: G) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
        G: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(forward), Some(Arc::new(inverse)))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn has_inverse(&self) -> bool {
        self.inverse.is_some()
    }

    pub fn forward(&self, v: f64) -> f64 {
        (self.forward)(v)
    }

    pub fn inverse(&self, v: f64) -> Option<f64> {
        self.inverse.as_ref().map(|inv| inv(v))
    }

    /// Apply the forward function to every pixel
    pub fn apply_forward(&self, raw: &Array2<f64>) -> Array2<f64> {
        if self.identity {
            raw.clone()
        } else {
            raw.mapv(|v| (self.forward)(v))
        }
    }

    /// Map scaled pixels back to raw values; `None` without an inverse
    pub fn apply_inverse(&self, scaled: ArrayView2<f64>) -> Option<Array2<f64>> {
        if self.identity {
            return Some(scaled.to_owned());
        }
        let inv = self.inverse.as_ref()?;
        Some(scaled.mapv(|v| inv(v)))
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("has_inverse", &self.has_inverse())
            .finish()
    }
}

fn invalid(mode: &'static str, reason: impl Into<String>) -> CcdError {
    CcdError::InvalidTransform {
        mode,
        reason: reason.into(),
    }
}

fn check_finite(mode: &'static str, name: &str, value: f64) -> Result<(), CcdError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(mode, format!("{name} must be finite, got {value}")))
    }
}

fn check_base(mode: &'static str, base: f64) -> Result<(), CcdError> {
    check_finite(mode, "base", base)?;
    if base <= 0.0 || base == 1.0 {
        return Err(invalid(
            mode,
            format!("base must be positive and not 1, got {base}"),
        ));
    }
    Ok(())
}

/// Build the transform for `mode`.
///
/// Log policies, by which bounds are given:
/// * both: global `[min, max]` is mapped affinely onto `[base^lower, base^upper]`,
///   then `log_base` is taken
/// * `upper` omitted: `log_base(v - min + base^lower)`
/// * `lower` omitted: `log_base(v)` directly
///
/// # Errors
/// * `CcdError::InvalidTransform` - parameters that leave the transform
///   non-invocable or non-invertible
/// * `CcdError::MissingCalibration` - surface brightness without zero point
///   or pixel scale
pub fn resolve(mode: &ScalingMode, ctx: &ScalingContext) -> Result<Transform, CcdError> {
    let name = mode.name();
    match mode {
        ScalingMode::Linear => Ok(Transform::identity()),

        ScalingMode::Log { lower, upper, base } => {
            let base = *base;
            check_base(name, base)?;
            let ln_base = base.ln();

            match (*lower, *upper) {
                (None, _) => Ok(Transform::pair(
                    name,
                    move |v| v.ln() / ln_base,
                    move |v| base.powf(v),
                )),
                (Some(lower), None) => {
                    check_finite(name, "lower", lower)?;
                    let xmin = ctx.stats.min;
                    if !xmin.is_finite() {
                        return Err(invalid(name, "image has no finite pixels"));
                    }
                    let lo = base.powf(lower);
                    Ok(Transform::pair(
                        name,
                        move |v| (v - xmin + lo).ln() / ln_base,
                        move |v| base.powf(v) + xmin - lo,
                    ))
                }
                (Some(lower), Some(upper)) => {
                    check_finite(name, "lower", lower)?;
                    check_finite(name, "upper", upper)?;
                    if lower >= upper {
                        return Err(invalid(
                            name,
                            format!("lower ({lower}) must be below upper ({upper})"),
                        ));
                    }
                    let (xmin, xmax) = (ctx.stats.min, ctx.stats.max);
                    let span = xmax - xmin;
                    if !span.is_finite() || span <= 0.0 {
                        return Err(invalid(
                            name,
                            format!("global range [{xmin}, {xmax}] has zero width"),
                        ));
                    }
                    let lo = base.powf(lower);
                    let hi = base.powf(upper);
                    let gain = (hi - lo) / span;
                    Ok(Transform::pair(
                        name,
                        move |v| ((v - xmin) * gain + lo).ln() / ln_base,
                        move |v| (base.powf(v) - lo) / gain + xmin,
                    ))
                }
            }
        }

        ScalingMode::SurfaceBrightness => {
            let zpt = ctx.zero_point.ok_or(CcdError::MissingCalibration {
                missing: "zero point",
            })?;
            let (sx, sy) = ctx.pixel_scale.ok_or(CcdError::MissingCalibration {
                missing: "pixel scale",
            })?;
            check_finite(name, "zero point", zpt)?;
            let area = sx * sy;
            if !area.is_finite() || area <= 0.0 {
                return Err(invalid(
                    name,
                    format!("pixel area must be positive, got {sx} x {sy}"),
                ));
            }
            let offset = 2.5 * area.log10() - zpt;
            Ok(Transform::pair(
                name,
                move |v| -2.5 * v.log10() + offset,
                move |v| 10f64.powf((v - offset) / -2.5),
            ))
        }

        ScalingMode::Power { exponent } => {
            let p = *exponent;
            check_finite(name, "exponent", p)?;
            if p == 0.0 {
                return Err(invalid(name, "exponent 0 is not invertible"));
            }
            Ok(Transform::pair(
                name,
                move |v| v.powf(p),
                move |v| v.powf(1.0 / p),
            ))
        }

        ScalingMode::Exp { base } => {
            let base = *base;
            check_base(name, base)?;
            let ln_base = base.ln();
            Ok(Transform::pair(
                name,
                move |v| base.powf(v),
                move |v| v.ln() / ln_base,
            ))
        }

        ScalingMode::Asinh => Ok(Transform::pair(name, f64::asinh, f64::sinh)),

        ScalingMode::Custom { forward, inverse } => Ok(Transform::new(
            name,
            Arc::clone(forward),
            inverse.as_ref().map(Arc::clone),
        )),
    }
}
