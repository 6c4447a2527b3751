//! Numerical integration

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

pub trait Integrator {
    fn integrate(&self, f: &dyn Fn(f64) -> f64, lower: f64, upper: f64) -> Result<f64>;
}

/// Adaptive Simpson quadrature
///
/// The interval is first cut into `panels` equal pieces so narrow features
/// are not stepped over, then each piece is bisected until the Richardson
/// error estimate drops below its share of `tolerance` or `max_depth` is hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveSimpson {
    pub tolerance: f64,
    pub max_depth: u32,
    pub panels: usize,
}

impl Default for AdaptiveSimpson {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_depth: 30,
            panels: 16,
        }
    }
}

struct Segment {
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
}

impl Segment {
    fn new(f: &dyn Fn(f64) -> f64, a: f64, b: f64, fa: f64, fb: f64) -> Self {
        let m = 0.5 * (a + b);
        let fm = f(m);
        Self {
            a,
            b,
            fa,
            fm,
            fb,
            whole: (b - a) / 6.0 * (fa + 4.0 * fm + fb),
        }
    }
}

impl AdaptiveSimpson {
    fn refine(
        &self,
        f: &dyn Fn(f64) -> f64,
        seg: Segment,
        tolerance: f64,
        depth: u32,
        exhausted: &mut bool,
    ) -> f64 {
        let m = 0.5 * (seg.a + seg.b);
        let left = Segment::new(f, seg.a, m, seg.fa, seg.fm);
        let right = Segment::new(f, m, seg.b, seg.fm, seg.fb);
        let delta = left.whole + right.whole - seg.whole;
        if !delta.is_finite() {
            return delta;
        }
        // Absolute tolerance halves per level; the relative floor stops
        // recursion once the estimate is at rounding precision
        let floor = 1e-13 * (left.whole.abs() + right.whole.abs());
        if depth == 0 || delta.abs() <= 15.0 * tolerance.max(floor) {
            if depth == 0 {
                *exhausted = true;
            }
            return left.whole + right.whole + delta / 15.0;
        }
        self.refine(f, left, 0.5 * tolerance, depth - 1, exhausted)
            + self.refine(f, right, 0.5 * tolerance, depth - 1, exhausted)
    }
}

impl Integrator for AdaptiveSimpson {
    fn integrate(&self, f: &dyn Fn(f64) -> f64, lower: f64, upper: f64) -> Result<f64> {
        if !lower.is_finite() || !upper.is_finite() {
            return Err(ModelError::Integration {
                lower,
                upper,
                reason: "bounds must be finite".to_string(),
            });
        }
        if lower == upper {
            return Ok(0.0);
        }

        let panels = self.panels.max(1);
        let width = (upper - lower) / panels as f64;
        let mut exhausted = false;
        let mut total = 0.0;
        let mut fa = f(lower);
        for i in 0..panels {
            let a = lower + width * i as f64;
            let b = if i + 1 == panels { upper } else { a + width };
            let fb = f(b);
            let seg = Segment::new(f, a, b, fa, fb);
            total += self.refine(
                f,
                seg,
                self.tolerance / panels as f64,
                self.max_depth,
                &mut exhausted,
            );
            fa = fb;
        }

        if !total.is_finite() {
            return Err(ModelError::Integration {
                lower,
                upper,
                reason: format!("integrand is not finite on the interval (sum {total})"),
            });
        }
        if exhausted {
            debug!("adaptive simpson hit depth {} on [{lower}, {upper}]", self.max_depth);
        }
        Ok(total)
    }
}

/// Trapezoid rule over sampled `(x, y)`
pub fn trapezoid(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        return Err(ModelError::LengthMismatch {
            what: "y",
            expected: x.len(),
            got: y.len(),
        });
    }
    Ok(x
        .windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_polynomial_is_exact() {
        let v = AdaptiveSimpson::default()
            .integrate(&|x: f64| 3.0 * x * x + 1.0, 0.0, 2.0)
            .unwrap();
        assert_relative_eq!(v, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sine_over_half_period() {
        let v = AdaptiveSimpson::default()
            .integrate(&|x: f64| x.sin(), 0.0, PI)
            .unwrap();
        assert_relative_eq!(v, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_narrow_peak_is_found() {
        let sig: f64 = 0.01;
        let norm = 1.0 / ((2.0 * PI).sqrt() * sig);
        let f = move |x: f64| norm * (-0.5 * (x / sig).powi(2)).exp();
        let v = AdaptiveSimpson::default().integrate(&f, -3.0, 3.0).unwrap();
        assert_relative_eq!(v, 1.0, epsilon = 1e-7);
    }

    #[test]
    fn test_reversed_bounds_negate() {
        let s = AdaptiveSimpson::default();
        let forward = s.integrate(&|x: f64| x.exp(), 0.0, 1.0).unwrap();
        let backward = s.integrate(&|x: f64| x.exp(), 1.0, 0.0).unwrap();
        assert_relative_eq!(forward, -backward, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_integrand_errors() {
        let err = AdaptiveSimpson::default()
            .integrate(&|x: f64| 1.0 / x, 0.0, 1.0)
            .unwrap_err();
        assert!(matches!(err, ModelError::Integration { .. }));
    }

    #[test]
    fn test_infinite_bounds_rejected() {
        assert!(AdaptiveSimpson::default()
            .integrate(&|x: f64| (-x).exp(), 0.0, f64::INFINITY)
            .is_err());
    }

    #[test]
    fn test_trapezoid() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 1.0, 2.0];
        assert_relative_eq!(trapezoid(&x, &y).unwrap(), 2.0);
        assert!(trapezoid(&x, &y[..2]).is_err());
    }
}
