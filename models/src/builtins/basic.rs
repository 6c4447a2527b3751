//! Polynomial, periodic and elementary models

use log::warn;
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

use crate::error::{ModelError, Result};
use crate::model::{CustomFit, FitOptions, ParametricModel};
use crate::params::ModelState;

/// Standard deviation about the mean with `ddof` delta degrees of freedom
fn std_ddof(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - ddof) as f64).sqrt()
}

/// Weighted least-squares polynomial coefficients, lowest order first
fn polyfit(x: &[f64], y: &[f64], weights: Option<&[f64]>, n_coeffs: usize) -> Result<Vec<f64>> {
    if x.len() < n_coeffs {
        return Err(ModelError::InsufficientData {
            needed: n_coeffs,
            got: x.len(),
        });
    }
    let mut a = DMatrix::<f64>::zeros(x.len(), n_coeffs);
    let mut b = DVector::<f64>::zeros(x.len());
    for (row, (&xi, &yi)) in x.iter().zip(y).enumerate() {
        let w = weights.map_or(1.0, |w| w[row].abs().sqrt());
        let mut power = 1.0;
        for col in 0..n_coeffs {
            a[(row, col)] = w * power;
            power *= xi;
        }
        b[row] = w * yi;
    }
    let svd = a.svd(true, true);
    let eps = 1e-14 * svd.singular_values.max();
    let c = svd.solve(&b, eps).map_err(|e| ModelError::FitDidNotConverge {
        reason: format!("polynomial system: {e}"),
        iterations: 0,
        cost: f64::NAN,
    })?;
    Ok(c.as_slice().to_vec())
}

fn horner(x: f64, coeffs_low_first: &[f64]) -> f64 {
    coeffs_low_first.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

builtin_model!(
    /// `y = C`
    Constant,
    "constant",
    ["C" = 0.0]
);

impl ParametricModel for Constant {
    model_state!();

    fn eval_with(&self, _x: f64, params: &[f64]) -> f64 {
        params[0]
    }

    /// Weighted mean of `y`
    fn custom_fit(&mut self, _x: &[f64], y: &[f64], options: &FitOptions) -> Option<Result<CustomFit>> {
        if options.is_fixed("C") {
            return Some(Err(ModelError::NoFreeParameters {
                model: Self::NAME.to_string(),
            }));
        }
        let (sw, swy) = match &options.weights {
            Some(w) => w.iter().zip(y).fold((0.0, 0.0), |(sw, swy), (wi, yi)| (sw + wi, swy + wi * yi)),
            None => (y.len() as f64, y.iter().sum()),
        };
        let mean = swy / sw;
        let sigma = std_ddof(y, 1) / (y.len() as f64).sqrt();
        Some(Ok(CustomFit {
            values: vec![mean],
            uncertainties: Some(vec![sigma]),
        }))
    }

    fn derivative(&self, _x: f64) -> f64 {
        0.0
    }

    fn integrate(&self, lower: f64, upper: f64) -> Result<f64> {
        Ok(self.state.value(0) * (upper - lower))
    }
}

builtin_model!(
    /// `y = m·x + b`
    ///
    /// Fits in closed form, with either parameter optionally fixed. A weighted
    /// fit is closed-form only when both parameters are free.
    Linear,
    "linear",
    ["m" = 1.0, "b" = 0.0]
);

impl Linear {
    pub fn slope(&self) -> f64 {
        self.state.value(0)
    }

    pub fn intercept(&self) -> f64 {
        self.state.value(1)
    }

    /// Line with slope `m` through `(x0, y0)`
    pub fn point_slope(&mut self, m: f64, x0: f64, y0: f64) {
        self.state.set_value(0, m);
        self.state.set_value(1, y0 - m * x0);
    }

    /// Line through two distinct points
    pub fn two_point(&mut self, x0: f64, y0: f64, x1: f64, y1: f64) -> Result<()> {
        if x0 == x1 {
            return Err(ModelError::InvalidValue {
                what: "x1 - x0",
                value: 0.0,
                expected: "two points with distinct x",
            });
        }
        self.point_slope((y0 - y1) / (x0 - x1), x0, y0);
        Ok(())
    }

    /// Closed-form weighted fit with weights `w = 1/σ²`; returns
    /// `(m, b, σ_m, σ_b)`
    pub fn weighted_fit(x: &[f64], y: &[f64], w: &[f64]) -> Result<(f64, f64, f64, f64)> {
        let n = x.len();
        for (what, len) in [("y", y.len()), ("weights", w.len())] {
            if len != n {
                return Err(ModelError::LengthMismatch {
                    what,
                    expected: n,
                    got: len,
                });
            }
        }
        if n < 3 {
            return Err(ModelError::InsufficientData { needed: 3, got: n });
        }
        let (mut sw, mut swx, mut swy, mut swxx, mut swxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for ((&xi, &yi), &wi) in x.iter().zip(y).zip(w) {
            sw += wi;
            swx += wi * xi;
            swy += wi * yi;
            swxx += wi * xi * xi;
            swxy += wi * xi * yi;
        }
        let delta = sw * swxx - swx * swx;
        if delta == 0.0 {
            return Err(ModelError::InvalidValue {
                what: "weighted x spread",
                value: delta,
                expected: "at least two distinct x with nonzero weight",
            });
        }
        let intercept = (swxx * swy - swx * swxy) / delta;
        let slope = (sw * swxy - swx * swy) / delta;
        let chi: f64 = x
            .iter()
            .zip(y)
            .zip(w)
            .map(|((&xi, &yi), &wi)| wi * (yi - intercept - slope * xi).powi(2))
            .sum();
        let sigma_y_sq = chi / (sw * (n - 2) as f64 / n as f64);
        let sigma_intercept = (sigma_y_sq * swxx / delta).sqrt();
        let sigma_slope = (sigma_y_sq * sw / delta).sqrt();
        Ok((slope, intercept, sigma_slope, sigma_intercept))
    }

    fn closed_form(&self, x: &[f64], y: &[f64], options: &FitOptions) -> Result<CustomFit> {
        let fixed_m = options.is_fixed("m");
        let fixed_b = options.is_fixed("b");
        let n = x.len() as f64;
        let sx: f64 = x.iter().sum();
        let sy: f64 = y.iter().sum();
        let sxx: f64 = x.iter().map(|v| v * v).sum();
        let sxy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
        let residuals = |m: f64, b: f64| -> Vec<f64> {
            x.iter().zip(y).map(|(xi, yi)| yi - m * xi - b).collect()
        };

        let (m, b, dm, db) = match (fixed_m, fixed_b) {
            (true, true) => {
                return Err(ModelError::NoFreeParameters {
                    model: Self::NAME.to_string(),
                })
            }
            (false, false) => {
                if x.len() < 2 {
                    return Err(ModelError::InsufficientData {
                        needed: 2,
                        got: x.len(),
                    });
                }
                let delta = n * sxx - sx * sx;
                if delta == 0.0 {
                    return Err(ModelError::InvalidValue {
                        what: "x spread",
                        value: delta,
                        expected: "at least two distinct x",
                    });
                }
                let m = (n * sxy - sx * sy) / delta;
                let b = (sxx * sy - sx * sxy) / delta;
                let dy = std_ddof(&residuals(m, b), 2);
                (m, b, dy * (sxx / delta).sqrt(), dy * (n / delta).sqrt())
            }
            (true, false) => {
                let m = self.slope();
                let b = (sy - m * sx) / n;
                let dy = std_ddof(&residuals(m, b), 1);
                (m, b, 0.0, dy)
            }
            (false, true) => {
                if sxx == 0.0 {
                    return Err(ModelError::InvalidValue {
                        what: "sum of x²",
                        value: sxx,
                        expected: "a nonzero x",
                    });
                }
                let b = self.intercept();
                let m = (sxy - b * sx) / sxx;
                let dy = std_ddof(&residuals(m, b), 1);
                (m, b, dy / sxx.sqrt(), 0.0)
            }
        };
        Ok(CustomFit {
            values: vec![m, b],
            uncertainties: Some(vec![dm, db]),
        })
    }
}

impl ParametricModel for Linear {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        params[0] * x + params[1]
    }

    fn custom_fit(&mut self, x: &[f64], y: &[f64], options: &FitOptions) -> Option<Result<CustomFit>> {
        if let Some(w) = &options.weights {
            if !options.fixed.is_empty() {
                warn!("linear: closed-form weighted fit cannot hold parameters fixed, using least squares");
                return None;
            }
            return Some(Linear::weighted_fit(x, y, w).map(|(m, b, dm, db)| CustomFit {
                values: vec![m, b],
                uncertainties: Some(vec![dm, db]),
            }));
        }
        Some(self.closed_form(x, y, options))
    }

    fn derivative(&self, _x: f64) -> f64 {
        self.slope()
    }

    fn integrate(&self, lower: f64, upper: f64) -> Result<f64> {
        let (m, b) = (self.slope(), self.intercept());
        Ok(m * (upper * upper - lower * lower) / 2.0 + b * (upper - lower))
    }
}

builtin_model!(
    /// `y = c2·x² + c1·x + c0`
    Quadratic,
    "quadratic",
    ["c2" = 1.0, "c1" = 0.0, "c0" = 0.0]
);

impl ParametricModel for Quadratic {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        (params[0] * x + params[1]) * x + params[2]
    }

    fn custom_fit(&mut self, x: &[f64], y: &[f64], options: &FitOptions) -> Option<Result<CustomFit>> {
        if !options.fixed.is_empty() {
            return None;
        }
        Some(polyfit(x, y, options.weights.as_deref(), 3).map(|c| CustomFit::new(vec![c[2], c[1], c[0]])))
    }

    fn derivative(&self, x: f64) -> f64 {
        2.0 * self.state.value(0) * x + self.state.value(1)
    }

    fn integrate(&self, lower: f64, upper: f64) -> Result<f64> {
        let v = self.state.values();
        let antiderivative = |x: f64| ((v[0] / 3.0 * x + v[1] / 2.0) * x + v[2]) * x;
        Ok(antiderivative(upper) - antiderivative(lower))
    }
}

/// `y = Σ c_i·xⁱ` with coefficients `c0 ..= cN`
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    state: ModelState,
}

impl Polynomial {
    pub const NAME: &'static str = "polynomial";

    /// Polynomial of `degree`, every coefficient zero
    pub fn with_degree(degree: usize) -> Self {
        let names = (0..=degree).map(|i| format!("c{i}")).collect();
        Self {
            state: ModelState::from_parts(names, vec![0.0; degree + 1]),
        }
    }

    pub fn degree(&self) -> usize {
        self.state.len() - 1
    }
}

impl Default for Polynomial {
    fn default() -> Self {
        Self::with_degree(2)
    }
}

impl ParametricModel for Polynomial {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        horner(x, params)
    }

    fn custom_fit(&mut self, x: &[f64], y: &[f64], options: &FitOptions) -> Option<Result<CustomFit>> {
        if !options.fixed.is_empty() {
            return None;
        }
        Some(polyfit(x, y, options.weights.as_deref(), self.state.len()).map(CustomFit::new))
    }

    fn derivative(&self, x: f64) -> f64 {
        let derived: Vec<f64> = self
            .state
            .values()
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, c)| i as f64 * c)
            .collect();
        horner(x, &derived)
    }

    fn integrate(&self, lower: f64, upper: f64) -> Result<f64> {
        let mut integral = vec![0.0];
        integral.extend(
            self.state
                .values()
                .iter()
                .enumerate()
                .map(|(i, c)| c / (i + 1) as f64),
        );
        Ok(horner(upper, &integral) - horner(lower, &integral))
    }
}

/// `y = Σ A_n·sin(n·x) + B_n·cos(n·x)` for `n = 0 ..` terms
///
/// Parameters alternate `A0, B0, A1, B1, ...`; `A0` has no effect and `B0`
/// is the constant term.
#[derive(Debug, Clone, PartialEq)]
pub struct Fourier {
    state: ModelState,
}

impl Fourier {
    pub const NAME: &'static str = "fourier";

    pub fn with_terms(terms: usize) -> Self {
        let names = (0..terms)
            .flat_map(|n| [format!("A{n}"), format!("B{n}")])
            .collect();
        Self {
            state: ModelState::from_parts(names, vec![0.0; 2 * terms]),
        }
    }

    pub fn terms(&self) -> usize {
        self.state.len() / 2
    }
}

impl Default for Fourier {
    fn default() -> Self {
        Self::with_terms(3)
    }
}

impl ParametricModel for Fourier {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        params
            .chunks_exact(2)
            .enumerate()
            .map(|(n, ab)| {
                let nx = n as f64 * x;
                ab[0] * nx.sin() + ab[1] * nx.cos()
            })
            .sum()
    }

    fn derivative(&self, x: f64) -> f64 {
        self.state
            .values()
            .chunks_exact(2)
            .enumerate()
            .map(|(n, ab)| {
                let n = n as f64;
                n * (ab[0] * (n * x).cos() - ab[1] * (n * x).sin())
            })
            .sum()
    }

    fn integrate(&self, lower: f64, upper: f64) -> Result<f64> {
        Ok(self
            .state
            .values()
            .chunks_exact(2)
            .enumerate()
            .map(|(n, ab)| {
                if n == 0 {
                    return ab[1] * (upper - lower);
                }
                let n = n as f64;
                (ab[0] * ((n * lower).cos() - (n * upper).cos())
                    + ab[1] * ((n * upper).sin() - (n * lower).sin()))
                    / n
            })
            .sum())
    }

    fn range_hint(&self) -> (f64, f64) {
        (0.0, 2.0 * PI)
    }
}

builtin_model!(
    /// `y = A·e^(k·x)`
    Exponential,
    "exponential",
    ["A" = 1.0, "k" = 1.0]
);

impl ParametricModel for Exponential {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        params[0] * (params[1] * x).exp()
    }

    fn derivative(&self, x: f64) -> f64 {
        self.state.value(1) * self.evaluate(x)
    }

    fn integrate(&self, lower: f64, upper: f64) -> Result<f64> {
        let (a, k) = (self.state.value(0), self.state.value(1));
        if k == 0.0 {
            return Ok(a * (upper - lower));
        }
        Ok(a / k * ((k * upper).exp() - (k * lower).exp()))
    }

    fn range_hint(&self) -> (f64, f64) {
        let k = self.state.value(1).abs();
        if k == 0.0 {
            return (-1.0, 1.0);
        }
        (-1.5 / k, 1.5 / k)
    }
}

builtin_model!(
    /// `y = A·x^p + B`
    PowerLaw,
    "powerlaw",
    ["A" = 1.0, "p" = 1.0, "B" = 0.0]
);

impl ParametricModel for PowerLaw {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        params[0] * x.powf(params[1]) + params[2]
    }

    fn derivative(&self, x: f64) -> f64 {
        let (a, p) = (self.state.value(0), self.state.value(1));
        a * p * x.powf(p - 1.0)
    }
}

builtin_model!(
    /// `y = A·sin(k·x + p)`
    Sin,
    "sin",
    ["A" = 1.0, "k" = 2.0 * PI, "p" = 0.0]
);

impl ParametricModel for Sin {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        params[0] * (params[1] * x + params[2]).sin()
    }

    fn derivative(&self, x: f64) -> f64 {
        let v = self.state.values();
        v[0] * v[1] * (v[1] * x + v[2]).cos()
    }

    fn integrate(&self, lower: f64, upper: f64) -> Result<f64> {
        let v = self.state.values();
        let (a, k, p) = (v[0], v[1], v[2]);
        if k == 0.0 {
            return Ok(a * p.sin() * (upper - lower));
        }
        Ok(a * ((k * lower + p).cos() - (k * upper + p).cos()) / k)
    }
}

builtin_model!(
    /// Broken power law `y = A·(x + xs)^(b − a)·x^a`: slope `a` well inside
    /// `xs`, slope `b` well outside
    TwoPower,
    "twopower",
    ["A" = 1.0, "xs" = 1.0, "a" = 1.0, "b" = 2.0]
);

impl TwoPower {
    /// Value at the break, `f(xs)`
    pub fn fxs(&self) -> f64 {
        let v = self.state.values();
        let (a_norm, xs, a, b) = (v[0], v[1], v[2], v[3]);
        a_norm * xs.powf(b) * 2f64.powf(b - a)
    }

    /// Scale `A` so that `f(xs) = value`
    pub fn set_fxs(&mut self, value: f64) {
        let v = self.state.values();
        let (xs, a, b) = (v[1], v[2], v[3]);
        self.state.set_value(0, value * xs.powf(-b) * 2f64.powf(a - b));
    }
}

impl ParametricModel for TwoPower {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        let (a_norm, xs, a, b) = (params[0], params[1], params[2], params[3]);
        a_norm * (x + xs).powf(b - a) * x.powf(a)
    }
}

/// `ln(1 + e^z)` without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

builtin_model!(
    /// Smooth transition between two linear regimes,
    /// `y = a·z + (b − a)·ln(1 + e^z) + C` with `z = x − xs`
    TwoSlope,
    "twoslope",
    ["a" = 1.0, "b" = 2.0, "C" = 0.0, "xs" = 0.0]
);

impl ParametricModel for TwoSlope {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        let (a, b, c, xs) = (params[0], params[1], params[2], params[3]);
        let z = x - xs;
        a * z + (b - a) * softplus(z) + c
    }

    fn derivative(&self, x: f64) -> f64 {
        let v = self.state.values();
        let z = x - v[3];
        let logistic = 1.0 / (1.0 + (-z).exp());
        v[0] + (v[1] - v[0]) * logistic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_linear_closed_form() {
        let mut line = Linear::new();
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.1, 4.9, 7.0];
        let fit = line.fit(&x, &y, &FitOptions::new()).unwrap();
        assert_relative_eq!(line.slope(), 1.98, epsilon = 1e-12);
        assert_relative_eq!(line.intercept(), 1.03, epsilon = 1e-12);
        let sigmas = fit.uncertainties.unwrap();
        assert!(sigmas[0] > 0.0 && sigmas[1] > 0.0);
    }

    #[test]
    fn test_linear_fixed_slope() {
        let mut line = Linear::new();
        line.set("m", 2.0).unwrap();
        let x = [0.0, 1.0, 2.0];
        let y = [1.0, 3.0, 5.0];
        line.fit(&x, &y, &FitOptions::new().fix("m")).unwrap();
        assert_relative_eq!(line.slope(), 2.0);
        assert_relative_eq!(line.intercept(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_fixed_intercept() {
        let mut line = Linear::new();
        line.set("b", 0.0).unwrap();
        let x = [1.0, 2.0, 3.0];
        let y = [3.0, 6.0, 9.0];
        line.fit(&x, &y, &FitOptions::new().fix("b")).unwrap();
        assert_relative_eq!(line.slope(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_both_fixed_fails() {
        let mut line = Linear::new();
        let err = line
            .fit(&[0.0, 1.0], &[0.0, 1.0], &FitOptions::new().fix("m").fix("b"))
            .unwrap_err();
        assert!(matches!(err, ModelError::NoFreeParameters { .. }));
    }

    #[test]
    fn test_linear_weighted_fit() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.0, 2.0, 4.0, 6.5];
        let (m, b, dm, db) = Linear::weighted_fit(&x, &y, &[1.0, 1.0, 1.0, 1e-12]).unwrap();
        assert_relative_eq!(m, 2.0, epsilon = 1e-6);
        assert_relative_eq!(b, 0.0, epsilon = 1e-6);
        assert!(dm.is_finite() && db.is_finite());
    }

    #[test]
    fn test_linear_weighted_fit_checks_lengths() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let err = Linear::weighted_fit(&x, &[0.0, 2.0, 4.0], &[1.0; 4]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::LengthMismatch { what: "y", expected: 4, got: 3 }
        ));
        let err = Linear::weighted_fit(&x, &[0.0, 2.0, 4.0, 6.0], &[1.0; 5]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::LengthMismatch { what: "weights", expected: 4, got: 5 }
        ));
    }

    #[test]
    fn test_linear_weighted_with_fixed_uses_least_squares() {
        let mut line = Linear::new();
        line.set("b", 1.0).unwrap();
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let options = FitOptions::new().fix("b").with_weights(vec![1.0; 4]);
        let fit = line.fit(&x, &y, &options).unwrap();
        assert_eq!(fit.path, crate::params::FitPath::LeastSquares);
        assert_relative_eq!(line.slope(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_linear_setters_and_integral() {
        let mut line = Linear::new();
        line.two_point(1.0, 3.0, 3.0, 7.0).unwrap();
        assert_relative_eq!(line.slope(), 2.0);
        assert_relative_eq!(line.intercept(), 1.0);
        // ∫0..2 (2x + 1) dx = 4 + 2
        assert_relative_eq!(line.integrate(0.0, 2.0).unwrap(), 6.0);
        assert!(line.two_point(1.0, 0.0, 1.0, 5.0).is_err());
    }

    #[test]
    fn test_polynomial_fit_and_calculus() {
        let mut poly = Polynomial::with_degree(3);
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.5 - 2.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 - 2.0 * v + 0.5 * v * v * v).collect();
        poly.fit(&x, &y, &FitOptions::new()).unwrap();
        let c = poly.values();
        assert_relative_eq!(c[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(c[1], -2.0, epsilon = 1e-9);
        assert_relative_eq!(c[2], 0.0, epsilon = 1e-9);
        assert_relative_eq!(c[3], 0.5, epsilon = 1e-9);

        assert_relative_eq!(poly.derivative(2.0), -2.0 + 1.5 * 4.0, epsilon = 1e-9);
        // ∫0..2 = 2 - 4 + 0.125·16
        assert_relative_eq!(poly.integrate(0.0, 2.0).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_quadratic_matches_polynomial_order() {
        let mut quad = Quadratic::new();
        let x = [-1.0, 0.0, 1.0, 2.0];
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v * v - v + 2.0).collect();
        quad.fit(&x, &y, &FitOptions::new()).unwrap();
        assert_relative_eq!(quad.values()[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(quad.values()[1], -1.0, epsilon = 1e-9);
        assert_relative_eq!(quad.values()[2], 2.0, epsilon = 1e-9);
        assert_relative_eq!(quad.integrate(0.0, 1.0).unwrap(), 1.0 - 0.5 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fourier_terms() {
        let mut f = Fourier::with_terms(2);
        assert_eq!(f.parameter_names(), &["A0", "B0", "A1", "B1"]);
        f.set_values(&[5.0, 1.0, 2.0, 0.0]).unwrap();
        assert_relative_eq!(f.evaluate(PI / 2.0), 1.0 + 2.0, epsilon = 1e-12);
        assert_relative_eq!(f.integrate(0.0, PI).unwrap(), PI + 4.0, epsilon = 1e-12);
        assert_relative_eq!(f.derivative(0.0), 2.0, epsilon = 1e-12);
    }

    #[rstest]
    #[case(0.3)]
    #[case(1.7)]
    fn test_sin_analytic_matches_numeric(#[case] x: f64) {
        let mut s = Sin::new();
        s.set_values(&[2.0, 3.0, 0.4]).unwrap();
        let h = 1e-6;
        let numeric = (s.evaluate(x + h) - s.evaluate(x - h)) / (2.0 * h);
        assert_relative_eq!(s.derivative(x), numeric, epsilon = 1e-6);
        let quad = crate::numerics::AdaptiveSimpson::default();
        assert_relative_eq!(
            s.integrate(0.0, x).unwrap(),
            s.integrate_with(&quad, 0.0, x).unwrap(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_exponential_integral_and_hint() {
        let mut e = Exponential::new();
        e.set_values(&[2.0, -0.5]).unwrap();
        assert_relative_eq!(e.integrate(0.0, 2.0).unwrap(), 4.0 * (1.0 - (-1f64).exp()), epsilon = 1e-12);
        assert_eq!(e.range_hint(), (-3.0, 3.0));
    }

    #[test]
    fn test_two_power_fxs_round_trip() {
        let mut tp = TwoPower::new();
        tp.set_fxs(10.0);
        assert_relative_eq!(tp.fxs(), 10.0, epsilon = 1e-12);
        let xs = tp.get("xs").unwrap();
        assert_relative_eq!(tp.evaluate(xs), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_two_slope_asymptotes() {
        let ts = TwoSlope::new();
        assert_relative_eq!(ts.derivative(-40.0), 1.0, epsilon = 1e-9);
        assert_relative_eq!(ts.derivative(40.0), 2.0, epsilon = 1e-9);
        assert!(ts.evaluate(800.0).is_finite());
    }

    #[test]
    fn test_constant_fit_is_mean() {
        let mut c = Constant::new();
        c.fit(&[0.0, 1.0, 2.0], &[1.0, 2.0, 6.0], &FitOptions::new()).unwrap();
        assert_relative_eq!(c.values()[0], 3.0);
    }
}
