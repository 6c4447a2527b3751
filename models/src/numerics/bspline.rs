//! B-splines: evaluation and fitting
//!
//! Knot vectors are clamped: the first and last data abscissae are repeated
//! `degree + 1` times around the interior knots. Basis values come from the
//! Cox-de Boor recursion in its triangular form. Fits solve the (weighted)
//! least-squares system by SVD, so rank deficiency from empty knot spans
//! yields the minimum-norm solution rather than a failure.
//!
//! Weights multiply residuals before squaring: a fit minimizes
//! `Σ (w_i·(y_i − s(x_i)))²`.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest supported degree
pub const MAX_DEGREE: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplineError {
    #[error("degree must be between 1 and {MAX_DEGREE}, got {0}")]
    InvalidDegree(usize),

    #[error("degree {degree} with {knots} interior knot(s) needs at least {needed} points, got {got}")]
    TooFewPoints {
        degree: usize,
        knots: usize,
        needed: usize,
        got: usize,
    },

    #[error("x must be strictly increasing, x[{index}] = {value} does not exceed its predecessor")]
    NotIncreasing { index: usize, value: f64 },

    #[error("interior knot {knot} is not strictly inside the data range [{low}, {high}]")]
    KnotOutsideData { knot: f64, low: f64, high: f64 },

    #[error("{what} has {got} values, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("least squares system could not be solved: {0}")]
    Singular(String),
}

/// A clamped B-spline curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BSpline {
    knots: Vec<f64>,
    coefficients: Vec<f64>,
    degree: usize,
}

fn clamped_knots(low: f64, high: f64, interior: &[f64], degree: usize) -> Vec<f64> {
    let mut knots = Vec::with_capacity(interior.len() + 2 * (degree + 1));
    knots.extend(std::iter::repeat(low).take(degree + 1));
    knots.extend_from_slice(interior);
    knots.extend(std::iter::repeat(high).take(degree + 1));
    knots
}

/// Knot span index `i` with `t_i <= x < t_{i+1}`, clamped to the valid range
fn find_span(knots: &[f64], degree: usize, n_basis: usize, x: f64) -> usize {
    let last = n_basis - 1;
    if x >= knots[last + 1] {
        return last;
    }
    if x <= knots[degree] {
        return degree;
    }
    let (mut low, mut high) = (degree, last + 1);
    let mut mid = (low + high) / 2;
    while x < knots[mid] || x >= knots[mid + 1] {
        if x < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// The `degree + 1` basis functions that are nonzero on `span`, in order
/// `N_{span-degree} ..= N_span`
fn basis_funs(knots: &[f64], degree: usize, span: usize, x: f64) -> Vec<f64> {
    let mut n = vec![0.0; degree + 1];
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];
    n[0] = 1.0;
    for j in 1..=degree {
        left[j] = x - knots[span + 1 - j];
        right[j] = knots[span + j] - x;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { n[r] / denom };
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }
    n
}

fn check_degree(degree: usize) -> Result<(), SplineError> {
    if degree == 0 || degree > MAX_DEGREE {
        return Err(SplineError::InvalidDegree(degree));
    }
    Ok(())
}

fn check_lengths(x: &[f64], y: &[f64], weights: Option<&[f64]>) -> Result<(), SplineError> {
    if y.len() != x.len() {
        return Err(SplineError::LengthMismatch {
            what: "y",
            expected: x.len(),
            got: y.len(),
        });
    }
    if let Some(w) = weights {
        if w.len() != x.len() {
            return Err(SplineError::LengthMismatch {
                what: "weights",
                expected: x.len(),
                got: w.len(),
            });
        }
    }
    Ok(())
}

fn check_sorted(x: &[f64], strict: bool) -> Result<(), SplineError> {
    for (i, pair) in x.windows(2).enumerate() {
        let bad = if strict {
            pair[1] <= pair[0]
        } else {
            pair[1] < pair[0]
        };
        if bad {
            return Err(SplineError::NotIncreasing {
                index: i + 1,
                value: pair[1],
            });
        }
    }
    Ok(())
}

/// Rows of the weighted collocation matrix and right-hand side
fn weighted_system(
    knots: &[f64],
    degree: usize,
    n_basis: usize,
    x: &[f64],
    y: &[f64],
    weights: Option<&[f64]>,
) -> (DMatrix<f64>, DVector<f64>) {
    let mut a = DMatrix::<f64>::zeros(x.len(), n_basis);
    let mut b = DVector::<f64>::zeros(x.len());
    for (row, (&xi, &yi)) in x.iter().zip(y).enumerate() {
        let w = weights.map_or(1.0, |w| w[row]);
        let span = find_span(knots, degree, n_basis, xi);
        for (k, value) in basis_funs(knots, degree, span, xi).into_iter().enumerate() {
            a[(row, span - degree + k)] = w * value;
        }
        b[row] = w * yi;
    }
    (a, b)
}

fn svd_solve(a: DMatrix<f64>, b: &DVector<f64>) -> Result<Vec<f64>, SplineError> {
    let svd = a.svd(true, true);
    let eps = 1e-12 * svd.singular_values.max();
    let c = svd
        .solve(b, eps)
        .map_err(|e| SplineError::Singular(e.to_string()))?;
    if c.iter().any(|v| !v.is_finite()) {
        return Err(SplineError::Singular("non-finite coefficients".to_string()));
    }
    Ok(c.as_slice().to_vec())
}

impl BSpline {
    pub fn new(knots: Vec<f64>, coefficients: Vec<f64>, degree: usize) -> Result<Self, SplineError> {
        check_degree(degree)?;
        if coefficients.len() < degree + 1 {
            return Err(SplineError::LengthMismatch {
                what: "coefficients",
                expected: degree + 1,
                got: coefficients.len(),
            });
        }
        let expected = coefficients.len() + degree + 1;
        if knots.len() != expected {
            return Err(SplineError::LengthMismatch {
                what: "knots",
                expected,
                got: knots.len(),
            });
        }
        check_sorted(&knots, false)?;
        Ok(Self {
            knots,
            coefficients,
            degree,
        })
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Knots strictly between the clamped ends
    pub fn interior_knots(&self) -> &[f64] {
        &self.knots[self.degree + 1..self.knots.len() - self.degree - 1]
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Value at `x`; outside the knot range the end polynomials are extended
    pub fn evaluate(&self, x: f64) -> f64 {
        let n_basis = self.coefficients.len();
        let span = find_span(&self.knots, self.degree, n_basis, x);
        basis_funs(&self.knots, self.degree, span, x)
            .iter()
            .enumerate()
            .map(|(k, b)| b * self.coefficients[span - self.degree + k])
            .sum()
    }

    pub fn derivative(&self, x: f64) -> f64 {
        let p = self.degree;
        let coefficients: Vec<f64> = self
            .coefficients
            .windows(2)
            .enumerate()
            .map(|(i, c)| {
                let dt = self.knots[i + p + 1] - self.knots[i + 1];
                if dt == 0.0 {
                    0.0
                } else {
                    p as f64 * (c[1] - c[0]) / dt
                }
            })
            .collect();
        if coefficients.is_empty() {
            return 0.0;
        }
        let knots = &self.knots[1..self.knots.len() - 1];
        let span = find_span(knots, p - 1, coefficients.len(), x);
        basis_funs(knots, p - 1, span, x)
            .iter()
            .enumerate()
            .map(|(k, b)| b * coefficients[span + 1 - p + k])
            .sum()
    }

    /// Weighted least-squares fit with the given interior knots
    ///
    /// `x` must be sorted ascending and every knot must lie strictly inside
    /// `(x[0], x[n-1])`.
    pub fn fit_least_squares(
        x: &[f64],
        y: &[f64],
        weights: Option<&[f64]>,
        interior: &[f64],
        degree: usize,
    ) -> Result<Self, SplineError> {
        check_degree(degree)?;
        check_lengths(x, y, weights)?;
        let n_basis = interior.len() + degree + 1;
        if x.len() < n_basis || x.len() < 2 {
            return Err(SplineError::TooFewPoints {
                degree,
                knots: interior.len(),
                needed: n_basis.max(2),
                got: x.len(),
            });
        }
        check_sorted(x, false)?;
        let (low, high) = (x[0], x[x.len() - 1]);
        check_sorted(interior, false)?;
        if let Some(&knot) = interior.iter().find(|&&k| k <= low || k >= high) {
            return Err(SplineError::KnotOutsideData { knot, low, high });
        }

        let knots = clamped_knots(low, high, interior, degree);
        let (a, b) = weighted_system(&knots, degree, n_basis, x, y, weights);
        let coefficients = svd_solve(a, &b)?;
        Ok(Self {
            knots,
            coefficients,
            degree,
        })
    }

    /// Spline through every point; `x` must be strictly increasing
    pub fn interpolate(x: &[f64], y: &[f64], degree: usize) -> Result<Self, SplineError> {
        check_degree(degree)?;
        check_lengths(x, y, None)?;
        let n = x.len();
        if n < degree + 1 {
            return Err(SplineError::TooFewPoints {
                degree,
                knots: 0,
                needed: degree + 1,
                got: n,
            });
        }
        check_sorted(x, true)?;

        let interior: Vec<f64> = if degree % 2 == 1 {
            let half = (degree + 1) / 2;
            x[half..n - half].to_vec()
        } else {
            let half = degree / 2;
            (half..n - half - 1)
                .map(|i| 0.5 * (x[i] + x[i + 1]))
                .collect()
        };
        Self::fit_least_squares(x, y, None, &interior, degree)
    }

    /// Penalized spline whose weighted residual sum of squares is as close
    /// to `smoothing` as the penalty allows without exceeding it
    ///
    /// Uniform interior knots carry a second-difference penalty on the
    /// coefficients; the penalty strength is found by bisection in log
    /// space. `smoothing == 0` interpolates.
    pub fn fit_smoothing(
        x: &[f64],
        y: &[f64],
        weights: Option<&[f64]>,
        degree: usize,
        smoothing: f64,
    ) -> Result<Self, SplineError> {
        check_degree(degree)?;
        check_lengths(x, y, weights)?;
        if smoothing <= 0.0 {
            return Self::interpolate(x, y, degree);
        }
        let n = x.len();
        if n < degree + 1 {
            return Err(SplineError::TooFewPoints {
                degree,
                knots: 0,
                needed: degree + 1,
                got: n,
            });
        }
        check_sorted(x, false)?;

        let (low, high) = (x[0], x[n - 1]);
        let n_interior = (n / 3).clamp(1, 40).min(n - degree - 1);
        let interior: Vec<f64> = (1..=n_interior)
            .map(|i| low + (high - low) * i as f64 / (n_interior + 1) as f64)
            .collect();
        let knots = clamped_knots(low, high, &interior, degree);
        let n_basis = interior.len() + degree + 1;

        let (a, b) = weighted_system(&knots, degree, n_basis, x, y, weights);
        let ata = a.transpose() * &a;
        let atb = a.transpose() * &b;
        let penalty = difference_penalty(n_basis);

        let solve = |log_lambda: f64| -> Result<(Vec<f64>, f64), SplineError> {
            let lambda = 10f64.powf(log_lambda);
            let c = svd_solve(&ata + &penalty * lambda, &atb)?;
            let residual = &b - &a * DVector::from_column_slice(&c);
            Ok((c, residual.norm_squared()))
        };

        let (mut lo, mut hi) = (-10.0, 10.0);
        let (c_hi, ssr_hi) = solve(hi)?;
        let coefficients = if ssr_hi <= smoothing {
            c_hi
        } else {
            let (c_lo, ssr_lo) = solve(lo)?;
            if ssr_lo > smoothing {
                debug!("smoothing target {smoothing} below the unpenalized residual {ssr_lo:.6e}");
                c_lo
            } else {
                let mut best = c_lo;
                for _ in 0..50 {
                    let mid = 0.5 * (lo + hi);
                    let (c, ssr) = solve(mid)?;
                    if ssr <= smoothing {
                        lo = mid;
                        best = c;
                    } else {
                        hi = mid;
                    }
                    if hi - lo < 1e-3 {
                        break;
                    }
                }
                best
            }
        };

        Ok(Self {
            knots,
            coefficients,
            degree,
        })
    }
}

/// `DᵀD` for the second-order difference operator (first order when there
/// are too few coefficients)
fn difference_penalty(n_basis: usize) -> DMatrix<f64> {
    let stencil: &[f64] = if n_basis >= 3 { &[1.0, -2.0, 1.0] } else { &[-1.0, 1.0] };
    if n_basis < stencil.len() {
        return DMatrix::zeros(n_basis, n_basis);
    }
    let rows = n_basis + 1 - stencil.len();
    let mut d = DMatrix::<f64>::zeros(rows, n_basis);
    for r in 0..rows {
        for (k, s) in stencil.iter().enumerate() {
            d[(r, r + k)] = *s;
        }
    }
    d.transpose() * d
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn linspace(low: f64, high: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| low + (high - low) * i as f64 / (n - 1) as f64)
            .collect()
    }

    #[test]
    fn test_basis_partition_of_unity() {
        let knots = clamped_knots(0.0, 4.0, &[1.0, 2.0, 3.0], 3);
        for &x in &[0.0, 0.3, 1.0, 2.5, 3.99, 4.0] {
            let span = find_span(&knots, 3, 7, x);
            let sum: f64 = basis_funs(&knots, 3, span, x).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_coefficients_give_constant() {
        let spline = BSpline::new(clamped_knots(0.0, 1.0, &[0.5], 2), vec![2.0; 4], 2).unwrap();
        assert_relative_eq!(spline.evaluate(0.25), 2.0, epsilon = 1e-12);
        assert_relative_eq!(spline.derivative(0.25), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_new_checks_knot_count() {
        assert!(matches!(
            BSpline::new(vec![0.0, 0.0, 1.0, 1.0], vec![1.0, 2.0, 3.0], 1),
            Err(SplineError::LengthMismatch { what: "knots", .. })
        ));
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    fn test_interpolate_hits_points(#[case] degree: usize) {
        let x = linspace(0.0, 6.0, 9);
        let y: Vec<f64> = x.iter().map(|v| v.sin()).collect();
        let spline = BSpline::interpolate(&x, &y, degree).unwrap();
        for (xi, yi) in x.iter().zip(&y) {
            assert_relative_eq!(spline.evaluate(*xi), *yi, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_cubic_reproduces_cubic() {
        let x = linspace(-2.0, 2.0, 15);
        let y: Vec<f64> = x.iter().map(|v| v * v * v - v).collect();
        let spline = BSpline::fit_least_squares(&x, &y, None, &[-1.0, 0.0, 1.0], 3).unwrap();
        assert_relative_eq!(spline.evaluate(0.7), 0.343 - 0.7, epsilon = 1e-9);
        assert_relative_eq!(spline.derivative(0.7), 3.0 * 0.49 - 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_knot_outside_data_rejected() {
        let x = linspace(0.0, 1.0, 10);
        let err = BSpline::fit_least_squares(&x, &x, None, &[1.5], 3).unwrap_err();
        assert!(matches!(err, SplineError::KnotOutsideData { .. }));
    }

    #[test]
    fn test_interpolate_needs_distinct_x() {
        let err = BSpline::interpolate(&[0.0, 1.0, 1.0, 2.0], &[0.0; 4], 1).unwrap_err();
        assert!(matches!(err, SplineError::NotIncreasing { index: 2, .. }));
    }

    #[test]
    fn test_smoothing_respects_residual_target() {
        let x = linspace(0.0, 10.0, 60);
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| v.sin() + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let target = 1.0;
        let spline = BSpline::fit_smoothing(&x, &y, None, 3, target).unwrap();
        let ssr: f64 = x
            .iter()
            .zip(&y)
            .map(|(xi, yi)| (yi - spline.evaluate(*xi)).powi(2))
            .sum();
        assert!(ssr <= target + 1e-9);
        assert!((spline.evaluate(5.0) - 5f64.sin()).abs() < 0.3);
    }

    #[test]
    fn test_smoothing_zero_interpolates() {
        let x = linspace(0.0, 3.0, 6);
        let y = vec![1.0, 3.0, 2.0, 5.0, 4.0, 0.0];
        let spline = BSpline::fit_smoothing(&x, &y, None, 3, 0.0).unwrap();
        assert_relative_eq!(spline.evaluate(x[3]), 5.0, epsilon = 1e-9);
    }
}
