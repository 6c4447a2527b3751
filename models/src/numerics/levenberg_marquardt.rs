//! Nonlinear least squares
//!
//! [`LeastSquaresSolver`] is the seam the fit dispatcher talks to. The default
//! [`LevenbergMarquardt`] builds a forward-difference Jacobian, damps the
//! normal equations with Marquardt scaling (`JᵀJ + λ·diag(JᵀJ)`) and shrinks
//! or grows λ by a constant factor depending on whether a step lowers the
//! cost.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Residual function: parameter vector in, one residual per data point out
pub type ResidualFn<'a> = dyn Fn(&[f64]) -> Vec<f64> + 'a;

/// Converged solution of a least-squares problem
#[derive(Debug, Clone)]
pub struct LeastSquaresSolution {
    pub solution: Vec<f64>,
    /// `(JᵀJ)⁻¹` at the solution, unscaled by the residual variance. `None`
    /// when the normal matrix is singular.
    pub covariance: Option<DMatrix<f64>>,
    pub iterations: usize,
    /// Sum of squared (weighted) residuals at the solution
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverFailure {
    #[error("{residuals} residual(s) cannot constrain {parameters} parameter(s)")]
    Underdetermined { residuals: usize, parameters: usize },

    #[error("residual function returned {got} values, expected {expected}")]
    ResidualLength { expected: usize, got: usize },

    #[error("weights have {got} values, expected {expected}")]
    WeightLength { expected: usize, got: usize },

    #[error("non-finite residual at the starting point")]
    NonFiniteStart,

    #[error("damping grew past {max_lambda:e} without lowering the cost")]
    DampingExhausted {
        max_lambda: f64,
        iterations: usize,
        cost: f64,
    },

    #[error("no convergence within {iterations} iterations")]
    MaxIterations { iterations: usize, cost: f64 },
}

impl SolverFailure {
    pub fn iterations(&self) -> usize {
        match self {
            SolverFailure::DampingExhausted { iterations, .. }
            | SolverFailure::MaxIterations { iterations, .. } => *iterations,
            _ => 0,
        }
    }

    pub fn cost(&self) -> f64 {
        match self {
            SolverFailure::DampingExhausted { cost, .. }
            | SolverFailure::MaxIterations { cost, .. } => *cost,
            _ => f64::NAN,
        }
    }
}

/// Minimizes `Σ w_i·r_i(p)²`
pub trait LeastSquaresSolver {
    fn minimize(
        &self,
        residuals: &ResidualFn<'_>,
        initial: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<LeastSquaresSolution, SolverFailure>;
}

/// Levenberg-Marquardt settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    pub initial_lambda: f64,
    pub lambda_factor: f64,
    /// Give up once λ exceeds this without finding a downhill step
    pub max_lambda: f64,
    /// Relative cost reduction below which an accepted step counts as converged
    pub ftol: f64,
    /// Relative step size below which the solution counts as converged
    pub xtol: f64,
    /// Max-norm of the gradient `Jᵀr` below which the solution counts as converged
    pub gtol: f64,
    /// Relative forward-difference step for the Jacobian
    pub diff_step: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            initial_lambda: 0.01,
            lambda_factor: 10.0,
            max_lambda: 1e10,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            diff_step: 1.49e-8,
        }
    }
}

struct Problem<'a, 'f> {
    residuals: &'a ResidualFn<'f>,
    sqrt_weights: Option<Vec<f64>>,
    len: usize,
}

impl Problem<'_, '_> {
    /// Weighted residuals, or `None` if any of them is not finite
    fn eval(&self, params: &[f64]) -> Result<Option<DVector<f64>>, SolverFailure> {
        let mut r = (self.residuals)(params);
        if r.len() != self.len {
            return Err(SolverFailure::ResidualLength {
                expected: self.len,
                got: r.len(),
            });
        }
        if let Some(sw) = &self.sqrt_weights {
            for (ri, wi) in r.iter_mut().zip(sw) {
                *ri *= wi;
            }
        }
        if r.iter().all(|v| v.is_finite()) {
            Ok(Some(DVector::from_vec(r)))
        } else {
            Ok(None)
        }
    }
}

impl LevenbergMarquardt {
    /// Forward-difference Jacobian of the weighted residuals
    fn jacobian(
        &self,
        problem: &Problem<'_, '_>,
        params: &DVector<f64>,
        r: &DVector<f64>,
    ) -> Result<DMatrix<f64>, SolverFailure> {
        let mut jac = DMatrix::<f64>::zeros(r.len(), params.len());
        let mut shifted = params.clone();
        for j in 0..params.len() {
            let h = self.diff_step * params[j].abs().max(1.0);
            shifted[j] = params[j] + h;
            if let Some(r_h) = problem.eval(shifted.as_slice())? {
                let column = (r_h - r) / h;
                jac.set_column(j, &column);
            }
            shifted[j] = params[j];
        }
        Ok(jac)
    }

    fn converged(
        &self,
        problem: &Problem<'_, '_>,
        params: DVector<f64>,
        r: &DVector<f64>,
        iterations: usize,
    ) -> Result<LeastSquaresSolution, SolverFailure> {
        let jac = self.jacobian(problem, &params, r)?;
        let covariance = (jac.transpose() * &jac).try_inverse();
        let cost = r.norm_squared();
        debug!("levenberg-marquardt converged after {iterations} iteration(s), cost {cost:.6e}");
        Ok(LeastSquaresSolution {
            solution: params.as_slice().to_vec(),
            covariance,
            iterations,
            cost,
        })
    }
}

impl LeastSquaresSolver for LevenbergMarquardt {
    fn minimize(
        &self,
        residuals: &ResidualFn<'_>,
        initial: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<LeastSquaresSolution, SolverFailure> {
        let n_params = initial.len();
        let r0 = residuals(initial);
        let n_points = r0.len();
        if n_points < n_params {
            return Err(SolverFailure::Underdetermined {
                residuals: n_points,
                parameters: n_params,
            });
        }
        if let Some(w) = weights {
            if w.len() != n_points {
                return Err(SolverFailure::WeightLength {
                    expected: n_points,
                    got: w.len(),
                });
            }
        }

        let problem = Problem {
            residuals,
            sqrt_weights: weights.map(|w| w.iter().map(|v| v.abs().sqrt()).collect()),
            len: n_points,
        };

        let mut params = DVector::from_column_slice(initial);
        let mut r = problem
            .eval(params.as_slice())?
            .ok_or(SolverFailure::NonFiniteStart)?;
        let mut cost = r.norm_squared();
        let mut lambda = self.initial_lambda;

        for iteration in 1..=self.max_iterations {
            if cost == 0.0 {
                return self.converged(&problem, params, &r, iteration - 1);
            }

            let jac = self.jacobian(&problem, &params, &r)?;
            let jt = jac.transpose();
            let jtj = &jt * &jac;
            let jtr = &jt * &r;
            if jtr.amax() <= self.gtol {
                return self.converged(&problem, params, &r, iteration - 1);
            }
            let rhs = -&jtr;

            loop {
                let mut h = jtj.clone();
                for i in 0..n_params {
                    h[(i, i)] += lambda * jtj[(i, i)].max(f64::EPSILON);
                }

                if let Some(delta) = h.lu().solve(&rhs) {
                    let step_small = delta.norm() <= self.xtol * (params.norm() + self.xtol);
                    let candidate = &params + &delta;
                    if let Some(r_new) = problem.eval(candidate.as_slice())? {
                        let new_cost = r_new.norm_squared();
                        if new_cost < cost {
                            let reduction = (cost - new_cost) / cost;
                            params = candidate;
                            r = r_new;
                            cost = new_cost;
                            lambda /= self.lambda_factor;
                            if reduction <= self.ftol || step_small {
                                return self.converged(&problem, params, &r, iteration);
                            }
                            break;
                        }
                    }
                    if step_small {
                        // No downhill step left at this resolution
                        return self.converged(&problem, params, &r, iteration);
                    }
                }

                lambda *= self.lambda_factor;
                if lambda > self.max_lambda {
                    return Err(SolverFailure::DampingExhausted {
                        max_lambda: self.max_lambda,
                        iterations: iteration,
                        cost,
                    });
                }
            }
        }

        Err(SolverFailure::MaxIterations {
            iterations: self.max_iterations,
            cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solves_linear_problem_exactly() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x - 1.0).collect();
        let residuals = |p: &[f64]| -> Vec<f64> {
            xs.iter()
                .zip(&ys)
                .map(|(x, y)| p[0] * x + p[1] - y)
                .collect()
        };

        let solution = LevenbergMarquardt::default()
            .minimize(&residuals, &[1.0, 0.0], None)
            .unwrap();
        assert_relative_eq!(solution.solution[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(solution.solution[1], -1.0, epsilon = 1e-6);
        assert!(solution.cost < 1e-10);
        assert!(solution.covariance.is_some());
    }

    #[test]
    fn test_fits_exponential_decay() {
        let xs: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 2.5 * (-0.7 * x).exp()).collect();
        let residuals = |p: &[f64]| -> Vec<f64> {
            xs.iter()
                .zip(&ys)
                .map(|(x, y)| p[0] * (-p[1] * x).exp() - y)
                .collect()
        };

        let solution = LevenbergMarquardt::default()
            .minimize(&residuals, &[1.0, 0.2], None)
            .unwrap();
        assert_relative_eq!(solution.solution[0], 2.5, epsilon = 1e-5);
        assert_relative_eq!(solution.solution[1], 0.7, epsilon = 1e-5);
    }

    #[test]
    fn test_underdetermined_is_rejected() {
        let residuals = |p: &[f64]| vec![p[0] + p[1] - 1.0];
        let err = LevenbergMarquardt::default()
            .minimize(&residuals, &[0.0, 0.0], None)
            .unwrap_err();
        assert_eq!(
            err,
            SolverFailure::Underdetermined {
                residuals: 1,
                parameters: 2
            }
        );
    }

    #[test]
    fn test_weight_length_checked() {
        let residuals = |p: &[f64]| vec![p[0] - 1.0, p[0] - 2.0];
        let err = LevenbergMarquardt::default()
            .minimize(&residuals, &[0.0], Some(&[1.0]))
            .unwrap_err();
        assert!(matches!(err, SolverFailure::WeightLength { .. }));
    }

    #[test]
    fn test_weights_pull_solution() {
        // Constant model through two points, the second weighted 3x
        let residuals = |p: &[f64]| vec![p[0] - 0.0, p[0] - 4.0];
        let solution = LevenbergMarquardt::default()
            .minimize(&residuals, &[0.0], Some(&[1.0, 3.0]))
            .unwrap();
        assert_relative_eq!(solution.solution[0], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_iteration_cap_reports_failure() {
        let solver = LevenbergMarquardt {
            max_iterations: 1,
            ftol: 0.0,
            xtol: 0.0,
            gtol: 0.0,
            ..LevenbergMarquardt::default()
        };
        let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let residuals = |p: &[f64]| -> Vec<f64> {
            xs.iter()
                .map(|x| p[0] * (-p[1] * x).exp() - 2.0 * (-0.5 * x).exp())
                .collect()
        };
        let err = solver.minimize(&residuals, &[1.0, 2.0], None).unwrap_err();
        assert_eq!(err.iterations(), 1);
        assert!(err.cost().is_finite());
    }

    #[test]
    fn test_config_serde_defaults() {
        let lm: LevenbergMarquardt = serde_json::from_str(r#"{"max_iterations": 50}"#).unwrap();
        assert_eq!(lm.max_iterations, 50);
        assert_eq!(lm.lambda_factor, 10.0);
    }
}
