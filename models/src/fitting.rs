//! Fit dispatch shared by every model

use log::debug;

use crate::error::{ModelError, Result};
use crate::model::{FitMethod, FitOptions, ParametricModel};
use crate::numerics::LeastSquaresSolver;
use crate::params::{FitDiagnostics, FitPath};

fn validate<M: ParametricModel + ?Sized>(
    model: &M,
    x: &[f64],
    y: &[f64],
    options: &FitOptions,
) -> Result<()> {
    if y.len() != x.len() {
        return Err(ModelError::LengthMismatch {
            what: "y",
            expected: x.len(),
            got: y.len(),
        });
    }
    if let Some(w) = &options.weights {
        if w.len() != x.len() {
            return Err(ModelError::LengthMismatch {
                what: "weights",
                expected: x.len(),
                got: w.len(),
            });
        }
    }
    for name in &options.fixed {
        model.state().require_index(name)?;
    }
    if x.is_empty() {
        return Err(ModelError::InsufficientData { needed: 1, got: 0 });
    }
    Ok(())
}

fn free_indices<M: ParametricModel + ?Sized>(model: &M, options: &FitOptions) -> Vec<usize> {
    model
        .parameter_names()
        .iter()
        .enumerate()
        .filter(|(_, name)| !options.is_fixed(name))
        .map(|(i, _)| i)
        .collect()
}

/// `sqrt(Σ(y - f(x))² / (n - n_free))`, NaN with no degrees of freedom
pub(crate) fn residual_std<M: ParametricModel + ?Sized>(
    model: &M,
    params: &[f64],
    x: &[f64],
    y: &[f64],
    n_free: usize,
) -> f64 {
    let dof = x.len().saturating_sub(n_free);
    let ss: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - model.eval_with(xi, params)).powi(2))
        .sum();
    if dof == 0 {
        if ss == 0.0 {
            0.0
        } else {
            f64::NAN
        }
    } else {
        (ss / dof as f64).sqrt()
    }
}

pub(crate) fn fit_model<M: ParametricModel + ?Sized>(
    model: &mut M,
    x: &[f64],
    y: &[f64],
    options: &FitOptions,
    solver: &dyn LeastSquaresSolver,
) -> Result<FitDiagnostics> {
    validate(&*model, x, y, options)?;

    if options.method == FitMethod::Auto {
        if let Some(custom) = model.custom_fit(x, y, options) {
            let custom = custom?;
            let expected = model.state().len();
            if custom.values.len() != expected {
                return Err(ModelError::ParameterCountMismatch {
                    expected,
                    got: custom.values.len(),
                });
            }
            let n_free = free_indices(&*model, options).len();
            let diagnostics = FitDiagnostics {
                residual_std: residual_std(&*model, &custom.values, x, y, n_free),
                values: custom.values,
                uncertainties: custom.uncertainties,
                iterations: 0,
                path: FitPath::Custom,
                points: x.len(),
            };
            debug!(
                "{}: closed-form fit over {} point(s), residual std {:.6e}",
                model.name(),
                x.len(),
                diagnostics.residual_std
            );
            model.state_mut().record_fit(diagnostics.clone());
            return Ok(diagnostics);
        }
    }

    least_squares(model, x, y, options, solver)
}

fn least_squares<M: ParametricModel + ?Sized>(
    model: &mut M,
    x: &[f64],
    y: &[f64],
    options: &FitOptions,
    solver: &dyn LeastSquaresSolver,
) -> Result<FitDiagnostics> {
    let free = free_indices(&*model, options);
    if free.is_empty() {
        return Err(ModelError::NoFreeParameters {
            model: model.name().to_string(),
        });
    }
    if x.len() < free.len() {
        return Err(ModelError::InsufficientData {
            needed: free.len(),
            got: x.len(),
        });
    }

    let base = model.values().to_vec();
    let initial: Vec<f64> = free.iter().map(|&i| base[i]).collect();
    let expand = |p: &[f64]| -> Vec<f64> {
        let mut params = base.clone();
        for (&i, &v) in free.iter().zip(p) {
            params[i] = v;
        }
        params
    };

    debug!(
        "{}: least-squares fit of {} free parameter(s) over {} point(s)",
        model.name(),
        free.len(),
        x.len()
    );

    let outcome = {
        let frozen: &M = model;
        let residuals = |p: &[f64]| -> Vec<f64> {
            let params = expand(p);
            x.iter()
                .zip(y)
                .map(|(&xi, &yi)| frozen.eval_with(xi, &params) - yi)
                .collect()
        };
        solver.minimize(&residuals, &initial, options.weights.as_deref())
    };

    let solution = outcome.map_err(|failure| {
        debug!("{}: fit failed: {failure}", model.name());
        ModelError::FitDidNotConverge {
            reason: failure.to_string(),
            iterations: failure.iterations(),
            cost: failure.cost(),
        }
    })?;

    let values = expand(&solution.solution);
    let dof = x.len().saturating_sub(free.len());
    let uncertainties = solution.covariance.as_ref().map(|cov| {
        let s2 = if dof > 0 {
            solution.cost / dof as f64
        } else {
            f64::NAN
        };
        let mut sigma = vec![0.0; values.len()];
        for (k, &i) in free.iter().enumerate() {
            sigma[i] = (cov[(k, k)] * s2).abs().sqrt();
        }
        sigma
    });

    let diagnostics = FitDiagnostics {
        residual_std: residual_std(&*model, &values, x, y, free.len()),
        values,
        uncertainties,
        iterations: solution.iterations,
        path: FitPath::LeastSquares,
        points: x.len(),
    };
    model.state_mut().record_fit(diagnostics.clone());
    Ok(diagnostics)
}
