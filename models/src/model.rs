//! The parametric model contract
//!
//! A model supplies its name, its [`ModelState`] and a pure formula
//! [`ParametricModel::eval_with`]. Everything else (parameter access, array
//! evaluation, fitting, derivatives, integrals) has a default built on those
//! and can be overridden where a closed form exists.

use ndarray::{Array, Array1, ArrayBase, ArrayView1, Data, Dimension};
use std::f64::consts::PI;

use crate::error::Result;
use crate::fitting;
use crate::numerics::{AdaptiveSimpson, Integrator, LeastSquaresSolver, LevenbergMarquardt};
use crate::params::{FitDiagnostics, ModelState, Parameters};

/// How [`ParametricModel::fit`] picks its algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMethod {
    /// Use the model's closed-form fit when it has one
    #[default]
    Auto,
    /// Always use the generic least-squares path
    LeastSquares,
}

/// Options for a single fit
#[derive(Debug, Clone, Default)]
pub struct FitOptions {
    /// Parameters held at their current values
    pub fixed: Vec<String>,
    /// Per-point weights on the squared residuals, typically `1/σ²`
    pub weights: Option<Vec<f64>>,
    pub method: FitMethod,
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn least_squares() -> Self {
        Self::default().with_method(FitMethod::LeastSquares)
    }

    pub fn fix(mut self, name: impl Into<String>) -> Self {
        self.fixed.push(name.into());
        self
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_method(mut self, method: FitMethod) -> Self {
        self.method = method;
        self
    }

    pub fn is_fixed(&self, name: &str) -> bool {
        self.fixed.iter().any(|f| f == name)
    }
}

/// Result of a model's closed-form fit
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFit {
    pub values: Vec<f64>,
    pub uncertainties: Option<Vec<f64>>,
}

impl CustomFit {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            uncertainties: None,
        }
    }
}

pub trait ParametricModel {
    /// Registry name, lower case
    fn name(&self) -> &str;

    fn state(&self) -> &ModelState;

    fn state_mut(&mut self) -> &mut ModelState;

    /// The formula at `x` with explicit parameter values in parameter order
    fn eval_with(&self, x: f64, params: &[f64]) -> f64;

    /// Closed-form fit. `None` sends the fit down the generic path, either
    /// because the model has no closed form or because it cannot honour
    /// `options`.
    fn custom_fit(
        &mut self,
        _x: &[f64],
        _y: &[f64],
        _options: &FitOptions,
    ) -> Option<Result<CustomFit>> {
        None
    }

    fn parameter_names(&self) -> &[String] {
        self.state().names()
    }

    fn defaults(&self) -> &[f64] {
        self.state().defaults()
    }

    fn values(&self) -> &[f64] {
        self.state().values()
    }

    fn set_values(&mut self, values: &[f64]) -> Result<()> {
        self.state_mut().set_values(values)
    }

    fn get(&self, name: &str) -> Result<f64> {
        self.state().get(name)
    }

    fn set(&mut self, name: &str, value: f64) -> Result<()> {
        self.state_mut().set(name, value)
    }

    fn parameters(&self) -> Parameters {
        self.state().parameters()
    }

    fn update(&mut self, params: &Parameters) -> Result<()> {
        self.state_mut().update(params)
    }

    /// Back to defaults, forgetting the last fit
    fn reset(&mut self) {
        self.state_mut().reset();
    }

    fn last_fit(&self) -> Option<&FitDiagnostics> {
        self.state().last_fit()
    }

    fn evaluate(&self, x: f64) -> f64 {
        self.eval_with(x, self.values())
    }

    fn evaluate_array(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        x.mapv(|v| self.evaluate(v))
    }

    /// Fit to `(x, y)` with the default Levenberg-Marquardt settings
    fn fit(&mut self, x: &[f64], y: &[f64], options: &FitOptions) -> Result<FitDiagnostics> {
        self.fit_with_solver(x, y, options, &LevenbergMarquardt::default())
    }

    fn fit_with_solver(
        &mut self,
        x: &[f64],
        y: &[f64],
        options: &FitOptions,
        solver: &dyn LeastSquaresSolver,
    ) -> Result<FitDiagnostics> {
        fitting::fit_model(self, x, y, options, solver)
    }

    /// First derivative at `x`, by central difference unless overridden
    fn derivative(&self, x: f64) -> f64 {
        let h = f64::EPSILON.cbrt() * x.abs().max(1.0);
        (self.evaluate(x + h) - self.evaluate(x - h)) / (2.0 * h)
    }

    fn integrate(&self, lower: f64, upper: f64) -> Result<f64> {
        self.integrate_with(&AdaptiveSimpson::default(), lower, upper)
    }

    fn integrate_with(&self, integrator: &dyn Integrator, lower: f64, upper: f64) -> Result<f64> {
        integrator.integrate(&|x: f64| self.evaluate(x), lower, upper)
    }

    /// `4π ∫ r² f(r) dr`
    fn integrate_spherical(&self, lower: f64, upper: f64) -> Result<f64> {
        let shell = AdaptiveSimpson::default().integrate(&|r: f64| r * r * self.evaluate(r), lower, upper)?;
        Ok(4.0 * PI * shell)
    }

    /// Interval where the model is interesting, for sampling and plotting
    fn range_hint(&self) -> (f64, f64) {
        (-1.0, 1.0)
    }
}

/// Evaluation over arrays of any dimension
pub trait EvaluateNd {
    fn evaluate_nd<S, D>(&self, x: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension;
}

impl<M: ParametricModel + ?Sized> EvaluateNd for M {
    fn evaluate_nd<S, D>(&self, x: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        x.mapv(|v| self.evaluate(v))
    }
}

/// `n` evenly spaced samples across `range_hint()`
pub fn sample_range(model: &dyn ParametricModel, n: usize) -> (Vec<f64>, Vec<f64>) {
    let (low, high) = model.range_hint();
    let x: Vec<f64> = match n {
        0 => Vec::new(),
        1 => vec![0.5 * (low + high)],
        _ => (0..n)
            .map(|i| low + (high - low) * i as f64 / (n - 1) as f64)
            .collect(),
    };
    let y = x.iter().map(|&v| model.evaluate(v)).collect();
    (x, y)
}
