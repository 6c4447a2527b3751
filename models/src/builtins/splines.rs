//! Spline models
//!
//! The parameters of a spline model configure how the curve is built
//! (smoothing, degree, knot placement); the curve itself comes from the last
//! data the model was fitted to. Fitting therefore never changes the
//! parameters, it stores the data and rebuilds the spline. Before any fit the
//! model is built from a small identity data set.

use log::warn;

use crate::error::{ModelError, Result};
use crate::model::{CustomFit, FitOptions, ParametricModel};
use crate::numerics::bspline::{BSpline, SplineError, MAX_DEGREE};
use crate::params::ModelState;

type Builder = fn(&SplineData, &[f64]) -> Result<BSpline>;

/// Data a spline model was fitted to, and the spline built from it for one
/// set of parameter values
#[derive(Debug, Clone, PartialEq)]
struct SplineData {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Residual multipliers, the square root of the fit weights
    weights: Option<Vec<f64>>,
    built_for: Vec<f64>,
    spline: Option<BSpline>,
}

impl SplineData {
    fn identity(x: Vec<f64>, params: &[f64], build: Builder) -> Self {
        let mut data = Self {
            y: x.clone(),
            x,
            weights: None,
            built_for: Vec::new(),
            spline: None,
        };
        match build(&data, params) {
            Ok(spline) => {
                data.spline = Some(spline);
                data.built_for = params.to_vec();
            }
            Err(e) => warn!("initial spline could not be built: {e}"),
        }
        data
    }

    /// Sorted copy of a fit's data
    fn sorted(x: &[f64], y: &[f64], weights: Option<&[f64]>) -> Self {
        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
        Self {
            x: order.iter().map(|&i| x[i]).collect(),
            y: order.iter().map(|&i| y[i]).collect(),
            weights: weights.map(|w| order.iter().map(|&i| w[i].sqrt()).collect()),
            built_for: Vec::new(),
            spline: None,
        }
    }

    fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    fn span(&self) -> (f64, f64) {
        match (self.x.first(), self.x.last()) {
            (Some(&low), Some(&high)) => (low, high),
            _ => (0.0, 1.0),
        }
    }

    fn cached(&self, params: &[f64]) -> Option<&BSpline> {
        self.spline.as_ref().filter(|_| self.built_for == params)
    }

    fn evaluate(&self, x: f64, params: &[f64], build: Builder) -> f64 {
        match self.cached(params) {
            Some(spline) => spline.evaluate(x),
            None => build(self, params).map_or(f64::NAN, |s| s.evaluate(x)),
        }
    }

    fn derivative(&self, x: f64, params: &[f64], build: Builder) -> f64 {
        match self.cached(params) {
            Some(spline) => spline.derivative(x),
            None => build(self, params).map_or(f64::NAN, |s| s.derivative(x)),
        }
    }

    /// Replace the data with `x`/`y` and rebuild; unchanged on failure
    fn refit(
        &mut self,
        x: &[f64],
        y: &[f64],
        options: &FitOptions,
        params: &[f64],
        build: Builder,
    ) -> Result<()> {
        let mut fresh = Self::sorted(x, y, options.weights.as_deref());
        let spline = build(&fresh, params)?;
        fresh.spline = Some(spline);
        fresh.built_for = params.to_vec();
        *self = fresh;
        Ok(())
    }
}

fn degree(value: f64) -> Result<usize> {
    let d = value.round();
    if !(1.0..=MAX_DEGREE as f64).contains(&d) {
        return Err(SplineError::InvalidDegree(d.max(0.0) as usize).into());
    }
    Ok(d as usize)
}

fn knot_count(value: f64) -> Result<usize> {
    let n = value.round();
    if !(n >= 0.0 && n.is_finite()) {
        return Err(ModelError::InvalidValue {
            what: "knot count",
            value,
            expected: "a non-negative integer",
        });
    }
    Ok(n as usize)
}

fn linspace(low: f64, high: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![low],
        _ => (0..n)
            .map(|i| low + (high - low) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// The `n` points strictly between `low` and `high` that split it evenly
fn interior_linspace(low: f64, high: f64, n: usize) -> Vec<f64> {
    (1..=n)
        .map(|i| low + (high - low) * i as f64 / (n + 1) as f64)
        .collect()
}

/// Piecewise-linear interpolation of `xp` → `fp` at `x`; `xp` ascending
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }
    let i = xp.partition_point(|&v| v <= x);
    let (x0, x1) = (xp[i - 1], xp[i]);
    let t = (x - x0) / (x1 - x0);
    fp[i - 1] + t * (fp[i] - fp[i - 1])
}

/// Interior knots at evenly spaced quantiles of the data's histogram CDF
fn cdf_knots(x: &[f64], nknots: usize) -> Vec<f64> {
    let (low, high) = (x[0], x[x.len() - 1]);
    let bins = 10.max(2 * nknots).max(x.len() / 10);
    let width = (high - low) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &v in x {
        let bin = if width > 0.0 {
            (((v - low) / width) as usize).min(bins - 1)
        } else {
            0
        };
        counts[bin] += 1;
    }

    let total = x.len() as f64;
    let mut edges = vec![low];
    let mut cdf = vec![0.0];
    let mut running = 0usize;
    for (i, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        running += count;
        edges.push(low + width * (i + 1) as f64);
        cdf.push(running as f64 / total);
    }

    interior_linspace(0.0, 1.0, nknots)
        .into_iter()
        .map(|q| interp(q, &cdf, &edges))
        .collect()
}

macro_rules! spline_model {
    ($ty:ident) => {
        impl ParametricModel for $ty {
            model_state!();

            fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
                self.data.evaluate(x, params, Self::build)
            }

            fn custom_fit(
                &mut self,
                x: &[f64],
                y: &[f64],
                options: &FitOptions,
            ) -> Option<Result<CustomFit>> {
                let params = Self::fitted_params(self.state.values());
                Some(
                    self.data
                        .refit(x, y, options, &params, Self::build)
                        .map(|()| CustomFit::new(params)),
                )
            }

            fn derivative(&self, x: f64) -> f64 {
                self.data.derivative(x, self.state.values(), Self::build)
            }

            fn range_hint(&self) -> (f64, f64) {
                self.data.span()
            }
        }
    };
}

/// Smoothing spline: the weighted residual sum of squares is held at `s`
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothSpline {
    state: ModelState,
    data: SplineData,
}

impl Default for SmoothSpline {
    fn default() -> Self {
        let state = ModelState::new(&["s", "degree"], &[2.0, 3.0]);
        let data = SplineData::identity(linspace(0.0, 3.0, 4), state.values(), Self::build);
        Self { state, data }
    }
}

impl SmoothSpline {
    pub const NAME: &'static str = "smoothspline";

    pub fn new() -> Self {
        Self::default()
    }

    fn build(data: &SplineData, params: &[f64]) -> Result<BSpline> {
        Ok(BSpline::fit_smoothing(
            &data.x,
            &data.y,
            data.weights(),
            degree(params[1])?,
            params[0],
        )?)
    }

    fn fitted_params(params: &[f64]) -> Vec<f64> {
        params.to_vec()
    }
}

spline_model!(SmoothSpline);

/// Interpolating spline through every fitted point
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedSpline {
    state: ModelState,
    data: SplineData,
}

impl Default for InterpolatedSpline {
    fn default() -> Self {
        let state = ModelState::new(&["degree"], &[3.0]);
        let data = SplineData::identity(linspace(0.0, 3.0, 4), state.values(), Self::build);
        Self { state, data }
    }
}

impl InterpolatedSpline {
    pub const NAME: &'static str = "interpolatedspline";

    pub fn new() -> Self {
        Self::default()
    }

    fn build(data: &SplineData, params: &[f64]) -> Result<BSpline> {
        Ok(BSpline::interpolate(&data.x, &data.y, degree(params[0])?)?)
    }

    fn fitted_params(params: &[f64]) -> Vec<f64> {
        params.to_vec()
    }
}

spline_model!(InterpolatedSpline);

/// Least-squares spline with `nknots` evenly spaced interior knots
#[derive(Debug, Clone, PartialEq)]
pub struct UniformKnotSpline {
    state: ModelState,
    data: SplineData,
}

impl Default for UniformKnotSpline {
    fn default() -> Self {
        let state = ModelState::new(&["nknots", "degree"], &[3.0, 3.0]);
        let data = SplineData::identity(linspace(0.0, 6.0, 7), state.values(), Self::build);
        Self { state, data }
    }
}

impl UniformKnotSpline {
    pub const NAME: &'static str = "uniformknotspline";

    pub fn new() -> Self {
        Self::default()
    }

    fn build(data: &SplineData, params: &[f64]) -> Result<BSpline> {
        let (low, high) = data.span();
        let interior = interior_linspace(low, high, knot_count(params[0])?);
        Ok(BSpline::fit_least_squares(
            &data.x,
            &data.y,
            data.weights(),
            &interior,
            degree(params[1])?,
        )?)
    }

    fn fitted_params(params: &[f64]) -> Vec<f64> {
        params.to_vec()
    }
}

spline_model!(UniformKnotSpline);

/// Least-squares spline with `nknots` interior knots placed so each span
/// holds about the same share of the data
#[derive(Debug, Clone, PartialEq)]
pub struct UniformCdfKnotSpline {
    state: ModelState,
    data: SplineData,
}

impl Default for UniformCdfKnotSpline {
    fn default() -> Self {
        let state = ModelState::new(&["nknots", "degree"], &[3.0, 3.0]);
        let data = SplineData::identity(linspace(0.0, 6.0, 7), state.values(), Self::build);
        Self { state, data }
    }
}

impl UniformCdfKnotSpline {
    pub const NAME: &'static str = "uniformcdfknotspline";

    pub fn new() -> Self {
        Self::default()
    }

    fn build(data: &SplineData, params: &[f64]) -> Result<BSpline> {
        let nknots = knot_count(params[0])?;
        let degree = degree(params[1])?;
        if data.x.len() < 2 {
            return Err(SplineError::TooFewPoints {
                degree,
                knots: nknots,
                needed: (nknots + degree + 1).max(2),
                got: data.x.len(),
            }
            .into());
        }
        let interior = cdf_knots(&data.x, nknots);
        Ok(BSpline::fit_least_squares(
            &data.x,
            &data.y,
            data.weights(),
            &interior,
            degree,
        )?)
    }

    fn fitted_params(params: &[f64]) -> Vec<f64> {
        params.to_vec()
    }
}

spline_model!(UniformCdfKnotSpline);

/// Least-squares spline whose interior knots are parameters `k0..k{n-1}`
#[derive(Debug, Clone, PartialEq)]
pub struct SpecifiedKnotSpline {
    state: ModelState,
    data: SplineData,
}

impl Default for SpecifiedKnotSpline {
    fn default() -> Self {
        Self::with_knots(3)
    }
}

impl SpecifiedKnotSpline {
    pub const NAME: &'static str = "specifiedknotspline";

    pub fn new() -> Self {
        Self::default()
    }

    /// Model with `n` knot parameters, initially spread over `[-1, 1]`
    pub fn with_knots(n: usize) -> Self {
        let names = std::iter::once("degree".to_string())
            .chain((0..n).map(|i| format!("k{i}")))
            .collect();
        let defaults = std::iter::once(3.0)
            .chain(linspace(-1.0, 1.0, n))
            .collect();
        let state = ModelState::from_parts(names, defaults);
        let data = SplineData::identity(linspace(-2.0, 2.0, n + 4), state.values(), Self::build);
        Self { state, data }
    }

    pub fn knots(&self) -> &[f64] {
        &self.state.values()[1..]
    }

    pub fn set_knots(&mut self, knots: &[f64]) -> Result<()> {
        let expected = self.state.len() - 1;
        if knots.len() != expected {
            return Err(ModelError::ParameterCountMismatch {
                expected,
                got: knots.len(),
            });
        }
        for (i, &k) in knots.iter().enumerate() {
            self.state.set_value(i + 1, k);
        }
        Ok(())
    }

    fn build(data: &SplineData, params: &[f64]) -> Result<BSpline> {
        let mut interior = params[1..].to_vec();
        interior.sort_by(f64::total_cmp);
        Ok(BSpline::fit_least_squares(
            &data.x,
            &data.y,
            data.weights(),
            &interior,
            degree(params[0])?,
        )?)
    }

    /// Knots come back sorted
    fn fitted_params(params: &[f64]) -> Vec<f64> {
        let mut fitted = params.to_vec();
        fitted[1..].sort_by(f64::total_cmp);
        fitted
    }
}

spline_model!(SpecifiedKnotSpline);
