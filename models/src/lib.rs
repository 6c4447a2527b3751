//! Parametric one-dimensional models
//!
//! Every model implements [`ParametricModel`]: named parameters with
//! defaults, evaluation over scalars and arrays, fitting, and derived
//! quantities (derivative, integrals). Fits try a model's closed form first
//! and fall back to Levenberg-Marquardt least squares.
//!
//! ```
//! use models::{FitOptions, ModelRegistry};
//!
//! let registry = ModelRegistry::with_builtins();
//! let mut line = registry.create("linear").unwrap();
//!
//! let x = [0.0, 1.0, 2.0, 3.0];
//! let y = [1.0, 3.0, 5.0, 7.0];
//! let fit = line.fit(&x, &y, &FitOptions::new()).unwrap();
//!
//! assert!((line.get("m").unwrap() - 2.0).abs() < 1e-12);
//! assert!(fit.residual_std < 1e-12);
//! ```

pub mod builtins;
pub mod constants;
pub mod error;
mod fitting;
pub mod model;
pub mod numerics;
pub mod params;
pub mod photometry;
pub mod registry;

pub use error::{ModelError, Result};
pub use model::{sample_range, CustomFit, EvaluateNd, FitMethod, FitOptions, ParametricModel};
pub use numerics::{
    AdaptiveSimpson, BSpline, Integrator, LeastSquaresSolver, LevenbergMarquardt, SplineError,
};
pub use params::{FitDiagnostics, FitPath, ModelState, Parameters};
pub use registry::{Constructor, ModelRegistry};
