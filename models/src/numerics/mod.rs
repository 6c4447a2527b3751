//! Numerical building blocks behind the model contract

pub mod bspline;
pub mod levenberg_marquardt;
pub mod quadrature;

pub use bspline::{BSpline, SplineError};
pub use levenberg_marquardt::{
    LeastSquaresSolution, LeastSquaresSolver, LevenbergMarquardt, ResidualFn, SolverFailure,
};
pub use quadrature::{trapezoid, AdaptiveSimpson, Integrator};
