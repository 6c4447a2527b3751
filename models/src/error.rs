//! Error types for model evaluation and fitting

use thiserror::Error;

use crate::numerics::bspline::SplineError;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("fit did not converge after {iterations} iteration(s) (cost {cost:.6e}): {reason}")]
    FitDidNotConverge {
        reason: String,
        iterations: usize,
        cost: f64,
    },

    #[error("expected {expected} parameter value(s), got {got}")]
    ParameterCountMismatch { expected: usize, got: usize },

    #[error("unknown parameter '{name}', expected one of [{expected}]")]
    UnknownParameter { name: String, expected: String },

    #[error("unknown model '{name}', registered models are [{known}]")]
    UnknownModel { name: String, known: String },

    #[error("a model named '{0}' is already registered")]
    DuplicateModel(String),

    #[error("length mismatch: {what} has {got} values, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("insufficient data: need at least {needed} point(s), got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("every parameter of '{model}' is fixed, nothing to fit")]
    NoFreeParameters { model: String },

    #[error("integration over [{lower}, {upper}] failed: {reason}")]
    Integration {
        lower: f64,
        upper: f64,
        reason: String,
    },

    #[error("invalid value {value} for {what}: expected {expected}")]
    InvalidValue {
        what: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("unknown photometric band '{0}'")]
    UnknownBand(String),

    #[error("spline construction failed: {0}")]
    Spline(#[from] SplineError),
}

pub type Result<T> = std::result::Result<T, ModelError>;
