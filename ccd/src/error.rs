//! Error types for the CCD reduction engine

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the range selector, scaling registry, clipping engine
/// and active-view engine.
#[derive(Debug, Error)]
pub enum CcdError {
    #[error("unknown scaling mode '{0}', expected one of linear|log|sb|exp|power|asinh")]
    UnknownScalingMode(String),

    #[error("invalid {mode} transform: {reason}")]
    InvalidTransform { mode: &'static str, reason: String },

    #[error("surface brightness scaling requires {missing} to be set on the image")]
    MissingCalibration { missing: &'static str },

    #[error("degenerate range on {axis} axis: low={low} high={high} (extent {extent})")]
    DegenerateRange {
        axis: &'static str,
        low: i64,
        high: i64,
        extent: usize,
    },

    #[error("no inverse available for {mode} scaling, edits cannot be committed")]
    NoInverseAvailable { mode: String },

    #[error("unknown replacement policy '{0}', expected mask|median|mean|noclipmedian|noclipmean|fullmedian|fullmean or a number")]
    UnknownReplacementPolicy(String),

    #[error("unknown comparator '{0}', expected one of <, >, <=, >=")]
    UnknownComparator(String),

    #[error("unknown display range '{0}'")]
    UnknownDisplayRange(String),

    #[error("cannot compute {statistic}: no pixels left after excluding {excluded} of {total}")]
    EmptySelection {
        statistic: &'static str,
        excluded: usize,
        total: usize,
    },

    #[error("plane {index} out of range, image has {count} plane(s)")]
    PlaneOutOfRange { index: usize, count: usize },

    #[error("engine config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image store error: {0}")]
    Store(#[from] StoreError),
}
