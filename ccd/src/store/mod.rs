//! Image store seam
//!
//! The reduction engine never touches a file format directly. It talks to an
//! [`Image`]: a multi-plane raster container with a per-plane header. An
//! [`ImageStore`] opens images by path.
//!
//! Two implementations ship with the crate:
//! * [`memory::MemoryStore`] / [`memory::MemoryImage`] - always available
//! * `fits::FitsStore` / `fits::FitsImage` - behind the `fits` feature

pub mod memory;

#[cfg(feature = "fits")]
pub mod fits;

use ndarray::{Array2, ArrayView2};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::range::PixelBox;

pub use memory::{MemoryImage, MemoryStore};

#[cfg(feature = "fits")]
pub use fits::{FitsImage, FitsStore};

/// A scalar header value
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl HeaderValue {
    /// Numeric view of the value, parsing text when it holds a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Int(v) => Some(*v as f64),
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Text(s) => s.trim().parse().ok(),
            HeaderValue::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeaderValue::Int(v) => write!(f, "{v}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Text(s) => write!(f, "'{s}'"),
            HeaderValue::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
        }
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Text(v.to_string())
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Bool(v)
    }
}

/// Header keys are stored upper-case
pub type Header = BTreeMap<String, HeaderValue>;

/// Errors raised by image store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported image format for {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("plane {index} not found, image has {count} plane(s)")]
    PlaneNotFound { index: usize, count: usize },

    #[error("region {region} exceeds plane extent {width}x{height}")]
    RegionOutOfBounds {
        region: PixelBox,
        width: usize,
        height: usize,
    },

    #[error("shape mismatch: region expects {expected:?}, data has {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("plane {index} is not a 2-D image (shape {shape:?})")]
    NotAnImage { index: usize, shape: Vec<usize> },

    #[error("image has been closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "fits")]
    #[error("FITS error: {0}")]
    Fits(#[from] fitsio::errors::Error),
}

/// A multi-plane raster image with per-plane headers
///
/// Planes are indexed from zero and stored as (rows, cols) = (y, x).
pub trait Image {
    /// Number of planes in the container
    fn plane_count(&self) -> usize;

    /// Read a full plane
    fn read_plane(&mut self, index: usize) -> Result<Array2<f64>, StoreError>;

    /// Write `data` into `region` of a plane
    fn write_region(
        &mut self,
        index: usize,
        region: PixelBox,
        data: ArrayView2<f64>,
    ) -> Result<(), StoreError>;

    /// Header of a plane
    fn header(&mut self, index: usize) -> Result<Header, StoreError>;

    /// Release the underlying resource. Further access fails with
    /// `StoreError::Closed`; closing twice is allowed.
    fn close(&mut self) -> Result<(), StoreError>;
}

/// Opens images by path
pub trait ImageStore {
    type Image: Image;

    fn open(&self, path: &Path) -> Result<Self::Image, StoreError>;
}

/// Bounds and shape checks shared by store implementations
pub(crate) fn check_region(
    region: PixelBox,
    plane_dim: (usize, usize),
    data_dim: (usize, usize),
) -> Result<(), StoreError> {
    let (height, width) = plane_dim;
    if region.x_max() > width || region.y_max() > height {
        return Err(StoreError::RegionOutOfBounds {
            region,
            width,
            height,
        });
    }
    if region.dim() != data_dim {
        return Err(StoreError::ShapeMismatch {
            expected: region.dim(),
            got: data_dim,
        });
    }
    Ok(())
}
