//! CCD image reduction engine
//!
//! Interactive reduction over raster astronomical images: select a region,
//! view it through an intensity scaling, flag and replace bad pixels, then
//! commit the edits back to the image.
//!
//! ```
//! use ccd::{CcdImage, MemoryImage, RangeSpec, ReplacementPolicy, ScalingMode};
//! use ndarray::Array2;
//!
//! let pixels = Array2::from_shape_fn((32, 32), |(r, c)| (r * 32 + c) as f64 + 1.0);
//! let mut ccd = CcdImage::new(MemoryImage::from_array(pixels)).unwrap();
//!
//! ccd.activate(RangeSpec::centered(16, 16, 4)).unwrap();
//! ccd.set_scaling(ScalingMode::Asinh).unwrap();
//! let flagged = ccd.clip_sigma(3.0, false, ReplacementPolicy::Median).unwrap();
//! ccd.commit().unwrap();
//! assert_eq!(ccd.shape(), (8, 8));
//! # let _ = flagged;
//! ```

pub mod clip;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod range;
pub mod scaling;
pub mod stats;
pub mod store;
pub mod view;

pub use clip::{ClipKind, Comparator, ReplacementPolicy};
pub use config::{EngineConfig, MissingInversePolicy};
pub use display::DisplayRange;
pub use engine::{open, CcdImage, OffsetSpec};
pub use error::CcdError;
pub use range::{normalize, Extent, PixelBox, RangeSpec};
pub use scaling::{resolve, ScaleFn, ScalingContext, ScalingMode, Transform};
pub use stats::GlobalStats;
pub use store::{Header, HeaderValue, Image, ImageStore, MemoryImage, MemoryStore, StoreError};
pub use view::{ActiveView, ViewState};

#[cfg(feature = "fits")]
pub use store::{FitsImage, FitsStore};
