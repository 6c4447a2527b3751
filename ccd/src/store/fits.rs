//! FITS-backed image store (feature `fits`)
//!
//! Every HDU holding a 2-D image is one plane, in file order. Files are
//! opened read-write so that committed edits land on disk.

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::FitsFile;
use ndarray::{s, Array2, ArrayView2};
use std::path::{Path, PathBuf};

use super::{check_region, Header, HeaderValue, Image, ImageStore, StoreError};
use crate::range::PixelBox;

/// Header cards the engine understands; other cards are not loaded
const KNOWN_KEYS: &[&str] = &[
    "PIXSCALE", "PIXSCAL1", "PIXSCAL2", "ZEROPT", "MAGZPT", "EXTNAME", "OBJECT", "EXPTIME",
    "BUNIT",
];

const FITS_EXTENSIONS: &[&str] = &["fits", "fit", "fts"];

/// Opens `.fits`, `.fit` and `.fts` files
#[derive(Debug, Clone, Copy, Default)]
pub struct FitsStore;

impl ImageStore for FitsStore {
    type Image = FitsImage;

    fn open(&self, path: &Path) -> Result<FitsImage, StoreError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext {
            Some(e) if FITS_EXTENSIONS.contains(&e.as_str()) => FitsImage::open(path),
            _ => Err(StoreError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "expected a .fits, .fit or .fts file".to_string(),
            }),
        }
    }
}

/// An open FITS file
pub struct FitsImage {
    path: PathBuf,
    fptr: Option<FitsFile>,
    /// HDU index of each plane
    planes: Vec<usize>,
}

impl std::fmt::Debug for FitsImage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("FitsImage")
            .field("path", &self.path)
            .field("open", &self.fptr.is_some())
            .field("planes", &self.planes)
            .finish()
    }
}

impl FitsImage {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut fptr = FitsFile::edit(path)?;

        let mut planes = Vec::new();
        let mut hdu_idx = 0;
        while let Ok(hdu) = fptr.hdu(hdu_idx) {
            if let HduInfo::ImageInfo { shape, .. } = &hdu.info {
                if shape.len() == 2 {
                    planes.push(hdu_idx);
                }
            }
            hdu_idx += 1;
        }

        if planes.is_empty() {
            return Err(StoreError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "no 2-D image HDU found".to_string(),
            });
        }

        log::debug!(
            "Opened {} with {} image plane(s) across {} HDU(s)",
            path.display(),
            planes.len(),
            hdu_idx
        );

        Ok(Self {
            path: path.to_path_buf(),
            fptr: Some(fptr),
            planes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn hdu(&mut self, index: usize) -> Result<(&mut FitsFile, FitsHdu, (usize, usize)), StoreError> {
        let hdu_idx = *self.planes.get(index).ok_or(StoreError::PlaneNotFound {
            index,
            count: self.planes.len(),
        })?;
        let fptr = self.fptr.as_mut().ok_or(StoreError::Closed)?;
        let hdu = fptr.hdu(hdu_idx)?;
        let dim = match &hdu.info {
            HduInfo::ImageInfo { shape, .. } if shape.len() == 2 => (shape[0], shape[1]),
            HduInfo::ImageInfo { shape, .. } => {
                return Err(StoreError::NotAnImage {
                    index,
                    shape: shape.clone(),
                })
            }
            _ => {
                return Err(StoreError::NotAnImage {
                    index,
                    shape: Vec::new(),
                })
            }
        };
        Ok((fptr, hdu, dim))
    }
}

/// Numeric cards load as `Float`: cfitsio's integer read truncates
/// fractional values without reporting an error
fn read_header_value(hdu: &FitsHdu, fptr: &mut FitsFile, key: &str) -> Option<HeaderValue> {
    if let Ok(v) = hdu.read_key::<f64>(fptr, key) {
        return Some(HeaderValue::Float(v));
    }
    hdu.read_key::<String>(fptr, key).ok().map(HeaderValue::Text)
}

impl Image for FitsImage {
    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn read_plane(&mut self, index: usize) -> Result<Array2<f64>, StoreError> {
        let (fptr, hdu, dim) = self.hdu(index)?;
        let raw: Vec<f64> = hdu.read_image(fptr)?;
        Array2::from_shape_vec(dim, raw).map_err(|_| StoreError::NotAnImage {
            index,
            shape: vec![dim.0, dim.1],
        })
    }

    fn write_region(
        &mut self,
        index: usize,
        region: PixelBox,
        data: ArrayView2<f64>,
    ) -> Result<(), StoreError> {
        let (fptr, hdu, dim) = self.hdu(index)?;
        check_region(region, dim, data.dim())?;

        // Splice into the full plane and rewrite it; keeps row/column order
        // identical to read_plane.
        let raw: Vec<f64> = hdu.read_image(fptr)?;
        let mut plane = Array2::from_shape_vec(dim, raw).map_err(|_| StoreError::NotAnImage {
            index,
            shape: vec![dim.0, dim.1],
        })?;
        plane
            .slice_mut(s![region.y_min..region.y_max(), region.x_min..region.x_max()])
            .assign(&data);
        let flat: Vec<f64> = plane.iter().copied().collect();
        hdu.write_image(fptr, &flat)?;
        Ok(())
    }

    fn header(&mut self, index: usize) -> Result<Header, StoreError> {
        let (fptr, hdu, _) = self.hdu(index)?;
        let mut header = Header::new();
        for key in KNOWN_KEYS {
            if let Some(value) = read_header_value(&hdu, fptr, key) {
                header.insert(key.to_string(), value);
            }
        }
        Ok(header)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.fptr.take().is_some() {
            log::debug!("Closed {}", self.path.display());
        }
        Ok(())
    }
}
