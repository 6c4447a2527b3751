//! In-memory image store, used by tests and by callers that already hold
//! their pixels in arrays.

use ndarray::{s, Array2, ArrayView2};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{check_region, Header, HeaderValue, Image, ImageStore, StoreError};
use crate::range::PixelBox;

#[derive(Debug, Clone)]
struct Plane {
    data: Array2<f64>,
    header: Header,
}

/// A multi-plane image held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    planes: Vec<Plane>,
    closed: bool,
}

impl MemoryImage {
    /// Single-plane image with an empty header
    pub fn from_array(data: Array2<f64>) -> Self {
        Self::default().with_plane(data, Header::new())
    }

    /// Append a plane (builder style)
    pub fn with_plane(mut self, data: Array2<f64>, header: Header) -> Self {
        self.push_plane(data, header);
        self
    }

    pub fn push_plane(&mut self, data: Array2<f64>, header: Header) {
        let header = header
            .into_iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect();
        self.planes.push(Plane { data, header });
    }

    /// Set a header card on a plane; out-of-range planes are ignored
    pub fn set_header(&mut self, index: usize, key: &str, value: impl Into<HeaderValue>) {
        if let Some(plane) = self.planes.get_mut(index) {
            plane.header.insert(key.to_ascii_uppercase(), value.into());
        }
    }

    /// Borrow the raw pixels of a plane
    pub fn plane(&self, index: usize) -> Option<&Array2<f64>> {
        self.planes.get(index).map(|p| &p.data)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn plane_checked(&self, index: usize) -> Result<&Plane, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.planes.get(index).ok_or(StoreError::PlaneNotFound {
            index,
            count: self.planes.len(),
        })
    }
}

impl Image for MemoryImage {
    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn read_plane(&mut self, index: usize) -> Result<Array2<f64>, StoreError> {
        Ok(self.plane_checked(index)?.data.clone())
    }

    fn write_region(
        &mut self,
        index: usize,
        region: PixelBox,
        data: ArrayView2<f64>,
    ) -> Result<(), StoreError> {
        let dim = self.plane_checked(index)?.data.dim();
        check_region(region, dim, data.dim())?;

        let plane = &mut self.planes[index];
        plane
            .data
            .slice_mut(s![region.y_min..region.y_max(), region.x_min..region.x_max()])
            .assign(&data);
        Ok(())
    }

    fn header(&mut self, index: usize) -> Result<Header, StoreError> {
        Ok(self.plane_checked(index)?.header.clone())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        Ok(())
    }
}

/// Named registry of in-memory images
///
/// `open` hands out a copy of the registered image, so writes through the
/// engine do not alter the registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    images: HashMap<PathBuf, MemoryImage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, image: MemoryImage) {
        self.images.insert(path.into(), image);
    }
}

impl ImageStore for MemoryStore {
    type Image = MemoryImage;

    fn open(&self, path: &Path) -> Result<MemoryImage, StoreError> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "no image registered under this name".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_write_region_updates_only_region() {
        let mut image = MemoryImage::from_array(Array2::zeros((3, 4)));
        let patch = array![[1.0, 2.0], [3.0, 4.0]];
        image
            .write_region(0, PixelBox::new(1, 1, 2, 2), patch.view())
            .unwrap();

        let plane = image.plane(0).unwrap();
        assert_eq!(plane[[1, 1]], 1.0);
        assert_eq!(plane[[1, 2]], 2.0);
        assert_eq!(plane[[2, 1]], 3.0);
        assert_eq!(plane[[2, 2]], 4.0);
        assert_eq!(plane.sum(), 10.0);
    }

    #[test]
    fn test_header_keys_are_uppercased() {
        let mut header = Header::new();
        header.insert("pixscale".to_string(), HeaderValue::Float(0.4));
        let mut image = MemoryImage::default().with_plane(Array2::zeros((2, 2)), header);
        image.set_header(0, "zeropt", 25.0);

        let header = image.header(0).unwrap();
        assert_eq!(header.get("PIXSCALE"), Some(&HeaderValue::Float(0.4)));
        assert_eq!(header.get("ZEROPT"), Some(&HeaderValue::Float(25.0)));
    }

    #[test]
    fn test_missing_plane_and_closed() {
        let mut image = MemoryImage::from_array(Array2::zeros((2, 2)));
        assert!(matches!(
            image.read_plane(1),
            Err(StoreError::PlaneNotFound { index: 1, count: 1 })
        ));
        image.close().unwrap();
        image.close().unwrap();
        assert!(matches!(image.read_plane(0), Err(StoreError::Closed)));
    }

    #[test]
    fn test_store_unknown_path_is_unsupported() {
        let mut store = MemoryStore::new();
        store.insert("frame", MemoryImage::from_array(Array2::zeros((2, 2))));
        assert!(store.open(Path::new("frame")).is_ok());
        assert!(matches!(
            store.open(Path::new("other")),
            Err(StoreError::UnsupportedFormat { .. })
        ));
    }
}
