//! Sub-region selection for the active view
//!
//! A [`RangeSpec`] is what the caller asks for; a [`PixelBox`] is what the
//! engine actually operates on after [`normalize`] has validated the request
//! and recentered it inside the image.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CcdError;

/// Width and height of a raster plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    /// Number of columns (x axis)
    pub width: usize,
    /// Number of rows (y axis)
    pub height: usize,
}

impl Extent {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Extent of an array stored as (rows, cols)
    pub fn from_dim((rows, cols): (usize, usize)) -> Self {
        Self {
            width: cols,
            height: rows,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A caller's description of which part of the image to operate on
///
/// Box bounds are half-open: `x_low..x_high`, `y_low..y_high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeSpec {
    /// The whole plane
    Whole,
    /// Corner bounds
    Box {
        x_low: i64,
        x_high: i64,
        y_low: i64,
        y_high: i64,
    },
    /// A square of half-size `radius` around a center pixel
    CenterRadius {
        x_center: i64,
        y_center: i64,
        radius: i64,
    },
}

impl RangeSpec {
    pub fn from_box(x_low: i64, x_high: i64, y_low: i64, y_high: i64) -> Self {
        RangeSpec::Box {
            x_low,
            x_high,
            y_low,
            y_high,
        }
    }

    pub fn centered(x_center: i64, y_center: i64, radius: i64) -> Self {
        RangeSpec::CenterRadius {
            x_center,
            y_center,
            radius,
        }
    }
}

impl From<PixelBox> for RangeSpec {
    fn from(b: PixelBox) -> Self {
        RangeSpec::Box {
            x_low: b.x_min as i64,
            x_high: b.x_max() as i64,
            y_low: b.y_min as i64,
            y_high: b.y_max() as i64,
        }
    }
}

/// A validated, in-bounds pixel region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelBox {
    /// First column
    pub x_min: usize,
    /// First row
    pub y_min: usize,
    /// Number of columns
    pub width: usize,
    /// Number of rows
    pub height: usize,
}

impl PixelBox {
    pub fn new(x_min: usize, y_min: usize, width: usize, height: usize) -> Self {
        Self {
            x_min,
            y_min,
            width,
            height,
        }
    }

    /// Box covering a whole plane
    pub fn full(extent: Extent) -> Self {
        Self::new(0, 0, extent.width, extent.height)
    }

    /// One past the last column
    pub fn x_max(&self) -> usize {
        self.x_min + self.width
    }

    /// One past the last row
    pub fn y_max(&self) -> usize {
        self.y_min + self.height
    }

    /// Storage shape (rows, cols) of an array covering this box
    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// True if the box lies entirely inside `extent`
    pub fn fits_in(&self, extent: Extent) -> bool {
        self.x_max() <= extent.width && self.y_max() <= extent.height
    }
}

impl fmt::Display for PixelBox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}:{}, {}:{}]",
            self.x_min,
            self.x_max(),
            self.y_min,
            self.y_max()
        )
    }
}

/// Validate one axis and recenter it inside `0..extent`.
///
/// Reversed bounds are swapped, equal bounds are rejected. A window wider
/// than the extent collapses to the full axis; otherwise it is shifted (not
/// truncated) so that the requested width is kept.
fn normalize_axis(
    axis: &'static str,
    low: i64,
    high: i64,
    extent: usize,
) -> Result<(usize, usize), CcdError> {
    if low == high || extent == 0 {
        return Err(CcdError::DegenerateRange {
            axis,
            low,
            high,
            extent,
        });
    }
    let (mut low, mut high) = if high < low { (high, low) } else { (low, high) };

    let ext = extent as i64;
    if high.saturating_sub(low) > ext {
        low = 0;
        high = ext;
    } else if low < 0 {
        high -= low;
        low = 0;
    } else if high > ext {
        low -= high - ext;
        high = ext;
    }

    Ok((low as usize, (high - low) as usize))
}

/// Turn a range request into a validated box inside `extent`.
///
/// # Errors
/// * `CcdError::DegenerateRange` - zero-area request on either axis, or an
///   empty image
pub fn normalize(spec: RangeSpec, extent: Extent) -> Result<PixelBox, CcdError> {
    let (x_low, x_high, y_low, y_high) = match spec {
        RangeSpec::Whole => {
            if extent.pixel_count() == 0 {
                return Err(CcdError::DegenerateRange {
                    axis: if extent.width == 0 { "x" } else { "y" },
                    low: 0,
                    high: 0,
                    extent: 0,
                });
            }
            return Ok(PixelBox::full(extent));
        }
        RangeSpec::Box {
            x_low,
            x_high,
            y_low,
            y_high,
        } => (x_low, x_high, y_low, y_high),
        RangeSpec::CenterRadius {
            x_center,
            y_center,
            radius,
        } => (
            x_center.saturating_sub(radius),
            x_center.saturating_add(radius),
            y_center.saturating_sub(radius),
            y_center.saturating_add(radius),
        ),
    };

    let (x_min, width) = normalize_axis("x", x_low, x_high, extent.width)?;
    let (y_min, height) = normalize_axis("y", y_low, y_high, extent.height)?;

    Ok(PixelBox::new(x_min, y_min, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EXTENT: Extent = Extent {
        width: 100,
        height: 50,
    };

    #[test]
    fn test_whole_covers_extent() {
        let b = normalize(RangeSpec::Whole, EXTENT).unwrap();
        assert_eq!(b, PixelBox::new(0, 0, 100, 50));
        assert_eq!(b.dim(), (50, 100));
    }

    #[test]
    fn test_box_inside_is_unchanged() {
        let b = normalize(RangeSpec::from_box(10, 20, 5, 15), EXTENT).unwrap();
        assert_eq!(b, PixelBox::new(10, 5, 10, 10));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(RangeSpec::from_box(3, 97, 1, 49), EXTENT).unwrap();
        let twice = normalize(RangeSpec::from(once), EXTENT).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_reversed_bounds_are_swapped() {
        let b = normalize(RangeSpec::from_box(20, 10, 15, 5), EXTENT).unwrap();
        assert_eq!(b, PixelBox::new(10, 5, 10, 10));
    }

    #[rstest]
    #[case(RangeSpec::from_box(10, 10, 0, 5), "x")]
    #[case(RangeSpec::from_box(0, 5, 7, 7), "y")]
    #[case(RangeSpec::centered(10, 10, 0), "x")]
    fn test_zero_area_is_degenerate(#[case] spec: RangeSpec, #[case] expected_axis: &str) {
        match normalize(spec, EXTENT) {
            Err(CcdError::DegenerateRange { axis, .. }) => assert_eq!(axis, expected_axis),
            other => panic!("expected DegenerateRange, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_low_shifts_right_keeping_width() {
        let b = normalize(RangeSpec::from_box(-5, 15, 0, 10), EXTENT).unwrap();
        assert_eq!(b, PixelBox::new(0, 0, 20, 10));
    }

    #[test]
    fn test_overflowing_high_shifts_left_keeping_width() {
        let b = normalize(RangeSpec::from_box(90, 110, 45, 55), EXTENT).unwrap();
        assert_eq!(b, PixelBox::new(80, 40, 20, 10));
    }

    #[test]
    fn test_oversized_request_clamps_to_full_axis() {
        let b = normalize(RangeSpec::from_box(-10, 200, 10, 20), EXTENT).unwrap();
        assert_eq!(b, PixelBox::new(0, 10, 100, 10));
    }

    #[rstest]
    #[case(50, 25, 5)]
    #[case(2, 2, 6)]
    #[case(99, 49, 3)]
    fn test_center_radius_matches_box(#[case] cx: i64, #[case] cy: i64, #[case] r: i64) {
        let from_center = normalize(RangeSpec::centered(cx, cy, r), EXTENT).unwrap();
        let from_box = normalize(RangeSpec::from_box(cx - r, cx + r, cy - r, cy + r), EXTENT).unwrap();
        assert_eq!(from_center, from_box);
        assert_eq!(from_center.width, (2 * r) as usize);
    }

    #[rstest]
    #[case(RangeSpec::from_box(i64::MIN, i64::MAX, 0, 10), PixelBox::new(0, 0, 100, 10))]
    #[case(RangeSpec::from_box(i64::MAX - 5, i64::MAX, 0, 10), PixelBox::new(95, 0, 5, 10))]
    #[case(RangeSpec::centered(i64::MAX, 10, 2), PixelBox::new(98, 8, 2, 4))]
    #[case(RangeSpec::centered(0, 0, i64::MAX), PixelBox::new(0, 0, 100, 50))]
    fn test_extreme_bounds_saturate(#[case] spec: RangeSpec, #[case] expected: PixelBox) {
        assert_eq!(normalize(spec, EXTENT).unwrap(), expected);
    }

    #[test]
    fn test_empty_extent_fails() {
        let result = normalize(RangeSpec::Whole, Extent::new(0, 10));
        assert!(matches!(result, Err(CcdError::DegenerateRange { .. })));
    }
}
