//! Active-view engine
//!
//! [`CcdImage`] owns an [`Image`] and keeps one scaled region of the current
//! plane in memory. Edits happen on that scaled copy and are written back
//! through the inverse transform on [`CcdImage::commit`].
//!
//! ```text
//!   activate / set_scaling / select_plane
//!              │
//!              ▼
//!          ┌───────┐  clip / offset / data_mut  ┌───────┐
//!          │ Clean │ ─────────────────────────▶ │ Dirty │
//!          └───────┘ ◀───────────────────────── └───────┘
//!                      commit (or re-activation)
//! ```

use ndarray::{s, Array2, ArrayViewMut2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::clip::{self, ClipKind, Comparator, ReplacementPolicy};
use crate::config::{EngineConfig, MissingInversePolicy};
use crate::display::DisplayRange;
use crate::error::CcdError;
use crate::range::{normalize, Extent, PixelBox, RangeSpec};
use crate::scaling::{resolve, ScalingContext, ScalingMode, Transform};
use crate::stats::GlobalStats;
use crate::store::{Header, Image, ImageStore};
use crate::view::{ActiveView, ViewState};

/// Amount subtracted by [`CcdImage::offset`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OffsetSpec {
    Value(f64),
    /// Global minimum of the plane
    GlobalMin,
    /// Global minimum plus one, so the lowest pixel lands on 1
    GlobalMinPlusOne,
    /// Minimum of the active view
    Min,
    MinPlusOne,
}

impl FromStr for OffsetSpec {
    type Err = CcdError;

    /// `gmin`, `gminp1`, `min`, `minp1` or a number
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmin" => Ok(OffsetSpec::GlobalMin),
            "gminp1" => Ok(OffsetSpec::GlobalMinPlusOne),
            "min" => Ok(OffsetSpec::Min),
            "minp1" => Ok(OffsetSpec::MinPlusOne),
            other => other
                .parse::<f64>()
                .map(OffsetSpec::Value)
                .map_err(|_| CcdError::InvalidTransform {
                    mode: "offset",
                    reason: format!("expected gmin|gminp1|min|minp1 or a number, got '{s}'"),
                }),
        }
    }
}

/// Zero point and pixel scale taken from a plane header
fn calibration_from_header(header: &Header) -> (Option<f64>, Option<(f64, f64)>) {
    let num = |key: &str| header.get(key).and_then(|v| v.as_f64());

    let zero_point = num("ZEROPT").or_else(|| num("MAGZPT"));
    let pixel_scale = match (num("PIXSCALE"), num("PIXSCAL1"), num("PIXSCAL2")) {
        (Some(p), _, _) => Some((p, p)),
        (None, Some(p1), Some(p2)) => Some((p1, p2)),
        (None, Some(p), None) | (None, None, Some(p)) => Some((p, p)),
        (None, None, None) => None,
    };
    (zero_point, pixel_scale)
}

/// Per-plane state that changes together on a plane switch
#[derive(Debug, Clone)]
struct PlaneState {
    index: usize,
    extent: Extent,
    global: GlobalStats,
    zero_point: Option<f64>,
    pixel_scale: Option<(f64, f64)>,
}

/// Interactive reduction engine over one image
pub struct CcdImage<I: Image> {
    image: I,
    config: EngineConfig,
    plane: PlaneState,
    mode: ScalingMode,
    view: ActiveView,
    closed: bool,
}

impl<I: Image> fmt::Debug for CcdImage<I> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CcdImage")
            .field("plane", &self.plane)
            .field("mode", &self.mode)
            .field("bounds", &self.view.bounds())
            .field("state", &self.view.state())
            .finish()
    }
}

impl<I: Image> CcdImage<I> {
    /// Wrap an open image with the default configuration
    pub fn new(image: I) -> Result<Self, CcdError> {
        Self::with_config(image, EngineConfig::default())
    }

    /// Wrap an open image, activating the whole of `config.initial_plane`
    /// with linear scaling
    pub fn with_config(mut image: I, config: EngineConfig) -> Result<Self, CcdError> {
        let plane = load_plane(&mut image, config.initial_plane)?;
        let bounds = normalize(RangeSpec::Whole, plane.extent)?;
        let raw = image.read_plane(plane.index)?;
        let view = ActiveView::new(RangeSpec::Whole, bounds, Transform::identity(), &raw);

        log::debug!(
            "Opened plane {} ({}) of {}: {}",
            plane.index,
            plane.extent,
            image.plane_count(),
            plane.global
        );

        Ok(Self {
            image,
            config,
            plane,
            mode: ScalingMode::Linear,
            view,
            closed: false,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Select a new region of the current plane
    ///
    /// # Errors
    /// * `CcdError::DegenerateRange` - zero-area request; nothing changes
    /// * `CcdError::NoInverseAvailable` - auto-commit failed under
    ///   `MissingInversePolicy::Fail`; nothing changes
    pub fn activate(&mut self, range: RangeSpec) -> Result<(), CcdError> {
        let bounds = normalize(range, self.plane.extent)?;
        self.settle_pending()?;
        let transform = self.view.transform.clone();
        self.rebuild_view(range, bounds, transform)?;
        log::debug!("Activated {} as {bounds}", range_label(&range));
        Ok(())
    }

    /// Change the scaling mode and re-derive the view over the current range
    ///
    /// # Errors
    /// * `CcdError::InvalidTransform` / `CcdError::MissingCalibration` - the
    ///   mode cannot be built; the previous view is kept
    pub fn set_scaling(&mut self, mode: ScalingMode) -> Result<(), CcdError> {
        let mut transform = self.resolve(&mode)?;
        if let Some(stats) = self.stats_after_pending_commit()? {
            // The mode must also resolve against the statistics the commit
            // will leave behind, before anything is written
            transform = self.resolve_with(&mode, &stats)?;
        }
        self.settle_pending()?;
        let range = self.view.range;
        let bounds = self.view.bounds;
        self.rebuild_view(range, bounds, transform)?;
        log::debug!("Scaling set to {mode}");
        self.mode = mode;
        Ok(())
    }

    /// Write pending edits back to the image through the inverse transform.
    /// A clean view is left alone.
    ///
    /// # Errors
    /// * `CcdError::NoInverseAvailable` - the transform cannot be inverted
    /// * `CcdError::Store` - the image rejected the write
    pub fn commit(&mut self) -> Result<(), CcdError> {
        if !self.view.is_dirty() {
            return Ok(());
        }

        let transform = &self.view.transform;
        let raw = transform
            .apply_inverse(self.view.data.view())
            .ok_or_else(|| CcdError::NoInverseAvailable {
                mode: transform.name().to_string(),
            })?;

        self.image
            .write_region(self.plane.index, self.view.bounds, raw.view())?;
        self.refresh_global()?;
        self.view.state = ViewState::Clean;

        log::debug!(
            "Committed {} pixel(s) at {} to plane {}",
            self.view.bounds.pixel_count(),
            self.view.bounds,
            self.plane.index
        );
        Ok(())
    }

    /// Switch to another plane, keeping range and scaling mode.
    ///
    /// Pending edits are settled against the old plane first. If the new
    /// plane cannot be loaded or the scaling cannot be built for it, the
    /// previous plane stays selected.
    pub fn select_plane(&mut self, index: usize) -> Result<(), CcdError> {
        let count = self.image.plane_count();
        if index >= count {
            return Err(CcdError::PlaneOutOfRange { index, count });
        }
        if index == self.plane.index {
            return Ok(());
        }

        self.settle_pending()?;

        let previous = std::mem::replace(&mut self.plane, load_plane(&mut self.image, index)?);
        let switched = self.resolve(&self.mode).and_then(|transform| {
            let bounds = normalize(self.view.range, self.plane.extent)?;
            self.rebuild_view(self.view.range, bounds, transform)
        });

        if let Err(e) = switched {
            log::warn!("Switching to plane {index} failed, staying on {}: {e}", previous.index);
            self.plane = previous;
            return Err(e);
        }

        log::debug!("Selected plane {index}: {}", self.plane.global);
        Ok(())
    }

    /// Subtract an offset from every pixel of the view
    pub fn offset(&mut self, spec: OffsetSpec) -> Result<f64, CcdError> {
        let amount = match spec {
            OffsetSpec::Value(v) => v,
            OffsetSpec::GlobalMin => self.plane.global.min,
            OffsetSpec::GlobalMinPlusOne => self.plane.global.min + 1.0,
            OffsetSpec::Min => self.view.min_unmasked("min")?,
            OffsetSpec::MinPlusOne => self.view.min_unmasked("min")? + 1.0,
        };
        self.view.data.mapv_inplace(|v| v - amount);
        self.view.mark_dirty();
        Ok(amount)
    }

    /// Flag pixels by `kind` and handle them with `policy`
    ///
    /// # Returns
    /// Number of flagged pixels
    pub fn clip(&mut self, kind: ClipKind, policy: ReplacementPolicy) -> Result<usize, CcdError> {
        let full_plane = match kind {
            ClipKind::Sigma {
                full_image: true, ..
            } => {
                let raw = self.image.read_plane(self.plane.index)?;
                Some(GlobalStats::compute(
                    self.view.transform.apply_forward(&raw).iter(),
                ))
            }
            _ => None,
        };
        let flags = clip::compute_mask(&kind, self.view.data.view(), full_plane.as_ref())?;
        clip::replace(&mut self.view, &flags, policy, &self.plane.global)
    }

    /// Clip values outside `low_pct`..`high_pct` percent of the view's range
    pub fn clip_outliers(
        &mut self,
        low_pct: f64,
        high_pct: f64,
        policy: ReplacementPolicy,
    ) -> Result<usize, CcdError> {
        self.clip(ClipKind::Outlier { low_pct, high_pct }, policy)
    }

    pub fn clip_range(
        &mut self,
        low: f64,
        high: f64,
        policy: ReplacementPolicy,
    ) -> Result<usize, CcdError> {
        self.clip(ClipKind::Range { low, high }, policy)
    }

    pub fn clip_sigma(
        &mut self,
        n: f64,
        full_image: bool,
        policy: ReplacementPolicy,
    ) -> Result<usize, CcdError> {
        self.clip(ClipKind::Sigma { n, full_image }, policy)
    }

    pub fn clip_invalid(&mut self, policy: ReplacementPolicy) -> Result<usize, CcdError> {
        self.clip(ClipKind::Invalid, policy)
    }

    pub fn clip_threshold(
        &mut self,
        value: f64,
        comparator: Comparator,
        policy: ReplacementPolicy,
    ) -> Result<usize, CcdError> {
        self.clip(ClipKind::Threshold { value, comparator }, policy)
    }

    /// Drop the view mask without touching values
    pub fn clear_mask(&mut self) {
        self.view.mask = None;
    }

    /// (low, high) display bounds over the unmasked view
    pub fn display_range(&self, range: &DisplayRange) -> Result<(f64, f64), CcdError> {
        range.compute(&self.view.selectable(None), self.plane.global.std)
    }

    pub fn bounds(&self) -> PixelBox {
        self.view.bounds
    }

    pub fn range(&self) -> RangeSpec {
        self.view.range
    }

    pub fn scaling(&self) -> &ScalingMode {
        &self.mode
    }

    pub fn transform(&self) -> &Transform {
        &self.view.transform
    }

    pub fn view(&self) -> &ActiveView {
        &self.view
    }

    /// Scaled pixels of the active view, stored (rows, cols)
    pub fn data(&self) -> &Array2<f64> {
        &self.view.data
    }

    /// Mutable access to the view; marks it dirty
    pub fn data_mut(&mut self) -> ArrayViewMut2<'_, f64> {
        self.view.mark_dirty();
        self.view.data.view_mut()
    }

    pub fn mark_dirty(&mut self) {
        self.view.mark_dirty();
    }

    pub fn mask(&self) -> Option<&Array2<bool>> {
        self.view.mask()
    }

    pub fn state(&self) -> ViewState {
        self.view.state
    }

    pub fn is_dirty(&self) -> bool {
        self.view.is_dirty()
    }

    /// (width, height) of the view
    pub fn shape(&self) -> (usize, usize) {
        (self.view.bounds.width, self.view.bounds.height)
    }

    pub fn size(&self) -> usize {
        self.view.data.len()
    }

    pub fn plane(&self) -> usize {
        self.plane.index
    }

    pub fn plane_count(&self) -> usize {
        self.image.plane_count()
    }

    /// Extent of the current plane
    pub fn extent(&self) -> Extent {
        self.plane.extent
    }

    pub fn global_stats(&self) -> &GlobalStats {
        &self.plane.global
    }

    /// Statistics of the view, masked pixels excluded
    pub fn view_stats(&self) -> GlobalStats {
        self.view.stats()
    }

    pub fn zero_point(&self) -> Option<f64> {
        self.plane.zero_point
    }

    pub fn set_zero_point(&mut self, zero_point: Option<f64>) {
        self.plane.zero_point = zero_point;
    }

    /// (x, y) pixel scale in arcsec/pixel
    pub fn pixel_scale(&self) -> Option<(f64, f64)> {
        self.plane.pixel_scale
    }

    /// Set the same scale on both axes
    pub fn set_pixel_scale(&mut self, scale: Option<f64>) {
        self.plane.pixel_scale = scale.map(|s| (s, s));
    }

    pub fn set_pixel_scales(&mut self, scale: Option<(f64, f64)>) {
        self.plane.pixel_scale = scale;
    }

    pub fn image(&self) -> &I {
        &self.image
    }

    /// Release the image. Pending edits are not committed.
    pub fn close(mut self) -> Result<(), CcdError> {
        self.closed = true;
        if self.view.is_dirty() {
            log::warn!("Closing with uncommitted edits at {}", self.view.bounds);
        }
        self.image.close()?;
        Ok(())
    }

    fn resolve(&self, mode: &ScalingMode) -> Result<Transform, CcdError> {
        self.resolve_with(mode, &self.plane.global)
    }

    fn resolve_with(&self, mode: &ScalingMode, stats: &GlobalStats) -> Result<Transform, CcdError> {
        let ctx = ScalingContext {
            stats,
            zero_point: self.plane.zero_point,
            pixel_scale: self.plane.pixel_scale,
        };
        resolve(mode, &ctx)
    }

    /// Deal with edits before the view is replaced.
    ///
    /// # Returns
    /// `true` if something was committed
    fn settle_pending(&mut self) -> Result<bool, CcdError> {
        if !self.view.is_dirty() {
            return Ok(false);
        }
        if !self.config.auto_commit {
            log::debug!("Discarding uncommitted edits at {}", self.view.bounds);
            return Ok(false);
        }
        match self.commit() {
            Ok(()) => Ok(true),
            Err(e @ CcdError::NoInverseAvailable { .. }) => match self.config.on_missing_inverse {
                MissingInversePolicy::Discard => {
                    log::warn!("{e}; discarding edits at {}", self.view.bounds);
                    Ok(false)
                }
                MissingInversePolicy::Fail => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Global statistics the plane would have if [`Self::settle_pending`]
    /// committed now, or `None` when it would not commit
    fn stats_after_pending_commit(&mut self) -> Result<Option<GlobalStats>, CcdError> {
        if !self.view.is_dirty() || !self.config.auto_commit {
            return Ok(None);
        }
        let raw = match self.view.transform.apply_inverse(self.view.data.view()) {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let bounds = self.view.bounds;
        let mut plane = self.image.read_plane(self.plane.index)?;
        plane
            .slice_mut(s![bounds.y_min..bounds.y_max(), bounds.x_min..bounds.x_max()])
            .assign(&raw);
        Ok(Some(GlobalStats::compute(plane.iter())))
    }

    fn rebuild_view(
        &mut self,
        range: RangeSpec,
        bounds: PixelBox,
        transform: Transform,
    ) -> Result<(), CcdError> {
        let plane = self.image.read_plane(self.plane.index)?;
        let raw = plane
            .slice(s![bounds.y_min..bounds.y_max(), bounds.x_min..bounds.x_max()])
            .to_owned();
        self.view = ActiveView::new(range, bounds, transform, &raw);
        Ok(())
    }

    fn refresh_global(&mut self) -> Result<(), CcdError> {
        let raw = self.image.read_plane(self.plane.index)?;
        self.plane.global = GlobalStats::compute(raw.iter());
        Ok(())
    }
}

impl<I: Image> Drop for CcdImage<I> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.view.is_dirty() {
            log::warn!("Dropping with uncommitted edits at {}", self.view.bounds);
        }
        if let Err(e) = self.image.close() {
            log::warn!("Failed to close image: {e}");
        }
    }
}

/// Open `path` from `store` and wrap it in an engine
pub fn open<S: ImageStore>(
    store: &S,
    path: &Path,
    config: EngineConfig,
) -> Result<CcdImage<S::Image>, CcdError> {
    let image = store.open(path)?;
    CcdImage::with_config(image, config)
}

fn load_plane<I: Image>(image: &mut I, index: usize) -> Result<PlaneState, CcdError> {
    let count = image.plane_count();
    if index >= count {
        return Err(CcdError::PlaneOutOfRange { index, count });
    }
    let raw = image.read_plane(index)?;
    let header = image.header(index)?;
    let (zero_point, pixel_scale) = calibration_from_header(&header);
    Ok(PlaneState {
        index,
        extent: Extent::from_dim(raw.dim()),
        global: GlobalStats::compute(raw.iter()),
        zero_point,
        pixel_scale,
    })
}

fn range_label(range: &RangeSpec) -> String {
    match range {
        RangeSpec::Whole => "whole plane".to_string(),
        RangeSpec::Box { .. } => "box".to_string(),
        RangeSpec::CenterRadius {
            x_center,
            y_center,
            radius,
        } => format!("radius {radius} around ({x_center}, {y_center})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{HeaderValue, MemoryImage};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn ramp(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c + 1) as f64)
    }

    #[test]
    fn test_construction_activates_whole_plane() {
        init_logging();
        let ccd = CcdImage::new(MemoryImage::from_array(ramp(4, 6))).unwrap();
        assert_eq!(ccd.shape(), (6, 4));
        assert_eq!(ccd.size(), 24);
        assert_eq!(ccd.state(), ViewState::Clean);
        assert_relative_eq!(ccd.global_stats().max, 24.0);
    }

    #[test]
    fn test_header_calibration() {
        let mut header = Header::new();
        header.insert("PIXSCAL1".into(), HeaderValue::Float(0.2));
        header.insert("PIXSCAL2".into(), HeaderValue::Float(0.3));
        header.insert("MAGZPT".into(), HeaderValue::Float(27.5));
        assert_eq!(
            calibration_from_header(&header),
            (Some(27.5), Some((0.2, 0.3)))
        );

        header.insert("PIXSCALE".into(), HeaderValue::Float(0.5));
        header.insert("ZEROPT".into(), HeaderValue::Text("25".into()));
        assert_eq!(
            calibration_from_header(&header),
            (Some(25.0), Some((0.5, 0.5)))
        );
    }

    #[test]
    fn test_set_pixel_scale_scalar_applies_to_both_axes() {
        let mut ccd = CcdImage::new(MemoryImage::from_array(ramp(2, 2))).unwrap();
        assert_eq!(ccd.pixel_scale(), None);
        ccd.set_pixel_scale(Some(0.4));
        assert_eq!(ccd.pixel_scale(), Some((0.4, 0.4)));
    }

    #[test]
    fn test_offset_spec_parse() {
        assert_eq!("gmin".parse::<OffsetSpec>().unwrap(), OffsetSpec::GlobalMin);
        assert_eq!(
            "GMINP1".parse::<OffsetSpec>().unwrap(),
            OffsetSpec::GlobalMinPlusOne
        );
        assert_eq!("minp1".parse::<OffsetSpec>().unwrap(), OffsetSpec::MinPlusOne);
        assert_eq!("2.5".parse::<OffsetSpec>().unwrap(), OffsetSpec::Value(2.5));
        assert!("max".parse::<OffsetSpec>().is_err());
    }

    #[test]
    fn test_data_mut_marks_dirty() {
        let mut ccd = CcdImage::new(MemoryImage::from_array(ramp(2, 2))).unwrap();
        ccd.data_mut()[[0, 0]] = -5.0;
        assert!(ccd.is_dirty());
        ccd.commit().unwrap();
        assert!(!ccd.is_dirty());
        assert_relative_eq!(ccd.global_stats().min, -5.0);
    }

    #[test]
    fn test_select_plane_out_of_range() {
        let mut ccd = CcdImage::new(MemoryImage::from_array(ramp(2, 2))).unwrap();
        assert!(matches!(
            ccd.select_plane(3),
            Err(CcdError::PlaneOutOfRange { index: 3, count: 1 })
        ));
        assert_eq!(ccd.plane(), 0);
    }

    #[test]
    fn test_initial_plane_from_config() {
        let image = MemoryImage::from_array(ramp(2, 2))
            .with_plane(Array2::from_elem((3, 3), 7.0), Header::new());
        let config = EngineConfig {
            initial_plane: 1,
            ..EngineConfig::default()
        };
        let ccd = CcdImage::with_config(image, config).unwrap();
        assert_eq!(ccd.plane(), 1);
        assert_eq!(ccd.shape(), (3, 3));
        assert_relative_eq!(ccd.global_stats().mean, 7.0);
    }
}
