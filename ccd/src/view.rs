//! The active view: a scaled copy of one region of the current plane

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::CcdError;
use crate::range::{PixelBox, RangeSpec};
use crate::scaling::Transform;
use crate::stats::GlobalStats;

/// Whether the view holds edits not yet written back to the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewState {
    Clean,
    Dirty,
}

/// Scaled sub-array plus the bookkeeping needed to commit it
#[derive(Debug, Clone)]
pub struct ActiveView {
    pub(crate) bounds: PixelBox,
    pub(crate) range: RangeSpec,
    pub(crate) transform: Transform,
    pub(crate) data: Array2<f64>,
    pub(crate) mask: Option<Array2<bool>>,
    pub(crate) state: ViewState,
}

impl ActiveView {
    /// Fresh, clean view over `raw` (already cut to `bounds`)
    pub(crate) fn new(
        range: RangeSpec,
        bounds: PixelBox,
        transform: Transform,
        raw: &Array2<f64>,
    ) -> Self {
        let data = transform.apply_forward(raw);
        debug_assert_eq!(data.dim(), bounds.dim());
        Self {
            bounds,
            range,
            transform,
            data,
            mask: None,
            state: ViewState::Clean,
        }
    }

    pub fn bounds(&self) -> PixelBox {
        self.bounds
    }

    pub fn range(&self) -> RangeSpec {
        self.range
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn mask(&self) -> Option<&Array2<bool>> {
        self.mask.as_ref()
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state == ViewState::Dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.state = ViewState::Dirty;
    }

    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.mask.as_ref().is_some_and(|m| m[[row, col]])
    }

    pub fn masked_count(&self) -> usize {
        self.mask
            .as_ref()
            .map_or(0, |m| m.iter().filter(|&&b| b).count())
    }

    /// OR `flags` into the mask, creating it on first use
    pub(crate) fn union_mask(&mut self, flags: &Array2<bool>) {
        match self.mask.as_mut() {
            Some(mask) => mask.zip_mut_with(flags, |m, &f| *m |= f),
            None => self.mask = Some(flags.clone()),
        }
    }

    /// Finite, unmasked pixels, optionally also skipping `exclude`d ones
    pub(crate) fn selectable(&self, exclude: Option<&Array2<bool>>) -> Vec<f64> {
        self.data
            .indexed_iter()
            .filter(|(idx, _)| !self.mask.as_ref().is_some_and(|m| m[*idx]))
            .filter(|(idx, _)| !exclude.is_some_and(|e| e[*idx]))
            .map(|(_, &v)| v)
            .filter(|v| v.is_finite())
            .collect()
    }

    /// Statistics over unmasked pixels
    pub fn stats(&self) -> GlobalStats {
        match &self.mask {
            Some(mask) => GlobalStats::compute_where(self.data.iter(), mask.iter().map(|m| !m)),
            None => GlobalStats::compute(self.data.iter()),
        }
    }

    /// Minimum over unmasked finite pixels
    pub(crate) fn min_unmasked(&self, statistic: &'static str) -> Result<f64, CcdError> {
        let values = self.selectable(None);
        values
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or(CcdError::EmptySelection {
                statistic,
                excluded: self.data.len() - values.len(),
                total: self.data.len(),
            })
    }
}
