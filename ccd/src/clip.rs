//! Outlier flagging and replacement on the active view
//!
//! Flagging is a pure function of the view's values: pixels already masked
//! are still inspected, so flagging twice with the same parameters yields the
//! same mask. Replacement statistics skip masked pixels.

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CcdError;
use crate::stats::{self, GlobalStats};
use crate::view::ActiveView;

/// Comparison used by threshold clipping; flags `value <op> threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl Comparator {
    pub fn test(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Less => value < threshold,
            Comparator::Greater => value > threshold,
            Comparator::LessEqual => value <= threshold,
            Comparator::GreaterEqual => value >= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Less => "<",
            Comparator::Greater => ">",
            Comparator::LessEqual => "<=",
            Comparator::GreaterEqual => ">=",
        }
    }
}

impl FromStr for Comparator {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" => Ok(Comparator::Less),
            ">" => Ok(Comparator::Greater),
            "<=" => Ok(Comparator::LessEqual),
            ">=" => Ok(Comparator::GreaterEqual),
            other => Err(CcdError::UnknownComparator(other.to_string())),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How pixels are selected for clipping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClipKind {
    /// Bounds at `low_pct`/`high_pct` percent of the way from the view's
    /// min to its max
    Outlier { low_pct: f64, high_pct: f64 },
    /// Absolute bounds
    Range { low: f64, high: f64 },
    /// More than `n` standard deviations from the mean, measured on the
    /// forward-scaled full plane when `full_image` is set, else on the view
    Sigma { n: f64, full_image: bool },
    /// NaN and infinities
    Invalid,
    Threshold { value: f64, comparator: Comparator },
}

/// Replacement applied to flagged pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReplacementPolicy {
    /// Add flagged pixels to the view mask, values untouched
    Mask,
    /// Median of unmasked view pixels
    Median,
    /// Mean of unmasked view pixels
    Mean,
    /// Median of unmasked, unflagged view pixels
    NoClipMedian,
    /// Mean of unmasked, unflagged view pixels
    NoClipMean,
    /// Cached median of the whole plane
    FullMedian,
    /// Cached mean of the whole plane
    FullMean,
    Constant(f64),
}

impl Default for ReplacementPolicy {
    fn default() -> Self {
        ReplacementPolicy::Mask
    }
}

impl FromStr for ReplacementPolicy {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "mask" => Ok(ReplacementPolicy::Mask),
            "median" => Ok(ReplacementPolicy::Median),
            "mean" => Ok(ReplacementPolicy::Mean),
            "noclipmedian" => Ok(ReplacementPolicy::NoClipMedian),
            "noclipmean" => Ok(ReplacementPolicy::NoClipMean),
            "fullmedian" => Ok(ReplacementPolicy::FullMedian),
            "fullmean" => Ok(ReplacementPolicy::FullMean),
            _ => trimmed
                .parse::<f64>()
                .map(ReplacementPolicy::Constant)
                .map_err(|_| CcdError::UnknownReplacementPolicy(s.to_string())),
        }
    }
}

fn outside(v: f64, low: f64, high: f64) -> bool {
    v < low || v > high
}

/// Flag pixels of `view` according to `kind`.
///
/// `full_plane` supplies the scaled full-plane statistics for
/// `Sigma { full_image: true }`; without it the view itself is used.
///
/// # Errors
/// * `CcdError::EmptySelection` - a statistic the rule needs has no finite
///   pixels to draw from
pub fn compute_mask(
    kind: &ClipKind,
    view: ArrayView2<f64>,
    full_plane: Option<&GlobalStats>,
) -> Result<Array2<bool>, CcdError> {
    let empty = |statistic| CcdError::EmptySelection {
        statistic,
        excluded: view.len(),
        total: view.len(),
    };

    let mask = match *kind {
        ClipKind::Outlier { low_pct, high_pct } => {
            let s = GlobalStats::compute(view.iter());
            if s.is_empty() {
                return Err(empty("min/max"));
            }
            let span = s.max - s.min;
            let low = s.min + low_pct * span / 100.0;
            let high = s.min + high_pct * span / 100.0;
            log::debug!("Outlier bounds [{low}, {high}] from view range [{}, {}]", s.min, s.max);
            view.mapv(|v| outside(v, low, high))
        }
        ClipKind::Range { low, high } => view.mapv(|v| outside(v, low, high)),
        ClipKind::Sigma { n, full_image } => {
            let local;
            let s = match (full_image, full_plane) {
                (true, Some(s)) => s,
                _ => {
                    local = GlobalStats::compute(view.iter());
                    &local
                }
            };
            if s.is_empty() {
                return Err(empty("mean/std"));
            }
            let limit = n * s.std;
            let mean = s.mean;
            view.mapv(|v| (v - mean).abs() > limit)
        }
        ClipKind::Invalid => view.mapv(|v| !v.is_finite()),
        ClipKind::Threshold { value, comparator } => view.mapv(|v| comparator.test(v, value)),
    };
    Ok(mask)
}

fn require(
    value: Option<f64>,
    statistic: &'static str,
    excluded: usize,
    total: usize,
) -> Result<f64, CcdError> {
    value.ok_or(CcdError::EmptySelection {
        statistic,
        excluded,
        total,
    })
}

/// Apply `policy` to the pixels flagged in `flags` and mark the view dirty.
///
/// The replacement value is computed before anything is touched, so an
/// `EmptySelection` error leaves the view as it was.
///
/// # Returns
/// Number of flagged pixels
pub fn replace(
    view: &mut ActiveView,
    flags: &Array2<bool>,
    policy: ReplacementPolicy,
    global: &GlobalStats,
) -> Result<usize, CcdError> {
    let count = flags.iter().filter(|&&f| f).count();
    let total = view.data.len();

    let value = match policy {
        ReplacementPolicy::Mask => None,
        ReplacementPolicy::Median | ReplacementPolicy::Mean => {
            let mut pool = view.selectable(None);
            let excluded = total - pool.len();
            Some(if policy == ReplacementPolicy::Median {
                require(stats::median_in_place(&mut pool), "median", excluded, total)?
            } else {
                require(stats::mean(&pool), "mean", excluded, total)?
            })
        }
        ReplacementPolicy::NoClipMedian | ReplacementPolicy::NoClipMean => {
            let mut pool = view.selectable(Some(flags));
            let excluded = total - pool.len();
            Some(if policy == ReplacementPolicy::NoClipMedian {
                require(stats::median_in_place(&mut pool), "median", excluded, total)?
            } else {
                require(stats::mean(&pool), "mean", excluded, total)?
            })
        }
        ReplacementPolicy::FullMedian | ReplacementPolicy::FullMean => {
            if global.is_empty() {
                return Err(CcdError::EmptySelection {
                    statistic: "global statistic",
                    excluded: global.nonfinite,
                    total: global.nonfinite,
                });
            }
            Some(if policy == ReplacementPolicy::FullMedian {
                global.median
            } else {
                global.mean
            })
        }
        ReplacementPolicy::Constant(v) => Some(v),
    };

    match value {
        None => view.union_mask(flags),
        Some(v) => Zip::from(&mut view.data).and(flags).for_each(|d, &f| {
            if f {
                *d = v;
            }
        }),
    }
    view.mark_dirty();

    log::debug!("Replaced {count} flagged pixel(s) with policy {policy:?}");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::{PixelBox, RangeSpec};
    use crate::scaling::Transform;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use rstest::rstest;

    fn view_of(raw: Array2<f64>) -> ActiveView {
        let (rows, cols) = raw.dim();
        ActiveView::new(
            RangeSpec::Whole,
            PixelBox::new(0, 0, cols, rows),
            Transform::identity(),
            &raw,
        )
    }

    fn ramp() -> Array2<f64> {
        Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c + 1) as f64)
    }

    #[rstest]
    #[case("<", Comparator::Less)]
    #[case(">", Comparator::Greater)]
    #[case("<=", Comparator::LessEqual)]
    #[case(" >= ", Comparator::GreaterEqual)]
    fn test_parse_comparator(#[case] s: &str, #[case] expected: Comparator) {
        assert_eq!(s.parse::<Comparator>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_comparator() {
        assert!(matches!(
            "==".parse::<Comparator>(),
            Err(CcdError::UnknownComparator(_))
        ));
    }

    #[rstest]
    #[case("mask", ReplacementPolicy::Mask)]
    #[case("Median", ReplacementPolicy::Median)]
    #[case("MEAN", ReplacementPolicy::Mean)]
    #[case("noclipmedian", ReplacementPolicy::NoClipMedian)]
    #[case("noclipmean", ReplacementPolicy::NoClipMean)]
    #[case("fullmedian", ReplacementPolicy::FullMedian)]
    #[case("fullmean", ReplacementPolicy::FullMean)]
    #[case("-3.5", ReplacementPolicy::Constant(-3.5))]
    #[case("0", ReplacementPolicy::Constant(0.0))]
    fn test_parse_policy(#[case] s: &str, #[case] expected: ReplacementPolicy) {
        assert_eq!(s.parse::<ReplacementPolicy>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_policy() {
        assert!(matches!(
            "interpolate".parse::<ReplacementPolicy>(),
            Err(CcdError::UnknownReplacementPolicy(ref s)) if s == "interpolate"
        ));
    }

    #[test]
    fn test_outlier_mask_on_ramp() {
        let data = ramp();
        let mask = compute_mask(
            &ClipKind::Outlier {
                low_pct: 1.0,
                high_pct: 99.0,
            },
            data.view(),
            None,
        )
        .unwrap();

        let low = 1.0 + 0.01 * 99.0;
        let high = 1.0 + 0.99 * 99.0;
        let expected = data.iter().filter(|&&v| v < low || v > high).count();
        assert_eq!(mask.iter().filter(|&&m| m).count(), expected);
        assert_eq!(expected, 2);
        assert!(mask[[0, 0]]);
        assert!(mask[[9, 9]]);
    }

    #[test]
    fn test_sigma_mask_uses_supplied_stats() {
        let data = array![[0.0, 1.0], [2.0, 10.0]];
        let narrow = GlobalStats::compute(&[0.0, 1.0, 2.0]);
        let mask = compute_mask(
            &ClipKind::Sigma {
                n: 2.0,
                full_image: true,
            },
            data.view(),
            Some(&narrow),
        )
        .unwrap();
        assert_eq!(mask, array![[false, false], [false, true]]);
    }

    #[test]
    fn test_threshold_and_invalid() {
        let data = array![[1.0, f64::NAN], [3.0, f64::NEG_INFINITY]];
        let t = compute_mask(
            &ClipKind::Threshold {
                value: 2.0,
                comparator: Comparator::Greater,
            },
            data.view(),
            None,
        )
        .unwrap();
        assert_eq!(t, array![[false, false], [true, false]]);

        let inv = compute_mask(&ClipKind::Invalid, data.view(), None).unwrap();
        assert_eq!(inv, array![[false, true], [false, true]]);
    }

    #[test]
    fn test_mask_policy_is_idempotent() {
        let mut view = view_of(ramp());
        let global = GlobalStats::compute(view.data().iter());
        let kind = ClipKind::Range {
            low: 5.0,
            high: 95.0,
        };
        for _ in 0..2 {
            let flags = compute_mask(&kind, view.data().view(), None).unwrap();
            replace(&mut view, &flags, ReplacementPolicy::Mask, &global).unwrap();
            assert_eq!(view.masked_count(), 9);
        }
        assert!(view.is_dirty());
    }

    #[test]
    fn test_median_replacement_skips_masked() {
        let mut view = view_of(array![[1.0, 2.0, 3.0], [4.0, 100.0, 1000.0]]);
        let global = GlobalStats::compute(view.data().iter());
        view.union_mask(&array![[false, false, false], [false, false, true]]);

        let flags = array![[false, false, false], [false, true, false]];
        let n = replace(&mut view, &flags, ReplacementPolicy::Median, &global).unwrap();
        assert_eq!(n, 1);
        // median of 1, 2, 3, 4, 100
        assert_relative_eq!(view.data()[[1, 1]], 3.0);
    }

    #[test]
    fn test_noclip_mean_skips_flagged() {
        let mut view = view_of(array![[1.0, 3.0], [5.0, 1000.0]]);
        let global = GlobalStats::compute(view.data().iter());
        let flags = array![[false, false], [false, true]];
        replace(&mut view, &flags, ReplacementPolicy::NoClipMean, &global).unwrap();
        assert_relative_eq!(view.data()[[1, 1]], 3.0);
    }

    #[test]
    fn test_full_policies_use_global_stats() {
        let mut view = view_of(array![[1.0, 2.0], [3.0, 4.0]]);
        let global = GlobalStats::compute(&[10.0, 20.0, 60.0]);
        let flags = array![[true, false], [false, true]];
        replace(&mut view, &flags, ReplacementPolicy::FullMean, &global).unwrap();
        assert_relative_eq!(view.data()[[0, 0]], 30.0);
        replace(&mut view, &flags, ReplacementPolicy::FullMedian, &global).unwrap();
        assert_relative_eq!(view.data()[[1, 1]], 20.0);
    }

    #[test]
    fn test_empty_selection_leaves_view_untouched() {
        let mut view = view_of(array![[1.0, 2.0], [3.0, 4.0]]);
        let global = GlobalStats::compute(view.data().iter());
        let flags = Array2::from_elem((2, 2), true);
        let err = replace(&mut view, &flags, ReplacementPolicy::NoClipMedian, &global);
        assert!(matches!(err, Err(CcdError::EmptySelection { .. })));
        assert_eq!(view.data(), &array![[1.0, 2.0], [3.0, 4.0]]);
        assert!(!view.is_dirty());
    }

    #[test]
    fn test_zero_flags_still_marks_dirty() {
        let mut view = view_of(array![[1.0, 2.0]]);
        let global = GlobalStats::compute(view.data().iter());
        let flags = Array2::from_elem((1, 2), false);
        let n = replace(&mut view, &flags, ReplacementPolicy::Constant(0.0), &global).unwrap();
        assert_eq!(n, 0);
        assert!(view.is_dirty());
    }
}
