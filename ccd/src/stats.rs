//! Summary statistics over pixel data
//!
//! Min, max, sum and count are gathered in a single pass; the population
//! variance takes a second pass against the mean. Only finite pixels
//! contribute. NaN and infinities are counted separately.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary statistics of a set of pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// Number of finite pixels
    pub count: usize,
    /// Number of NaN or infinite pixels
    pub nonfinite: usize,
}

impl GlobalStats {
    /// Statistics over every finite value yielded by `values`
    ///
    /// With no finite values the moments are NaN and `count` is zero.
    pub fn compute<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let mut finite = Vec::new();
        let mut nonfinite = 0usize;
        for &v in values {
            if v.is_finite() {
                finite.push(v);
            } else {
                nonfinite += 1;
            }
        }
        Self::from_finite(finite, nonfinite)
    }

    /// Statistics over `values` where `include` is true
    pub fn compute_where<'a, I, M>(values: I, include: M) -> Self
    where
        I: IntoIterator<Item = &'a f64>,
        M: IntoIterator<Item = bool>,
    {
        let mut finite = Vec::new();
        let mut nonfinite = 0usize;
        for (&v, keep) in values.into_iter().zip(include) {
            if !keep {
                continue;
            }
            if v.is_finite() {
                finite.push(v);
            } else {
                nonfinite += 1;
            }
        }
        Self::from_finite(finite, nonfinite)
    }

    fn from_finite(mut finite: Vec<f64>, nonfinite: usize) -> Self {
        let count = finite.len();
        if count == 0 {
            return Self {
                mean: f64::NAN,
                median: f64::NAN,
                std: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
                count,
                nonfinite,
            };
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in &finite {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = sum / count as f64;
        let variance = finite.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        let median = median_in_place(&mut finite).unwrap_or(f64::NAN);

        Self {
            mean,
            median,
            std: variance.sqrt(),
            min,
            max,
            count,
            nonfinite,
        }
    }

    /// True when no finite pixel contributed
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

impl fmt::Display for GlobalStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "n={} (+{} non-finite) mean={:.6} median={:.6} std={:.6} min={:.6} max={:.6}",
            self.count, self.nonfinite, self.mean, self.median, self.std, self.min, self.max
        )
    }
}

/// Median of finite values; reorders the slice
pub fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        Some(values[n / 2])
    } else {
        Some(0.5 * (values[n / 2 - 1] + values[n / 2]))
    }
}

/// Mean of a slice, `None` when empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Linearly interpolated percentile (0..=100) of an ascending slice
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pct = pct.clamp(0.0, 100.0);
    let pos = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
