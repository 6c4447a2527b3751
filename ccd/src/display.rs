//! Display value ranges for presenting the active view
//!
//! A [`DisplayRange`] picks the (low, high) pair a presentation layer maps
//! to its color scale. The textual forms are:
//!
//! | text          | meaning                                           |
//! |---------------|---------------------------------------------------|
//! | `lo,hi`       | explicit bounds                                   |
//! | `hi`          | `0..hi`                                           |
//! | `sigma#`      | median ± # global standard deviations (`sig#` too)|
//! | `p#` / `p#,#` | keep the central # percent (per side with two)    |
//! | `n#` / `n#,#` | ignore the # lowest and highest values            |
//! | `i#,#,...`    | ignore pixels equal to any listed value           |

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CcdError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DisplayRange {
    Explicit(f64, f64),
    Upper(f64),
    Sigma(f64),
    /// Percentage of values kept at each end; 99 drops half a percent per side
    Percentile { low: f64, high: f64 },
    IgnoreCount { low: usize, high: usize },
    IgnoreValues(Vec<f64>),
}

impl Default for DisplayRange {
    fn default() -> Self {
        DisplayRange::Percentile {
            low: 99.0,
            high: 99.0,
        }
    }
}

fn parse_num(text: &str, original: &str) -> Result<f64, CcdError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| CcdError::UnknownDisplayRange(original.to_string()))
}

fn parse_pair(body: &str, original: &str) -> Result<(f64, f64), CcdError> {
    let parts: Vec<&str> = body.split(',').collect();
    match parts.as_slice() {
        [one] => {
            let v = parse_num(one, original)?;
            Ok((v, v))
        }
        [lo, hi] => Ok((
            parse_num(lo.trim().trim_start_matches(|c: char| c == 'p' || c == 'n'), original)?,
            parse_num(hi.trim().trim_start_matches(|c: char| c == 'p' || c == 'n'), original)?,
        )),
        _ => Err(CcdError::UnknownDisplayRange(original.to_string())),
    }
}

impl FromStr for DisplayRange {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_ascii_lowercase();

        if let Some(body) = text
            .strip_prefix("sigma")
            .or_else(|| text.strip_prefix("sig"))
        {
            return Ok(DisplayRange::Sigma(parse_num(body, s)?));
        }
        if let Some(body) = text.strip_prefix('p') {
            let (low, high) = parse_pair(body, s)?;
            return Ok(DisplayRange::Percentile { low, high });
        }
        if let Some(body) = text.strip_prefix('n') {
            let (low, high) = parse_pair(body, s)?;
            if low < 0.0 || high < 0.0 {
                return Err(CcdError::UnknownDisplayRange(s.to_string()));
            }
            return Ok(DisplayRange::IgnoreCount {
                low: low.round() as usize,
                high: high.round() as usize,
            });
        }
        if let Some(body) = text.strip_prefix('i') {
            let values = body
                .split(',')
                .map(|v| parse_num(v, s))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(DisplayRange::IgnoreValues(values));
        }

        let parts: Vec<&str> = text.split(',').collect();
        match parts.as_slice() {
            [hi] => Ok(DisplayRange::Upper(parse_num(hi, s)?)),
            [lo, hi] => Ok(DisplayRange::Explicit(parse_num(lo, s)?, parse_num(hi, s)?)),
            _ => Err(CcdError::UnknownDisplayRange(s.to_string())),
        }
    }
}

impl DisplayRange {
    /// Compute (low, high) over `values`.
    ///
    /// Non-finite values are ignored. `global_std` scales `Sigma`.
    pub fn compute(&self, values: &[f64], global_std: f64) -> Result<(f64, f64), CcdError> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let empty = |statistic| CcdError::EmptySelection {
            statistic,
            excluded: values.len(),
            total: values.len(),
        };

        match self {
            DisplayRange::Explicit(lo, hi) => Ok((*lo, *hi)),
            DisplayRange::Upper(hi) => Ok((0.0, *hi)),
            DisplayRange::Sigma(n) => {
                let median = crate::stats::median_in_place(&mut sorted).ok_or(empty("median"))?;
                let half = n * global_std;
                Ok((median - half, median + half))
            }
            DisplayRange::Percentile { low, high } => {
                let size = sorted.len() as f64;
                let drop_low = ((100.0 - low) * size / 200.0).round().max(0.0) as usize;
                let drop_high = ((100.0 - high) * size / 200.0).round().max(0.0) as usize;
                ignore_extremes(&sorted, drop_low, drop_high).ok_or(empty("percentile range"))
            }
            DisplayRange::IgnoreCount { low, high } => {
                ignore_extremes(&sorted, *low, *high).ok_or(empty("count range"))
            }
            DisplayRange::IgnoreValues(ignored) => {
                let kept: Vec<f64> = sorted
                    .iter()
                    .copied()
                    .filter(|v| !ignored.contains(v))
                    .collect();
                match (kept.first(), kept.last()) {
                    (Some(&lo), Some(&hi)) => Ok((lo, hi)),
                    _ => Err(empty("value range")),
                }
            }
        }
    }
}

/// Range of `sorted` after dropping `low` smallest and `high` largest.
/// Dropping everything falls back to the full range.
fn ignore_extremes(sorted: &[f64], low: usize, high: usize) -> Option<(f64, f64)> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if low + high >= n {
        log::warn!("Ignoring {low}+{high} of {n} values leaves nothing, using the full range");
        return Some((sorted[0], sorted[n - 1]));
    }
    Some((sorted[low], sorted[n - 1 - high]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case("sigma3", DisplayRange::Sigma(3.0))]
    #[case("sig2.5", DisplayRange::Sigma(2.5))]
    #[case("p99", DisplayRange::Percentile { low: 99.0, high: 99.0 })]
    #[case("p90,p98", DisplayRange::Percentile { low: 90.0, high: 98.0 })]
    #[case("n5", DisplayRange::IgnoreCount { low: 5, high: 5 })]
    #[case("n1,2", DisplayRange::IgnoreCount { low: 1, high: 2 })]
    #[case("i0,-999", DisplayRange::IgnoreValues(vec![0.0, -999.0]))]
    #[case("-1,10", DisplayRange::Explicit(-1.0, 10.0))]
    #[case("250", DisplayRange::Upper(250.0))]
    fn test_parse(#[case] text: &str, #[case] expected: DisplayRange) {
        assert_eq!(text.parse::<DisplayRange>().unwrap(), expected);
    }

    #[rstest]
    #[case("bogus")]
    #[case("p")]
    #[case("1,2,3")]
    #[case("n-2")]
    fn test_parse_rejects(#[case] text: &str) {
        assert!(matches!(
            text.parse::<DisplayRange>(),
            Err(CcdError::UnknownDisplayRange(_))
        ));
    }

    fn hundred() -> Vec<f64> {
        (1..=100).map(|v| v as f64).collect()
    }

    #[test]
    fn test_ignore_count() {
        let r = DisplayRange::IgnoreCount { low: 2, high: 3 };
        assert_eq!(r.compute(&hundred(), 1.0).unwrap(), (3.0, 97.0));
    }

    #[test]
    fn test_percentile_drops_each_side() {
        let r = DisplayRange::Percentile {
            low: 90.0,
            high: 90.0,
        };
        assert_eq!(r.compute(&hundred(), 1.0).unwrap(), (6.0, 95.0));
    }

    #[test]
    fn test_ignoring_everything_falls_back_to_full_range() {
        let r = DisplayRange::IgnoreCount { low: 60, high: 60 };
        assert_eq!(r.compute(&hundred(), 1.0).unwrap(), (1.0, 100.0));
    }

    #[test]
    fn test_sigma_around_median() {
        let (lo, hi) = DisplayRange::Sigma(2.0).compute(&hundred(), 3.0).unwrap();
        assert_relative_eq!(lo, 44.5);
        assert_relative_eq!(hi, 56.5);
    }

    #[test]
    fn test_ignore_values() {
        let data = [0.0, 5.0, 7.0, -999.0, f64::NAN];
        let r = DisplayRange::IgnoreValues(vec![-999.0, 0.0]);
        assert_eq!(r.compute(&data, 1.0).unwrap(), (5.0, 7.0));
    }
}
