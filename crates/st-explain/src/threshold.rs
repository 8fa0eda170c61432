// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Near-zero magnitude thresholds.

use std::cmp::Ordering;

use ndarray::ArrayD;
use tracing::trace;

use crate::error::{check_fraction, invalid, ExplainResult};
use crate::telemetry::TARGET;

/// Percentile of `values` (`q` in `[0, 100]`) using midpoint interpolation:
/// the mean of the two order statistics bracketing the fractional rank.
///
/// Returns `0.0` for an empty input.
pub fn percentile_midpoint(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let q = q.clamp(0.0, 100.0) as f64;
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (rank.ceil() as usize).min(sorted.len() - 1);
    if lo == hi {
        sorted[lo]
    } else {
        (sorted[lo] + sorted[hi]) * 0.5
    }
}

/// Threshold for `x`: `explicit` when supplied, otherwise the
/// `100 * (1 - confidence)`-th percentile of `|x|`.
pub fn derive_threshold(x: &ArrayD<f32>, confidence: f32, explicit: Option<f32>) -> ExplainResult<f32> {
    if let Some(threshold) = explicit {
        return Ok(threshold);
    }
    check_fraction("confidence", confidence)?;
    let magnitudes: Vec<f32> = x.iter().map(|v| v.abs()).collect();
    let threshold = percentile_midpoint(&magnitudes, 100.0 * (1.0 - confidence));
    trace!(target: TARGET, confidence, threshold, len = magnitudes.len(), "derived threshold");
    Ok(threshold)
}

/// Threshold specification for two-input operations.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Thresholds {
    /// Derive both thresholds from the confidence level.
    #[default]
    Derived,
    /// Apply the same explicit threshold to both inputs.
    Shared(f32),
    /// Per-input thresholds; `None` entries are derived from the confidence.
    Pair(Option<f32>, Option<f32>),
}

impl Thresholds {
    /// Parses a sequence form. Anything other than exactly two entries is rejected.
    pub fn from_slice(values: &[Option<f32>]) -> ExplainResult<Self> {
        match values {
            [first, second] => Ok(Thresholds::Pair(*first, *second)),
            other => Err(invalid(format!(
                "thresholds must have length 2, but got length {}: {:?}",
                other.len(),
                other
            ))),
        }
    }

    /// Explicit thresholds for the first and second input.
    pub fn split(self) -> (Option<f32>, Option<f32>) {
        match self {
            Thresholds::Derived => (None, None),
            Thresholds::Shared(value) => (Some(value), Some(value)),
            Thresholds::Pair(first, second) => (first, second),
        }
    }
}

impl From<f32> for Thresholds {
    fn from(value: f32) -> Self {
        Thresholds::Shared(value)
    }
}

impl From<(f32, f32)> for Thresholds {
    fn from((first, second): (f32, f32)) -> Self {
        Thresholds::Pair(Some(first), Some(second))
    }
}

impl From<(Option<f32>, Option<f32>)> for Thresholds {
    fn from((first, second): (Option<f32>, Option<f32>)) -> Self {
        Thresholds::Pair(first, second)
    }
}

impl From<Option<f32>> for Thresholds {
    fn from(value: Option<f32>) -> Self {
        value.map_or(Thresholds::Derived, Thresholds::Shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, IxDyn};

    #[test]
    fn midpoint_averages_bracketing_order_statistics() {
        let values = [4.0, 1.0, 3.0, 2.0];
        // rank = 0.5 * 3 = 1.5 -> mean of 2.0 and 3.0
        assert_abs_diff_eq!(percentile_midpoint(&values, 50.0), 2.5);
        assert_abs_diff_eq!(percentile_midpoint(&values, 0.0), 1.0);
        assert_abs_diff_eq!(percentile_midpoint(&values, 100.0), 4.0);
        assert_eq!(percentile_midpoint(&[], 50.0), 0.0);
    }

    #[test]
    fn explicit_threshold_is_returned_unchanged() {
        let x = array![[1.0f32, -2.0], [3.0, 0.5]].into_dyn();
        assert_eq!(derive_threshold(&x, 0.3, Some(7.5)).unwrap(), 7.5);
    }

    #[test]
    fn full_confidence_uses_minimum_magnitude() {
        let x = array![[1.0f32, -2.0], [3.0, 0.5]].into_dyn();
        assert_abs_diff_eq!(derive_threshold(&x, 1.0, None).unwrap(), 0.5);
        assert_abs_diff_eq!(derive_threshold(&x, 0.0, None).unwrap(), 3.0);
    }

    #[test]
    fn confidence_outside_unit_interval_is_rejected() {
        let x = ArrayD::<f32>::zeros(IxDyn(&[2]));
        assert!(derive_threshold(&x, 1.5, None).is_err());
        assert!(derive_threshold(&x, -0.1, None).is_err());
    }

    #[test]
    fn sequence_forms_parse() {
        assert_eq!(
            Thresholds::from_slice(&[Some(0.1), None]).unwrap().split(),
            (Some(0.1), None)
        );
        assert_eq!(Thresholds::from(0.2).split(), (Some(0.2), Some(0.2)));
        assert_eq!(Thresholds::from((0.1, 0.3)).split(), (Some(0.1), Some(0.3)));
        assert_eq!(Thresholds::from(None).split(), (None, None));
        assert_eq!(Thresholds::Derived.split(), (None, None));
        assert!(Thresholds::from_slice(&[Some(0.1)]).is_err());
        assert!(Thresholds::from_slice(&[None, None, None]).is_err());
    }
}
