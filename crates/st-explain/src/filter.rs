// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Per-position term filtering.
//!
//! At each position a term survives if it is needed to reach `completeness`
//! of either the dominant signed sum or the total count. Dropped terms keep
//! their slot with a zero count and sum; slots are then sorted by descending
//! retained count and the per-slot term index records which term sits where.

use std::cmp::Ordering;

use ndarray::ArrayD;
use tracing::debug;

use crate::config::config;
use crate::error::{check_fraction, ExplainResult};
use crate::telemetry::TARGET;
use crate::terms::{classify_terms, TermMode};
use crate::util::{check_same_shape, Rows};

/// Filtered counts and sums together with the term held by each slot.
#[derive(Clone, Debug)]
pub struct Filtered {
    pub counts: ArrayD<f32>,
    pub sums: ArrayD<f32>,
    pub terms: ArrayD<usize>,
    pub mode: TermMode,
}

impl Filtered {
    /// Number of slots with a nonzero retained count.
    pub fn retained(&self) -> usize {
        self.counts.iter().filter(|&&c| c != 0.0).count()
    }
}

fn ascending_by<F: Fn(usize) -> f32>(order: &mut [usize], key: F) {
    order.sort_by(|&a, &b| key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal));
}

/// Slot layout for one position as `(term, retained)` pairs in output order.
fn filter_position(counts: &[f32], sums: &[f32], completeness: f32) -> Vec<(usize, bool)> {
    let width = counts.len();
    let mut keep = vec![false; width];
    let mut order: Vec<usize> = (0..width).collect();

    // Sum criterion: walk terms from smallest magnitude, tracking the positive
    // and negative running totals separately.
    ascending_by(&mut order, |k| sums[k].abs());
    let mut reach = Vec::with_capacity(width);
    let (mut positive, mut negative) = (0.0f32, 0.0f32);
    for &k in &order {
        if sums[k] > 0.0 {
            positive += sums[k];
        } else if sums[k] < 0.0 {
            negative += sums[k];
        }
        reach.push(positive.max(negative.abs()));
    }
    let sum_threshold = positive.max(negative.abs()) * (1.0 - completeness);
    for (&k, &r) in order.iter().zip(&reach) {
        keep[k] |= r >= sum_threshold;
    }
    order.reverse();

    // Count criterion.
    ascending_by(&mut order, |k| counts[k]);
    let mut cumulative = Vec::with_capacity(width);
    let mut total = 0.0f32;
    for &k in &order {
        total += counts[k];
        cumulative.push(total);
    }
    let count_threshold = total * (1.0 - completeness);
    for (&k, &c) in order.iter().zip(&cumulative) {
        keep[k] |= c >= count_threshold;
    }
    order.reverse();

    let retained = |k: usize| if keep[k] { counts[k] } else { 0.0 };
    order.sort_by(|&a, &b| retained(b).partial_cmp(&retained(a)).unwrap_or(Ordering::Equal));
    order.into_iter().map(|k| (k, keep[k])).collect()
}

/// Drops, per position, the terms not needed to reach `completeness`.
///
/// `counts` and `sums` must be canonically ordered. A `completeness` of `1.0`
/// keeps every term with a nonzero count or sum.
pub fn filter_classifications(
    counts: &ArrayD<f32>,
    sums: &ArrayD<f32>,
    completeness: f32,
) -> ExplainResult<Filtered> {
    check_same_shape("sums", counts.shape(), sums.shape())?;
    check_fraction("completeness", completeness)?;
    let mode = classify_terms(counts)?;

    let count_rows = Rows::from_array(counts);
    let sum_rows = Rows::from_array(sums);
    let len = count_rows.data.len();
    let (mut out_counts, mut out_sums, mut out_terms) =
        (Vec::with_capacity(len), Vec::with_capacity(len), Vec::with_capacity(len));
    for position in 0..count_rows.positions() {
        let (c, s) = (count_rows.row(position), sum_rows.row(position));
        for (term, kept) in filter_position(c, s, completeness) {
            out_counts.push(if kept { c[term] } else { 0.0 });
            out_sums.push(if kept { s[term] } else { 0.0 });
            out_terms.push(term);
        }
    }

    let positions = count_rows.positions();
    let value_shape = count_rows.value_shape;
    let width = count_rows.width;
    let filtered = Filtered {
        counts: Rows {
            value_shape: value_shape.clone(),
            width,
            data: out_counts,
        }
        .into_array()?,
        sums: Rows {
            value_shape: value_shape.clone(),
            width,
            data: out_sums,
        }
        .into_array()?,
        terms: Rows {
            value_shape,
            width,
            data: out_terms,
        }
        .into_array()?,
        mode,
    };
    debug!(
        target: TARGET,
        completeness,
        positions,
        retained = filtered.retained(),
        "filtered classifications"
    );
    Ok(filtered)
}

/// [`filter_classifications`] at the configured default completeness.
pub fn filter_classifications_default(counts: &ArrayD<f32>, sums: &ArrayD<f32>) -> ExplainResult<Filtered> {
    filter_classifications(counts, sums, config().completeness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn dominant_terms_survive_and_lead() {
        // P, Z, N at one position: N dominates both sums and counts.
        let counts = array![[1.0f32, 2.0, 7.0]].into_dyn();
        let sums = array![[0.5f32, 0.0, -9.0]].into_dyn();
        let filtered = filter_classifications(&counts, &sums, 0.75).unwrap();
        assert_eq!(filtered.terms, array![[2usize, 1, 0]].into_dyn());
        assert_eq!(filtered.counts, array![[7.0f32, 2.0, 0.0]].into_dyn());
        assert_eq!(filtered.sums, array![[-9.0f32, 0.0, 0.0]].into_dyn());
    }

    #[test]
    fn full_completeness_keeps_every_contributing_term() {
        let counts = array![[3.0f32, 0.0, 1.0], [0.0, 0.0, 0.0]].into_dyn();
        let sums = array![[2.0f32, 0.0, -1.0], [0.0, 0.0, 0.0]].into_dyn();
        let filtered = filter_classifications(&counts, &sums, 1.0).unwrap();
        assert_eq!(filtered.counts.sum(), 4.0);
        assert_eq!(filtered.sums.sum(), 1.0);
    }

    #[test]
    fn zero_position_survives_untouched() {
        let counts = array![[0.0f32, 0.0, 0.0]].into_dyn();
        let filtered = filter_classifications(&counts, &counts, 0.5).unwrap();
        assert_eq!(filtered.counts, counts);
        assert_eq!(filtered.terms, array![[0usize, 1, 2]].into_dyn());
    }

    #[test]
    fn terms_form_a_permutation_at_every_position() {
        let counts = array![[[1.0f32, 4.0, 0.0, 2.0, 0.0, 3.0, 0.0, 1.0, 5.0]]].into_dyn();
        let sums = array![[[0.1f32, 9.0, 0.0, -0.2, 0.0, 0.0, 0.0, 0.4, -6.0]]].into_dyn();
        let filtered = filter_classifications(&counts, &sums, 0.6).unwrap();
        let mut seen: Vec<usize> = filtered.terms.iter().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..9).collect::<Vec<_>>());
        // Retained counts are non-increasing across slots.
        let retained: Vec<f32> = filtered.counts.iter().copied().collect();
        assert!(retained.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn value_shape_survives_filtering() {
        let counts = array![[[1.0f32, 0.0, 3.0], [2.0, 2.0, 0.0]], [[0.0, 0.0, 0.0], [5.0, 1.0, 1.0]]]
            .into_dyn();
        let sums = counts.mapv(|c| c - 1.0);
        let filtered = filter_classifications(&counts, &sums, 0.75).unwrap();
        assert_eq!(filtered.counts.shape(), &[2, 2, 3]);
        assert_eq!(filtered.sums.shape(), &[2, 2, 3]);
        assert_eq!(filtered.terms.shape(), &[2, 2, 3]);
        assert_eq!(filtered.mode, TermMode::Single);
    }

    #[test]
    fn completeness_out_of_range_is_rejected() {
        let counts = array![[1.0f32, 0.0, 0.0]].into_dyn();
        assert!(filter_classifications(&counts, &counts, 1.2).is_err());
    }
}
