// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Canonical slot ordering for term-bearing arrays.

use ndarray::ArrayD;

use crate::error::{invalid, ExplainResult};
use crate::terms::{classify_terms, terms_grid, TermMode};
use crate::util::{check_mask, check_same_shape, Rows};

/// Permutation `perm` with `values[perm[j]] == reference[j]` for every `j`.
///
/// Fails when `values` is not a rearrangement of `reference`.
pub fn fix_order(values: &[usize], reference: &[usize]) -> ExplainResult<Vec<usize>> {
    if values.len() != reference.len() {
        return Err(invalid(format!(
            "cannot reorder {values:?} into {reference:?}: lengths differ"
        )));
    }
    let width = values.iter().chain(reference).copied().max().map_or(0, |m| m + 1);
    let mut slot_of = vec![None; width];
    for (slot, &value) in values.iter().enumerate() {
        if slot_of[value].replace(slot).is_some() {
            return Err(invalid(format!("duplicate term index {value} in {values:?}")));
        }
    }
    reference
        .iter()
        .map(|&wanted| {
            slot_of[wanted].ok_or_else(|| {
                invalid(format!("{values:?} is not a rearrangement of {reference:?}"))
            })
        })
        .collect()
}

/// Applies [`fix_order`] to every lane along the last axis of `values`.
pub fn fix_order_lanes(values: &ArrayD<usize>, reference: &[usize]) -> ExplainResult<ArrayD<usize>> {
    let rows = Rows::from_array(values);
    let mut data = Vec::with_capacity(rows.data.len());
    for position in 0..rows.positions() {
        data.extend(fix_order(rows.row(position), reference)?);
    }
    Rows {
        value_shape: rows.value_shape,
        width: rows.width,
        data,
    }
    .into_array()
}

/// Counts and sums in canonical slot order with the position mask applied.
#[derive(Clone, Debug)]
pub struct Standardized {
    pub counts: ArrayD<f32>,
    pub sums: ArrayD<f32>,
    /// Always the canonical grid for `mode`.
    pub terms: ArrayD<usize>,
    pub mode: TermMode,
}

/// Reorders every position of `counts`/`sums` into canonical slot order and
/// zeroes positions excluded by `mask`.
///
/// `terms` gives the canonical term index held by each slot; without it the
/// arrays are assumed to be canonical already.
pub fn standardize(
    counts: &ArrayD<f32>,
    sums: &ArrayD<f32>,
    terms: Option<&ArrayD<usize>>,
    mask: Option<&ArrayD<bool>>,
) -> ExplainResult<Standardized> {
    check_same_shape("sums", counts.shape(), sums.shape())?;
    if let Some(terms) = terms {
        check_same_shape("terms", counts.shape(), terms.shape())?;
    }
    let mode = classify_terms(counts)?;
    check_mask(mask, counts.shape())?;

    let canonical = mode.canonical_order();
    let count_rows = Rows::from_array(counts);
    let sum_rows = Rows::from_array(sums);
    let term_rows = terms.map(Rows::from_array);
    let keep: Option<Vec<bool>> = mask.map(|m| m.iter().copied().collect());

    let mut out_counts = Vec::with_capacity(count_rows.data.len());
    let mut out_sums = Vec::with_capacity(sum_rows.data.len());
    for position in 0..count_rows.positions() {
        let perm = match &term_rows {
            Some(rows) => fix_order(rows.row(position), &canonical)?,
            None => canonical.clone(),
        };
        let kept = keep.as_ref().map_or(true, |k| k[position]);
        let (c, s) = (count_rows.row(position), sum_rows.row(position));
        for &slot in &perm {
            out_counts.push(if kept { c[slot] } else { 0.0 });
            out_sums.push(if kept { s[slot] } else { 0.0 });
        }
    }

    let value_shape = count_rows.value_shape.clone();
    let counts = Rows {
        value_shape: value_shape.clone(),
        width: count_rows.width,
        data: out_counts,
    }
    .into_array()?;
    let sums = Rows {
        value_shape: value_shape.clone(),
        width: sum_rows.width,
        data: out_sums,
    }
    .into_array()?;
    Ok(Standardized {
        counts,
        sums,
        terms: terms_grid(mode, &value_shape),
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    #[test]
    fn permutation_maps_values_onto_reference() {
        let values = [2, 0, 1];
        let perm = fix_order(&values, &[0, 1, 2]).unwrap();
        assert_eq!(perm, vec![1, 2, 0]);
        let reordered: Vec<usize> = perm.iter().map(|&p| values[p]).collect();
        assert_eq!(reordered, vec![0, 1, 2]);
    }

    #[test]
    fn mismatched_multisets_are_rejected() {
        assert!(fix_order(&[0, 0, 1], &[0, 1, 2]).is_err());
        assert!(fix_order(&[0, 1], &[0, 1, 2]).is_err());
        assert!(fix_order(&[0, 1, 3], &[0, 1, 2]).is_err());
    }

    #[test]
    fn lanes_are_reordered_independently() {
        let values = array![[2usize, 0, 1], [0, 1, 2]].into_dyn();
        let perms = fix_order_lanes(&values, &[0, 1, 2]).unwrap();
        assert_eq!(perms, array![[1usize, 2, 0], [0, 1, 2]].into_dyn());
    }

    #[test]
    fn standardize_restores_canonical_order() {
        let counts = array![[5.0f32, 1.0, 2.0], [1.0, 1.0, 1.0]].into_dyn();
        let sums = array![[-7.0f32, 0.1, 3.0], [1.0, 0.0, -1.0]].into_dyn();
        // First position holds N, Z, P.
        let terms = array![[2usize, 1, 0], [0, 1, 2]].into_dyn();
        let std = standardize(&counts, &sums, Some(&terms), None).unwrap();
        assert_eq!(std.mode, TermMode::Single);
        assert_eq!(std.counts, array![[2.0f32, 1.0, 5.0], [1.0, 1.0, 1.0]].into_dyn());
        assert_eq!(std.sums, array![[3.0f32, 0.1, -7.0], [1.0, 0.0, -1.0]].into_dyn());
        assert_eq!(std.terms, terms_grid(TermMode::Single, &[2]));
    }

    #[test]
    fn mask_zeroes_excluded_positions() {
        let counts = array![[1.0f32, 0.0, 2.0], [3.0, 0.0, 0.0]].into_dyn();
        let sums = array![[1.0f32, 0.0, -2.0], [9.0, 0.0, 0.0]].into_dyn();
        let mask = array![true, false].into_dyn();
        let std = standardize(&counts, &sums, None, Some(&mask)).unwrap();
        assert_eq!(std.counts, array![[1.0f32, 0.0, 2.0], [0.0, 0.0, 0.0]].into_dyn());
        assert_eq!(std.sums.sum(), -1.0);
    }

    #[test]
    fn shape_errors_surface() {
        let counts = ArrayD::<f32>::zeros(IxDyn(&[2, 9]));
        let sums = ArrayD::<f32>::zeros(IxDyn(&[3, 9]));
        assert!(standardize(&counts, &sums, None, None).is_err());
        let mask = ArrayD::from_elem(IxDyn(&[3]), true);
        assert!(standardize(&counts, &counts, None, Some(&mask)).is_err());
    }
}
