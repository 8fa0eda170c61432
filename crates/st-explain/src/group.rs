// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Grouping of positions by their retained-term signature.

use std::collections::HashMap;

use ndarray::{Array2, ArrayD};
use tracing::debug;

use crate::error::{check_fraction, invalid, ExplainResult};
use crate::telemetry::TARGET;
use crate::terms::{classify_terms, TermMode};
use crate::util::{check_mask, check_same_shape, Rows};

/// Positions that share a retained-term signature.
#[derive(Clone, Debug)]
pub struct ClassificationGroup {
    /// `(rows, T)` counts of the member positions.
    pub counts: Array2<f32>,
    pub sums: Array2<f32>,
    pub terms: Array2<usize>,
    pub mode: TermMode,
    signature: u64,
    labels: Vec<&'static str>,
}

impl ClassificationGroup {
    /// Number of member positions.
    pub fn size(&self) -> usize {
        self.counts.nrows()
    }

    /// Labels of the retained terms, in slot order.
    pub fn labels(&self) -> &[&'static str] {
        &self.labels
    }

    pub fn signature(&self) -> u64 {
        self.signature
    }
}

/// Base-`(T+1)` encoding of the slot pattern: each slot contributes its term
/// index plus one, or zero when its count is zero.
fn signature(counts: &[f32], terms: &[usize]) -> u64 {
    let base = counts.len() as u64 + 1;
    counts.iter().zip(terms).fold(0u64, |acc, (&count, &term)| {
        let digit = if count == 0.0 { 0 } else { term as u64 + 1 };
        acc * base + digit
    })
}

/// Buckets positions by signature. Groups come back largest first; groups
/// of equal size keep the order in which their first member appears.
pub fn group_classifications(
    counts: &ArrayD<f32>,
    sums: &ArrayD<f32>,
    terms: &ArrayD<usize>,
    mask: Option<&ArrayD<bool>>,
) -> ExplainResult<Vec<ClassificationGroup>> {
    check_same_shape("sums", counts.shape(), sums.shape())?;
    check_same_shape("terms", counts.shape(), terms.shape())?;
    let mode = classify_terms(counts)?;
    check_mask(mask, counts.shape())?;
    if let Some(&bad) = terms.iter().find(|&&t| t >= mode.len()) {
        return Err(invalid(format!("term index {bad} out of range for {mode} terms")));
    }

    let count_rows = Rows::from_array(counts);
    let sum_rows = Rows::from_array(sums);
    let term_rows = Rows::from_array(terms);
    let keep: Option<Vec<bool>> = mask.map(|m| m.iter().copied().collect());

    let mut slot_of: HashMap<u64, usize> = HashMap::new();
    let mut buckets: Vec<(u64, Vec<usize>)> = Vec::new();
    for position in 0..count_rows.positions() {
        if keep.as_ref().is_some_and(|k| !k[position]) {
            continue;
        }
        let sig = signature(count_rows.row(position), term_rows.row(position));
        let slot = *slot_of.entry(sig).or_insert_with(|| {
            buckets.push((sig, Vec::new()));
            buckets.len() - 1
        });
        buckets[slot].1.push(position);
    }
    buckets.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let width = count_rows.width;
    let mut groups = Vec::with_capacity(buckets.len());
    for (sig, members) in buckets {
        let gather_f32 = |rows: &Rows<f32>| -> Vec<f32> {
            members.iter().flat_map(|&p| rows.row(p).iter().copied()).collect()
        };
        let counts = Array2::from_shape_vec((members.len(), width), gather_f32(&count_rows))?;
        let sums = Array2::from_shape_vec((members.len(), width), gather_f32(&sum_rows))?;
        let terms = Array2::from_shape_vec(
            (members.len(), width),
            members
                .iter()
                .flat_map(|&p| term_rows.row(p).iter().copied())
                .collect(),
        )?;
        let first = members[0];
        let labels = count_rows
            .row(first)
            .iter()
            .zip(term_rows.row(first))
            .filter(|&(&count, _)| count != 0.0)
            .filter_map(|(_, &term)| mode.label(term))
            .collect();
        groups.push(ClassificationGroup {
            counts,
            sums,
            terms,
            mode,
            signature: sig,
            labels,
        });
    }
    debug!(target: TARGET, groups = groups.len(), "grouped classifications");
    Ok(groups)
}

/// Groups kept by [`filter_groups`] and the fraction of positions they cover.
#[derive(Clone, Debug)]
pub struct GroupSelection {
    pub groups: Vec<ClassificationGroup>,
    pub coverage: f32,
}

/// Keeps the largest groups until they cover `completeness` of all grouped
/// positions, then caps the result at `max_groups`.
///
/// `groups` must be sorted by descending size, as returned by
/// [`group_classifications`]. Without a completeness every group is kept.
/// A `max_groups` of `None` or `Some(0)` applies no cap.
pub fn filter_groups(
    groups: Vec<ClassificationGroup>,
    completeness: Option<f32>,
    max_groups: Option<usize>,
) -> ExplainResult<GroupSelection> {
    let completeness = completeness.unwrap_or(1.0);
    check_fraction("completeness", completeness)?;

    let sizes: Vec<usize> = groups.iter().map(ClassificationGroup::size).collect();
    let total: usize = sizes.iter().sum();
    let threshold = total as f64 * (1.0 - completeness as f64);

    // A group is kept while the positions from it onwards still reach the
    // threshold.
    let mut remaining = total;
    let mut kept = 0;
    for &size in &sizes {
        if remaining as f64 >= threshold {
            kept += 1;
        }
        remaining -= size;
    }
    if let Some(cap) = max_groups.filter(|&cap| cap > 0) {
        kept = kept.min(cap);
    }

    let mut groups = groups;
    groups.truncate(kept);
    let covered: usize = groups.iter().map(ClassificationGroup::size).sum();
    let coverage = if total == 0 {
        0.0
    } else {
        covered as f32 / total as f32
    };
    debug!(target: TARGET, kept, total, coverage, "filtered groups");
    Ok(GroupSelection { groups, coverage })
}
