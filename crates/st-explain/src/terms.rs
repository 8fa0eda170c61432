// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Canonical term tables.
//!
//! Every term-bearing array in the crate has a trailing axis of length 3 or 9
//! whose slots are identified by the 0-based index of the term in these
//! tables. The tables never change; filtered arrays carry an explicit
//! per-slot term index array instead of reordering the tables.

use std::fmt;

use ndarray::{ArrayD, Axis, Dimension, IxDyn};

use crate::error::{invalid, ExplainResult};

/// Sign classes of a single tensor, in canonical order.
pub const SINGLE_TERMS: [&str; 3] = ["P", "Z", "N"];

/// Sign-class combinations of two tensors, in canonical order.
pub const PAIRWISE_TERMS: [&str; 9] = ["PP", "PZ", "PN", "ZP", "ZZ", "ZN", "NP", "NZ", "NN"];

/// Whether a classification describes one tensor (3 terms) or a pair (9 terms).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "report-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TermMode {
    Single,
    #[default]
    Pairwise,
}

impl TermMode {
    /// Infers the mode from the length of a trailing term axis.
    pub fn from_term_count(count: usize) -> ExplainResult<Self> {
        match count {
            3 => Ok(TermMode::Single),
            9 => Ok(TermMode::Pairwise),
            other => Err(invalid(format!(
                "unrecognised term count {other} in last dimension (expected 3 or 9)"
            ))),
        }
    }

    /// Number of terms in this mode.
    pub fn len(self) -> usize {
        self.labels().len()
    }

    /// Always `false`: both term tables are non-empty.
    pub fn is_empty(self) -> bool {
        self.labels().is_empty()
    }

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            TermMode::Single => &SINGLE_TERMS,
            TermMode::Pairwise => &PAIRWISE_TERMS,
        }
    }

    /// Label of the term with canonical index `index`.
    pub fn label(self, index: usize) -> Option<&'static str> {
        self.labels().get(index).copied()
    }

    /// Canonical index of a label, if it belongs to this mode.
    pub fn index_of(self, label: &str) -> Option<usize> {
        self.labels().iter().position(|candidate| *candidate == label)
    }

    /// Canonical slot order `[0, 1, .., T-1]`.
    pub fn canonical_order(self) -> Vec<usize> {
        (0..self.len()).collect()
    }
}

impl fmt::Display for TermMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermMode::Single => write!(f, "single"),
            TermMode::Pairwise => write!(f, "pairwise"),
        }
    }
}

/// Identifies the term mode of a counts or sums array from its last dimension.
pub fn classify_terms<T>(example: &ArrayD<T>) -> ExplainResult<TermMode> {
    let last = example
        .shape()
        .last()
        .copied()
        .ok_or_else(|| invalid("cannot infer terms from a zero-dimensional array"))?;
    TermMode::from_term_count(last)
}

/// Canonical term indices tiled across `value_shape`, giving an array of
/// shape `value_shape + (T,)`.
pub fn terms_grid(mode: TermMode, value_shape: &[usize]) -> ArrayD<usize> {
    let t = mode.len();
    let mut shape = value_shape.to_vec();
    shape.push(t);
    ArrayD::from_shape_fn(IxDyn(&shape), |idx| idx[idx.ndim() - 1])
}

/// Resolves a per-slot index array into labels along the last axis.
pub fn labels_for(mode: TermMode, terms: &ArrayD<usize>) -> Vec<Vec<&'static str>> {
    let last = Axis(terms.ndim().saturating_sub(1));
    terms
        .lanes(last)
        .into_iter()
        .map(|lane| lane.iter().filter_map(|&idx| mode.label(idx)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn mode_follows_trailing_dimension() {
        let single = ArrayD::<f32>::zeros(IxDyn(&[4, 3]));
        let pair = ArrayD::<f32>::zeros(IxDyn(&[2, 2, 9]));
        assert_eq!(classify_terms(&single).unwrap(), TermMode::Single);
        assert_eq!(classify_terms(&pair).unwrap(), TermMode::Pairwise);
        assert_eq!(TermMode::Pairwise.labels().len(), 9);
        assert_eq!(TermMode::Single.labels(), &["P", "Z", "N"]);
    }

    #[test]
    fn unknown_trailing_dimension_is_rejected() {
        let odd = ArrayD::<f32>::zeros(IxDyn(&[4, 5]));
        assert!(classify_terms(&odd).is_err());
        let scalar = Array::from_elem(IxDyn(&[]), 1.0f32);
        assert!(classify_terms(&scalar).is_err());
    }

    #[test]
    fn default_mode_is_pairwise() {
        assert_eq!(TermMode::default(), TermMode::Pairwise);
        assert_eq!(TermMode::default().len(), 9);
        assert!(!TermMode::Single.is_empty());
    }

    #[test]
    fn grid_tiles_canonical_order() {
        let grid = terms_grid(TermMode::Single, &[2, 2]);
        assert_eq!(grid.shape(), &[2, 2, 3]);
        assert_eq!(grid[[1, 0, 2]], 2);
        let labels = labels_for(TermMode::Single, &grid);
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[3], vec!["P", "Z", "N"]);
    }

    #[test]
    fn labels_round_trip_through_indices() {
        for (idx, label) in PAIRWISE_TERMS.iter().enumerate() {
            assert_eq!(TermMode::Pairwise.index_of(label), Some(idx));
        }
        assert_eq!(TermMode::Single.index_of("PP"), None);
    }
}
