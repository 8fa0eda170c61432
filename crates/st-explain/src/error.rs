// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

/// Result alias used throughout the explainer.
pub type ExplainResult<T> = Result<T, ExplainError>;

/// Errors emitted while classifying, filtering, grouping or summarising.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// Two arrays that must agree on shape (or a mask and a value shape) do not.
    #[error("shape mismatch for {label}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        label: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// Malformed thresholds, out-of-range fractions, unknown term counts or
    /// unsupported option combinations.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Reshape failure bubbled up from ndarray.
    #[error("layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

pub(crate) fn shape_mismatch(label: &'static str, expected: &[usize], got: &[usize]) -> ExplainError {
    ExplainError::ShapeMismatch {
        label,
        expected: expected.to_vec(),
        got: got.to_vec(),
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> ExplainError {
    ExplainError::InvalidArgument(message.into())
}

/// Rejects fractions (confidence, completeness) outside `[0, 1]`.
pub(crate) fn check_fraction(label: &str, value: f32) -> ExplainResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{label} must lie in [0, 1]; received {value}")))
    }
}
