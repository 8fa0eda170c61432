// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Sign-class decomposition of matmul-like operations.
//!
//! Given `value = op(x, y)`, the classifiers here return `counts` and `sums`
//! with shape `value_shape + (9,)` such that `value == sums.sum_axis(-1)`.
//! Slot `k` holds the contribution of the `k`-th canonical term
//! (`PP, PZ, PN, ZP, ZZ, ZN, NP, NZ, NN`): `sums[.., k]` is the partial value
//! computed only from the elements of `x` and `y` in those sign classes, and
//! `counts[.., k]` is the number of element pairs that fed it.
//!
//! ```
//! use ndarray::{Array, Axis, IxDyn};
//! use st_explain::{matmul_classify, ClassifyOptions};
//!
//! let a = Array::from_shape_fn(IxDyn(&[10, 10]), |i| i[1] as f32 * 0.1);
//! let opts = ClassifyOptions::with_confidence(0.90);
//! let classified = matmul_classify(&a, &a, &opts).unwrap();
//! let recovered = classified.sums.sum_axis(Axis(2));
//! assert_eq!(recovered.shape(), &[10, 10]);
//! ```

use ndarray::{stack, ArrayD, Axis};
use tracing::debug;

use crate::classify::{classification_mask, SignClass, SignMasks};
use crate::config::config;
use crate::error::{check_fraction, invalid, ExplainResult};
use crate::ops::{self, Axes, ConvSpec};
use crate::telemetry::TARGET;
use crate::terms::TermMode;
use crate::threshold::Thresholds;

/// Threshold controls shared by every two-input classifier.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifyOptions {
    /// Confidence in `[0, 1]` used for any threshold not given explicitly.
    /// Higher values make "near zero" stricter; `1.0` reserves it (almost)
    /// exclusively for exact zeros.
    pub confidence: f32,
    pub thresholds: Thresholds,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            confidence: config().confidence,
            thresholds: Thresholds::Derived,
        }
    }
}

impl ClassifyOptions {
    pub fn with_confidence(confidence: f32) -> Self {
        Self {
            confidence,
            thresholds: Thresholds::Derived,
        }
    }

    pub fn thresholds(mut self, thresholds: impl Into<Thresholds>) -> Self {
        self.thresholds = thresholds.into();
        self
    }
}

/// Per-position term counts and partial sums, plus the thresholds applied
/// to each input (one for single-tensor classification, two otherwise).
#[derive(Clone, Debug)]
pub struct Classification {
    pub counts: ArrayD<f32>,
    pub sums: ArrayD<f32>,
    pub thresholds: Vec<f32>,
    pub mode: TermMode,
}

impl Classification {
    /// Shape of the un-classified result.
    pub fn value_shape(&self) -> &[usize] {
        let shape = self.counts.shape();
        &shape[..shape.len() - 1]
    }

    /// Sums across the term axis, reproducing the un-classified result.
    pub fn reconstruct(&self) -> ArrayD<f32> {
        self.sums.sum_axis(Axis(self.sums.ndim() - 1))
    }

    pub fn into_parts(self) -> (ArrayD<f32>, ArrayD<f32>) {
        (self.counts, self.sums)
    }
}

/// The operation a pairwise classification decomposes.
#[derive(Clone, Debug, PartialEq)]
pub enum PairOp {
    /// Tensor contraction; covers dot products and matrix multiplication.
    Contract(Axes),
    /// Elementwise product.
    Multiply,
    /// Channels-last N-D convolution.
    Conv(ConvSpec),
    /// Gradient of a convolution with respect to its filter.
    ConvFilterGrad { kernel_shape: Vec<usize>, spec: ConvSpec },
}

impl PairOp {
    pub fn name(&self) -> &'static str {
        match self {
            PairOp::Contract(_) => "tensordot",
            PairOp::Multiply => "multiply",
            PairOp::Conv(_) => "conv",
            PairOp::ConvFilterGrad { .. } => "conv_backprop_filter",
        }
    }

    /// Applies the un-classified operation.
    pub fn apply(&self, a: &ArrayD<f32>, b: &ArrayD<f32>) -> ExplainResult<ArrayD<f32>> {
        match self {
            PairOp::Contract(axes) => ops::tensordot(a, b, axes),
            PairOp::Multiply => ops::multiply(a, b),
            PairOp::Conv(spec) => ops::conv_nd(a, b, spec),
            PairOp::ConvFilterGrad { kernel_shape, spec } => {
                ops::conv_backprop_filter(a, b, kernel_shape, spec)
            }
        }
    }
}

fn stack_last(parts: &[ArrayD<f32>]) -> ExplainResult<ArrayD<f32>> {
    let ndim = parts.first().map_or(0, |p| p.ndim());
    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
    Ok(stack(Axis(ndim), &views)?)
}

/// Applies `op` to every ordered pair of sign classes of `x` and `y`, in
/// canonical term order, once on 0/1 indicators (counts) and once on the
/// class-restricted values (sums).
pub fn combine(
    x: &ArrayD<f32>,
    x_masks: &SignMasks,
    y: &ArrayD<f32>,
    y_masks: &SignMasks,
    op: &PairOp,
) -> ExplainResult<Classification> {
    let x_counts: Vec<ArrayD<f32>> = SignClass::ALL.iter().map(|&c| x_masks.indicator(c)).collect();
    let y_counts: Vec<ArrayD<f32>> = SignClass::ALL.iter().map(|&c| y_masks.indicator(c)).collect();
    let x_values: Vec<ArrayD<f32>> = SignClass::ALL.iter().map(|&c| x_masks.restrict(x, c)).collect();
    let y_values: Vec<ArrayD<f32>> = SignClass::ALL.iter().map(|&c| y_masks.restrict(y, c)).collect();

    let mut counts = Vec::with_capacity(9);
    let mut sums = Vec::with_capacity(9);
    for a in 0..3 {
        for b in 0..3 {
            counts.push(op.apply(&x_counts[a], &y_counts[b])?);
            sums.push(op.apply(&x_values[a], &y_values[b])?);
        }
    }

    Ok(Classification {
        counts: stack_last(&counts)?,
        sums: stack_last(&sums)?,
        thresholds: vec![x_masks.threshold, y_masks.threshold],
        mode: TermMode::Pairwise,
    })
}

fn classify_pair(
    x: &ArrayD<f32>,
    y: &ArrayD<f32>,
    op: PairOp,
    opts: &ClassifyOptions,
) -> ExplainResult<Classification> {
    check_fraction("confidence", opts.confidence)?;
    let (x_threshold, y_threshold) = opts.thresholds.split();
    let x_masks = classification_mask(x, opts.confidence, x_threshold)?;
    let y_masks = classification_mask(y, opts.confidence, y_threshold)?;
    let classified = combine(x, &x_masks, y, &y_masks, &op)?;
    debug!(
        target: TARGET,
        op = op.name(),
        x_threshold = x_masks.threshold,
        y_threshold = y_masks.threshold,
        value_shape = ?classified.value_shape(),
        "classified"
    );
    Ok(classified)
}

/// P/Z/N counts and values of a single tensor; shape `x_shape + (3,)`.
pub fn tensor_classify(
    x: &ArrayD<f32>,
    confidence: f32,
    threshold: Option<f32>,
) -> ExplainResult<Classification> {
    check_fraction("confidence", confidence)?;
    let masks = classification_mask(x, confidence, threshold)?;
    let counts: Vec<ArrayD<f32>> = SignClass::ALL.iter().map(|&c| masks.indicator(c)).collect();
    let sums: Vec<ArrayD<f32>> = SignClass::ALL.iter().map(|&c| masks.restrict(x, c)).collect();
    debug!(target: TARGET, op = "tensor", threshold = masks.threshold, shape = ?x.shape(), "classified");
    Ok(Classification {
        counts: stack_last(&counts)?,
        sums: stack_last(&sums)?,
        thresholds: vec![masks.threshold],
        mode: TermMode::Single,
    })
}

/// Decomposes the 2-D matrix product `x . y`; shape `(n, m, 9)`.
pub fn matmul_classify(
    x: &ArrayD<f32>,
    y: &ArrayD<f32>,
    opts: &ClassifyOptions,
) -> ExplainResult<Classification> {
    if x.ndim() != 2 || y.ndim() != 2 {
        return Err(invalid(format!(
            "matmul expects 2-D operands, got ranks {} and {}",
            x.ndim(),
            y.ndim()
        )));
    }
    classify_pair(x, y, PairOp::Contract(Axes::Count(1)), opts)
}

/// Decomposes a general tensor contraction.
pub fn tensordot_classify(
    x: &ArrayD<f32>,
    y: &ArrayD<f32>,
    axes: &Axes,
    opts: &ClassifyOptions,
) -> ExplainResult<Classification> {
    classify_pair(x, y, PairOp::Contract(axes.clone()), opts)
}

/// Decomposes the elementwise product; shape `x_shape + (9,)`.
pub fn multiply_classify(
    x: &ArrayD<f32>,
    y: &ArrayD<f32>,
    opts: &ClassifyOptions,
) -> ExplainResult<Classification> {
    classify_pair(x, y, PairOp::Multiply, opts)
}

/// Decomposes a channels-last convolution of `inputs` by `kernel`.
pub fn conv_classify(
    inputs: &ArrayD<f32>,
    kernel: &ArrayD<f32>,
    spec: &ConvSpec,
    opts: &ClassifyOptions,
) -> ExplainResult<Classification> {
    classify_pair(inputs, kernel, PairOp::Conv(spec.clone()), opts)
}

/// Decomposes the filter gradient computed from the original convolution
/// input `x` and the output gradient `d_out`; shape `kernel_shape + (9,)`.
pub fn conv_backprop_filter_classify(
    x: &ArrayD<f32>,
    d_out: &ArrayD<f32>,
    kernel_shape: &[usize],
    spec: &ConvSpec,
    opts: &ClassifyOptions,
) -> ExplainResult<Classification> {
    let op = PairOp::ConvFilterGrad {
        kernel_shape: kernel_shape.to_vec(),
        spec: spec.clone(),
    };
    classify_pair(x, d_out, op, opts)
}
