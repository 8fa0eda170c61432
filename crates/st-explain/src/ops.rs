// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Plain CPU versions of the operations the classifiers decompose.
//!
//! Layouts follow the channels-last convention: convolution inputs are
//! `(batch, spatial.., in_channels)` and kernels are
//! `(spatial.., in_channels, out_channels)`.

use std::fmt;

use ndarray::{Array2, ArrayD, IxDyn};

use crate::error::{invalid, shape_mismatch, ExplainResult};

/// Contraction axes for [`tensordot`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Axes {
    /// Contract the last `n` axes of `x` against the first `n` axes of `y`.
    Count(usize),
    /// Contract `x` axes against the paired `y` axes.
    Pairs(Vec<usize>, Vec<usize>),
}

impl Axes {
    fn resolve(&self, x_ndim: usize, y_ndim: usize) -> ExplainResult<(Vec<usize>, Vec<usize>)> {
        let (xa, ya) = match self {
            Axes::Count(n) => {
                if *n > x_ndim || *n > y_ndim {
                    return Err(invalid(format!(
                        "cannot contract {n} axes of ranks {x_ndim} and {y_ndim}"
                    )));
                }
                ((x_ndim - n..x_ndim).collect(), (0..*n).collect())
            }
            Axes::Pairs(xa, ya) => (xa.clone(), ya.clone()),
        };
        if xa.len() != ya.len() {
            return Err(invalid(format!(
                "contraction axes differ in length: {} vs {}",
                xa.len(),
                ya.len()
            )));
        }
        check_axes("x", &xa, x_ndim)?;
        check_axes("y", &ya, y_ndim)?;
        Ok((xa, ya))
    }
}

fn check_axes(label: &str, axes: &[usize], ndim: usize) -> ExplainResult<()> {
    for (i, &ax) in axes.iter().enumerate() {
        if ax >= ndim {
            return Err(invalid(format!("{label} axis {ax} out of range for rank {ndim}")));
        }
        if axes[..i].contains(&ax) {
            return Err(invalid(format!("{label} axis {ax} repeated")));
        }
    }
    Ok(())
}

/// General tensor contraction. The result has the free axes of `x` followed by
/// the free axes of `y`.
pub fn tensordot(x: &ArrayD<f32>, y: &ArrayD<f32>, axes: &Axes) -> ExplainResult<ArrayD<f32>> {
    let (xa, ya) = axes.resolve(x.ndim(), y.ndim())?;
    for (&ax, &ay) in xa.iter().zip(&ya) {
        if x.shape()[ax] != y.shape()[ay] {
            return Err(shape_mismatch(
                "tensordot contracted axis",
                &[x.shape()[ax]],
                &[y.shape()[ay]],
            ));
        }
    }
    let x_free: Vec<usize> = (0..x.ndim()).filter(|ax| !xa.contains(ax)).collect();
    let y_free: Vec<usize> = (0..y.ndim()).filter(|ax| !ya.contains(ax)).collect();

    let m: usize = x_free.iter().map(|&ax| x.shape()[ax]).product();
    let k: usize = xa.iter().map(|&ax| x.shape()[ax]).product();
    let n: usize = y_free.iter().map(|&ax| y.shape()[ax]).product();

    let perm_x: Vec<usize> = x_free.iter().chain(&xa).copied().collect();
    let perm_y: Vec<usize> = ya.iter().chain(&y_free).copied().collect();
    let xp = x.view().permuted_axes(perm_x.as_slice());
    let yp = y.view().permuted_axes(perm_y.as_slice());
    let a = Array2::from_shape_vec((m, k), xp.iter().copied().collect())?;
    let b = Array2::from_shape_vec((k, n), yp.iter().copied().collect())?;

    let out_shape: Vec<usize> = x_free
        .iter()
        .map(|&ax| x.shape()[ax])
        .chain(y_free.iter().map(|&ax| y.shape()[ax]))
        .collect();
    Ok(a.dot(&b).into_shape(IxDyn(&out_shape))?)
}

/// Two-dimensional matrix product.
pub fn matmul(x: &ArrayD<f32>, y: &ArrayD<f32>) -> ExplainResult<ArrayD<f32>> {
    if x.ndim() != 2 || y.ndim() != 2 {
        return Err(invalid(format!(
            "matmul expects 2-D operands, got ranks {} and {}",
            x.ndim(),
            y.ndim()
        )));
    }
    tensordot(x, y, &Axes::Count(1))
}

/// Elementwise product of identically shaped tensors.
pub fn multiply(x: &ArrayD<f32>, y: &ArrayD<f32>) -> ExplainResult<ArrayD<f32>> {
    if x.shape() != y.shape() {
        return Err(shape_mismatch("multiply operand", x.shape(), y.shape()));
    }
    Ok(x * y)
}

/// Convolution padding mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "report-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Padding {
    /// No padding; windows must fit entirely inside the input.
    #[default]
    Valid,
    /// Output spatial size `ceil(in / stride)`, odd padding goes after.
    Same,
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Padding::Valid => write!(f, "VALID"),
            Padding::Same => write!(f, "SAME"),
        }
    }
}

/// Strides and padding shared by the convolution and its filter gradient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvSpec {
    /// One stride for every spatial dimension, or one per dimension.
    pub strides: Vec<usize>,
    pub padding: Padding,
}

impl Default for ConvSpec {
    fn default() -> Self {
        Self {
            strides: vec![1],
            padding: Padding::Valid,
        }
    }
}

impl ConvSpec {
    pub fn new(strides: impl Into<Vec<usize>>, padding: Padding) -> Self {
        Self {
            strides: strides.into(),
            padding,
        }
    }

    fn strides_for(&self, spatial: usize) -> ExplainResult<Vec<usize>> {
        let strides = match self.strides.len() {
            1 => vec![self.strides[0]; spatial],
            len if len == spatial => self.strides.clone(),
            len => {
                return Err(invalid(format!(
                    "expected 1 or {spatial} strides, got {len}"
                )))
            }
        };
        if strides.contains(&0) {
            return Err(invalid("strides must be greater than zero"));
        }
        Ok(strides)
    }
}

/// Resolved convolution geometry.
#[derive(Debug)]
struct ConvGeometry {
    batch: usize,
    in_spatial: Vec<usize>,
    kernel_spatial: Vec<usize>,
    out_spatial: Vec<usize>,
    strides: Vec<usize>,
    pad_before: Vec<usize>,
    in_channels: usize,
    out_channels: usize,
}

impl ConvGeometry {
    fn resolve(input_shape: &[usize], kernel_shape: &[usize], spec: &ConvSpec) -> ExplainResult<Self> {
        if input_shape.len() < 3 {
            return Err(invalid(format!(
                "convolution input must have rank >= 3, got shape {input_shape:?}"
            )));
        }
        let spatial = input_shape.len() - 2;
        if kernel_shape.len() != spatial + 2 {
            return Err(invalid(format!(
                "kernel rank {} does not match input rank {}",
                kernel_shape.len(),
                input_shape.len()
            )));
        }
        let in_channels = input_shape[spatial + 1];
        if kernel_shape[spatial] != in_channels {
            return Err(shape_mismatch(
                "kernel input channels",
                &[in_channels],
                &[kernel_shape[spatial]],
            ));
        }
        let strides = spec.strides_for(spatial)?;
        let in_spatial = input_shape[1..=spatial].to_vec();
        let kernel_spatial = kernel_shape[..spatial].to_vec();

        let mut out_spatial = Vec::with_capacity(spatial);
        let mut pad_before = Vec::with_capacity(spatial);
        for d in 0..spatial {
            let (input, kernel, stride) = (in_spatial[d], kernel_spatial[d], strides[d]);
            match spec.padding {
                Padding::Valid => {
                    if kernel > input || kernel == 0 {
                        return Err(shape_mismatch(
                            "VALID convolution window",
                            &in_spatial,
                            &kernel_spatial,
                        ));
                    }
                    out_spatial.push((input - kernel) / stride + 1);
                    pad_before.push(0);
                }
                Padding::Same => {
                    let out = input.div_ceil(stride);
                    let needed = (out.saturating_sub(1) * stride + kernel).saturating_sub(input);
                    out_spatial.push(out);
                    pad_before.push(needed / 2);
                }
            }
        }

        Ok(Self {
            batch: input_shape[0],
            in_spatial,
            kernel_spatial,
            out_spatial,
            strides,
            pad_before,
            in_channels,
            out_channels: kernel_shape[spatial + 1],
        })
    }

    fn output_shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.out_spatial.len() + 2);
        shape.push(self.batch);
        shape.extend_from_slice(&self.out_spatial);
        shape.push(self.out_channels);
        shape
    }

    fn kernel_shape(&self) -> Vec<usize> {
        let mut shape = self.kernel_spatial.clone();
        shape.push(self.in_channels);
        shape.push(self.out_channels);
        shape
    }

    /// Visits every (output position, input position, kernel position) triple
    /// whose input tap lies inside the unpadded input. Output and input
    /// positions are flat `(batch, spatial..)` offsets.
    fn for_each_tap(&self, mut visit: impl FnMut(usize, usize, usize)) {
        let out_count: usize = self.out_spatial.iter().product();
        let kernel_count: usize = self.kernel_spatial.iter().product();
        let in_count: usize = self.in_spatial.iter().product();
        let spatial = self.in_spatial.len();
        let mut opos = vec![0usize; spatial];
        let mut kpos = vec![0usize; spatial];

        for o_flat in 0..out_count {
            unravel(o_flat, &self.out_spatial, &mut opos);
            'kernel: for k_flat in 0..kernel_count {
                unravel(k_flat, &self.kernel_spatial, &mut kpos);
                let mut i_flat = 0usize;
                for d in 0..spatial {
                    let pos = opos[d] * self.strides[d] + kpos[d];
                    if pos < self.pad_before[d] {
                        continue 'kernel;
                    }
                    let idx = pos - self.pad_before[d];
                    if idx >= self.in_spatial[d] {
                        continue 'kernel;
                    }
                    i_flat = i_flat * self.in_spatial[d] + idx;
                }
                for b in 0..self.batch {
                    visit(b * out_count + o_flat, b * in_count + i_flat, k_flat);
                }
            }
        }
    }
}

fn unravel(mut flat: usize, shape: &[usize], out: &mut [usize]) {
    for d in (0..shape.len()).rev() {
        out[d] = flat % shape[d];
        flat /= shape[d];
    }
}

/// N-dimensional channels-last convolution (cross-correlation, as in most
/// deep learning frameworks).
pub fn conv_nd(inputs: &ArrayD<f32>, kernel: &ArrayD<f32>, spec: &ConvSpec) -> ExplainResult<ArrayD<f32>> {
    let geo = ConvGeometry::resolve(inputs.shape(), kernel.shape(), spec)?;
    let (cin, cout) = (geo.in_channels, geo.out_channels);
    let xs: Vec<f32> = inputs.iter().copied().collect();
    let ks: Vec<f32> = kernel.iter().copied().collect();
    let out_shape = geo.output_shape();
    let mut out = vec![0.0f32; out_shape.iter().product()];

    geo.for_each_tap(|out_pos, in_pos, k_flat| {
        let in_row = &xs[in_pos * cin..(in_pos + 1) * cin];
        let out_row = &mut out[out_pos * cout..(out_pos + 1) * cout];
        for (ci, &xv) in in_row.iter().enumerate() {
            let k_row = &ks[(k_flat * cin + ci) * cout..(k_flat * cin + ci + 1) * cout];
            for (acc, &kv) in out_row.iter_mut().zip(k_row) {
                *acc += xv * kv;
            }
        }
    });

    Ok(ArrayD::from_shape_vec(IxDyn(&out_shape), out)?)
}

/// Gradient of [`conv_nd`] with respect to its kernel, given the original
/// input and the gradient flowing into the convolution output.
pub fn conv_backprop_filter(
    x: &ArrayD<f32>,
    d_out: &ArrayD<f32>,
    kernel_shape: &[usize],
    spec: &ConvSpec,
) -> ExplainResult<ArrayD<f32>> {
    let geo = ConvGeometry::resolve(x.shape(), kernel_shape, spec)?;
    let expected = geo.output_shape();
    if d_out.shape() != expected.as_slice() {
        return Err(shape_mismatch("conv output gradient", &expected, d_out.shape()));
    }
    let (cin, cout) = (geo.in_channels, geo.out_channels);
    let xs: Vec<f32> = x.iter().copied().collect();
    let gs: Vec<f32> = d_out.iter().copied().collect();
    let filter_shape = geo.kernel_shape();
    let mut grad = vec![0.0f32; filter_shape.iter().product()];

    geo.for_each_tap(|out_pos, in_pos, k_flat| {
        let in_row = &xs[in_pos * cin..(in_pos + 1) * cin];
        let g_row = &gs[out_pos * cout..(out_pos + 1) * cout];
        for (ci, &xv) in in_row.iter().enumerate() {
            let start = (k_flat * cin + ci) * cout;
            for (acc, &gv) in grad[start..start + cout].iter_mut().zip(g_row) {
                *acc += xv * gv;
            }
        }
    });

    Ok(ArrayD::from_shape_vec(IxDyn(&filter_shape), grad)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    #[test]
    fn matmul_matches_ndarray_dot() {
        let a = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let b = array![[1.0f32, 0.5], [-1.0, 2.0], [0.0, 1.0]];
        let out = matmul(&a.clone().into_dyn(), &b.clone().into_dyn()).unwrap();
        assert_eq!(out, a.dot(&b).into_dyn());
    }

    #[test]
    fn tensordot_with_explicit_pairs() {
        let x = Array::from_shape_fn(IxDyn(&[2, 3, 4]), |i| (i[0] * 12 + i[1] * 4 + i[2]) as f32);
        let y = Array::from_shape_fn(IxDyn(&[4, 3]), |i| (i[0] as f32) - (i[1] as f32));
        let out = tensordot(&x, &y, &Axes::Pairs(vec![1, 2], vec![1, 0])).unwrap();
        assert_eq!(out.shape(), &[2]);
        for b in 0..2 {
            let mut expected = 0.0f32;
            for j in 0..3 {
                for k in 0..4 {
                    expected += x[[b, j, k]] * y[[k, j]];
                }
            }
            assert_abs_diff_eq!(out[[b]], expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn tensordot_rejects_mismatched_axes() {
        let x = ArrayD::<f32>::zeros(IxDyn(&[2, 3]));
        let y = ArrayD::<f32>::zeros(IxDyn(&[4, 2]));
        assert!(tensordot(&x, &y, &Axes::Count(1)).is_err());
        assert!(tensordot(&x, &y, &Axes::Count(3)).is_err());
        assert!(tensordot(&x, &y, &Axes::Pairs(vec![0, 0], vec![1, 1])).is_err());
    }

    #[test]
    fn conv1d_valid_matches_manual_sum() {
        // batch=1, width=5, cin=1; kernel width=3, cin=1, cout=1
        let x = array![1.0f32, 2.0, 3.0, 4.0, 5.0]
            .into_shape(IxDyn(&[1, 5, 1]))
            .unwrap();
        let k = array![1.0f32, 0.0, -1.0].into_shape(IxDyn(&[3, 1, 1])).unwrap();
        let out = conv_nd(&x, &k, &ConvSpec::default()).unwrap();
        assert_eq!(out.shape(), &[1, 3, 1]);
        assert_eq!(out.iter().copied().collect::<Vec<_>>(), vec![-2.0, -2.0, -2.0]);
    }

    #[test]
    fn conv_same_padding_keeps_width_and_strides_shrink_it() {
        let x = Array::from_shape_fn(IxDyn(&[2, 6, 6, 2]), |i| (i[1] + i[2] + i[3]) as f32);
        let k = Array::from_elem(IxDyn(&[3, 3, 2, 4]), 1.0f32);
        let same = conv_nd(&x, &k, &ConvSpec::new(vec![1], Padding::Same)).unwrap();
        assert_eq!(same.shape(), &[2, 6, 6, 4]);
        let strided = conv_nd(&x, &k, &ConvSpec::new(vec![2, 3], Padding::Same)).unwrap();
        assert_eq!(strided.shape(), &[2, 3, 2, 4]);
        let valid = conv_nd(&x, &k, &ConvSpec::new(vec![2], Padding::Valid)).unwrap();
        assert_eq!(valid.shape(), &[2, 2, 2, 4]);
    }

    #[test]
    fn conv_rejects_bad_geometry() {
        let x = ArrayD::<f32>::zeros(IxDyn(&[1, 4, 3]));
        let wrong_channels = ArrayD::<f32>::zeros(IxDyn(&[2, 2, 1]));
        assert!(conv_nd(&x, &wrong_channels, &ConvSpec::default()).is_err());
        let too_wide = ArrayD::<f32>::zeros(IxDyn(&[5, 3, 1]));
        assert!(conv_nd(&x, &too_wide, &ConvSpec::default()).is_err());
        let k = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 1]));
        assert!(conv_nd(&x, &k, &ConvSpec::new(vec![0], Padding::Valid)).is_err());
        assert!(conv_nd(&x, &k, &ConvSpec::new(vec![1, 1], Padding::Valid)).is_err());
    }

    #[test]
    fn filter_gradient_matches_finite_difference_structure() {
        // For a linear convolution, d(sum(out * g))/dk equals the filter gradient.
        let x = Array::from_shape_fn(IxDyn(&[2, 5, 2]), |i| (i[0] as f32 + 1.0) * (i[1] as f32 - i[2] as f32));
        let g = Array::from_shape_fn(IxDyn(&[2, 5, 3]), |i| ((i[1] * 3 + i[2]) % 4) as f32 - 1.5);
        let spec = ConvSpec::new(vec![1], Padding::Same);
        let grad = conv_backprop_filter(&x, &g, &[3, 2, 3], &spec).unwrap();
        assert_eq!(grad.shape(), &[3, 2, 3]);

        for flat in 0..grad.len() {
            let mut basis = ArrayD::<f32>::zeros(IxDyn(&[3, 2, 3]));
            basis.as_slice_mut().unwrap()[flat] = 1.0;
            let out = conv_nd(&x, &basis, &spec).unwrap();
            let directional: f32 = (&out * &g).sum();
            assert_abs_diff_eq!(grad.as_slice().unwrap()[flat], directional, epsilon = 1e-3);
        }
    }

    #[test]
    fn filter_gradient_checks_output_shape() {
        let x = ArrayD::<f32>::zeros(IxDyn(&[1, 5, 1]));
        let g = ArrayD::<f32>::zeros(IxDyn(&[1, 4, 1]));
        assert!(conv_backprop_filter(&x, &g, &[3, 1, 1], &ConvSpec::default()).is_err());
    }
}
