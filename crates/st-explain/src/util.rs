// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::{ArrayD, IxDyn};

use crate::error::{shape_mismatch, ExplainResult};

/// Row-major view of a `value_shape + (T,)` array as `positions x T`.
pub(crate) struct Rows<T> {
    pub value_shape: Vec<usize>,
    pub width: usize,
    pub data: Vec<T>,
}

impl<T: Copy> Rows<T> {
    pub fn from_array(arr: &ArrayD<T>) -> Self {
        let shape = arr.shape();
        let (value_shape, width) = match shape.split_last() {
            Some((&width, rest)) => (rest.to_vec(), width),
            None => (Vec::new(), 1),
        };
        Self {
            value_shape,
            width,
            data: arr.iter().copied().collect(),
        }
    }

    pub fn positions(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    pub fn row(&self, position: usize) -> &[T] {
        &self.data[position * self.width..(position + 1) * self.width]
    }

    pub fn into_array(self) -> ExplainResult<ArrayD<T>> {
        let mut shape = self.value_shape;
        shape.push(self.width);
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), self.data)?)
    }
}

pub(crate) fn check_same_shape(label: &'static str, expected: &[usize], got: &[usize]) -> ExplainResult<()> {
    if expected == got {
        Ok(())
    } else {
        Err(shape_mismatch(label, expected, got))
    }
}

/// Validates an optional position mask against the value shape of a
/// `value_shape + (T,)` array.
pub(crate) fn check_mask(mask: Option<&ArrayD<bool>>, shape: &[usize]) -> ExplainResult<()> {
    match mask {
        Some(mask) => {
            let value_shape = &shape[..shape.len().saturating_sub(1)];
            check_same_shape("position mask", value_shape, mask.shape())
        }
        None => Ok(()),
    }
}
