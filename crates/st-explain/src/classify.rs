// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::{ArrayD, Zip};

use crate::error::ExplainResult;
use crate::threshold::derive_threshold;

/// Sign class of a single element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignClass {
    Positive,
    NearZero,
    Negative,
}

impl SignClass {
    /// Canonical order, matching the single-tensor term table.
    pub const ALL: [SignClass; 3] = [SignClass::Positive, SignClass::NearZero, SignClass::Negative];

    /// Classifies one value. Exact zeros are near-zero even for a zero threshold.
    #[inline]
    pub fn of(value: f32, threshold: f32) -> Self {
        if value == 0.0 || value.abs() < threshold {
            SignClass::NearZero
        } else if value > 0.0 {
            SignClass::Positive
        } else if value < 0.0 {
            SignClass::Negative
        } else {
            // NaN fails every comparison above; it is treated as near-zero.
            SignClass::NearZero
        }
    }
}

/// Disjoint P/Z/N partition of a tensor together with the threshold used.
#[derive(Clone, Debug)]
pub struct SignMasks {
    pub positive: ArrayD<bool>,
    pub near_zero: ArrayD<bool>,
    pub negative: ArrayD<bool>,
    pub threshold: f32,
}

impl SignMasks {
    /// Partitions `x` against an explicit threshold.
    pub fn with_threshold(x: &ArrayD<f32>, threshold: f32) -> Self {
        let near_zero = x.mapv(|v| SignClass::of(v, threshold) == SignClass::NearZero);
        let positive = Zip::from(x)
            .and(&near_zero)
            .map_collect(|&v, &z| v > 0.0 && !z);
        let negative = Zip::from(x)
            .and(&near_zero)
            .map_collect(|&v, &z| v < 0.0 && !z);
        Self {
            positive,
            near_zero,
            negative,
            threshold,
        }
    }

    pub fn mask(&self, class: SignClass) -> &ArrayD<bool> {
        match class {
            SignClass::Positive => &self.positive,
            SignClass::NearZero => &self.near_zero,
            SignClass::Negative => &self.negative,
        }
    }

    /// The class mask cast to `1.0`/`0.0`.
    pub fn indicator(&self, class: SignClass) -> ArrayD<f32> {
        self.mask(class).mapv(|m| if m { 1.0 } else { 0.0 })
    }

    /// `x` where the class mask holds, zero elsewhere.
    pub fn restrict(&self, x: &ArrayD<f32>, class: SignClass) -> ArrayD<f32> {
        Zip::from(x)
            .and(self.mask(class))
            .map_collect(|&v, &m| if m { v } else { 0.0 })
    }
}

/// Derives the threshold for `x` (unless explicit) and partitions it.
pub fn classification_mask(
    x: &ArrayD<f32>,
    confidence: f32,
    threshold: Option<f32>,
) -> ExplainResult<SignMasks> {
    let threshold = derive_threshold(x, confidence, threshold)?;
    Ok(SignMasks::with_threshold(x, threshold))
}
