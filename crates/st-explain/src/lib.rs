// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Sign-class explanations for matmul-like tensor operations.
//!
//! Every element of both operands is classified as positive, near-zero or
//! negative against a magnitude threshold. The operation is then re-run once
//! per pair of classes, yielding per-output-position `counts` and `sums` over
//! the nine terms `PP, PZ, PN, ZP, ZZ, ZN, NP, NZ, NN` whose sums add back to
//! the plain result. The rest of the crate shrinks that breakdown into
//! something readable: per-position coverage filtering, grouping of positions
//! with the same surviving terms, and one-line summaries.
//!
//! ```
//! use ndarray::array;
//! use st_explain::{matmul_classify, summarise, ClassifyOptions, SummaryOptions};
//!
//! let x = array![[5.0f32]].into_dyn();
//! let y = array![[-5.0f32]].into_dyn();
//! let classified = matmul_classify(&x, &y, &ClassifyOptions::with_confidence(1.0)).unwrap();
//! let opts = SummaryOptions { significant_digits: 4, ..SummaryOptions::default() };
//! let text = summarise(&classified.counts, &classified.sums, None, None, &opts).unwrap();
//! assert_eq!(text, "PN: 1 = Σ -25.00");
//! ```

pub mod classify;
pub mod combine;
pub mod config;
pub mod error;
pub mod filter;
pub mod group;
pub mod ops;
pub mod order;
pub mod summary;
pub mod telemetry;
pub mod terms;
pub mod threshold;
mod util;

pub use classify::{classification_mask, SignClass, SignMasks};
pub use combine::{
    combine, conv_backprop_filter_classify, conv_classify, matmul_classify, multiply_classify,
    tensor_classify, tensordot_classify, Classification, ClassifyOptions, PairOp,
};
pub use config::{config, configure, ExplainConfig};
pub use error::{ExplainError, ExplainResult};
pub use filter::{filter_classifications, filter_classifications_default, Filtered};
pub use group::{filter_groups, group_classifications, ClassificationGroup, GroupSelection};
pub use ops::{Axes, ConvSpec, Padding};
pub use order::{fix_order, fix_order_lanes, standardize, Standardized};
pub use summary::{
    describe_groups, format_decimal, safe_divide, summarise, GroupDescriptions, SummaryOptions,
};
pub use telemetry::{init_tracing, InitError};
pub use terms::{classify_terms, labels_for, terms_grid, TermMode, PAIRWISE_TERMS, SINGLE_TERMS};
pub use threshold::{derive_threshold, percentile_midpoint, Thresholds};
