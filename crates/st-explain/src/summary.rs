// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! One-line textual summaries of classifications.
//!
//! A summary lists each term with a nonzero total count, largest count first:
//!
//! ```text
//! PN: 13 = Σ -5.600, PZ: 7 = Σ 0.000, ZN: 1 = Σ 0.000
//! ```
//!
//! All sums in one summary share a decimal scale taken from the largest
//! displayed magnitude so their significant digits line up.

use std::cmp::Ordering;

use ndarray::ArrayD;

use crate::config::config;
use crate::error::{invalid, ExplainResult};
use crate::group::ClassificationGroup;
use crate::order::standardize;
use crate::util::Rows;

/// `numerator / denominator`, or `0.0` when the denominator is exactly zero.
#[inline]
pub fn safe_divide(numerator: f32, denominator: f32) -> f32 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Decimal exponent of the leading digit of `value` (`0` for zero).
pub fn decimal_scale(value: f32) -> i32 {
    if value == 0.0 || !value.is_finite() {
        0
    } else {
        value.abs().log10().floor() as i32
    }
}

/// Fixed-point rendering targeting `significant_digits` digits at `scale`
/// (derived from `value` when absent). Small scales gain fractional digits;
/// large scales lose them down to none.
pub fn format_decimal(value: f32, significant_digits: usize, scale: Option<i32>) -> String {
    let scale = scale.unwrap_or_else(|| decimal_scale(value));
    let digits = significant_digits as i32;
    let precision = if scale < 0 {
        digits - scale + 1
    } else {
        (digits - scale - 1).max(0)
    };
    format!("{value:.prec$}", prec = precision as usize)
}

/// Presentation switches for [`summarise`] and [`describe_groups`].
#[derive(Clone, Debug)]
pub struct SummaryOptions {
    /// Show counts as a percentage of all summarised counts.
    pub show_percentages: bool,
    /// Show per-occurrence means instead of raw sums.
    pub show_means: bool,
    /// Show min..max ranges across positions. Excludes the other two.
    pub show_ranges: bool,
    pub significant_digits: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            show_percentages: false,
            show_means: false,
            show_ranges: false,
            significant_digits: config().significant_digits,
        }
    }
}

impl SummaryOptions {
    pub fn percentages(mut self) -> Self {
        self.show_percentages = true;
        self
    }

    pub fn means(mut self) -> Self {
        self.show_means = true;
        self
    }

    pub fn ranges(mut self) -> Self {
        self.show_ranges = true;
        self
    }

    fn validate(&self) -> ExplainResult<()> {
        if self.show_ranges && (self.show_percentages || self.show_means) {
            return Err(invalid(
                "show_ranges cannot be combined with show_percentages or show_means",
            ));
        }
        Ok(())
    }
}

/// Per-term reduction across every position.
#[derive(Clone, Copy, Debug)]
struct TermTotals {
    term: usize,
    count: f32,
    sum: f32,
    min_count: f32,
    max_count: f32,
    min_sum: f32,
    max_sum: f32,
}

fn reduce_terms(counts: &ArrayD<f32>, sums: &ArrayD<f32>) -> Vec<TermTotals> {
    let count_rows = Rows::from_array(counts);
    let sum_rows = Rows::from_array(sums);
    (0..count_rows.width)
        .map(|term| {
            let column = |rows: &Rows<f32>| -> Vec<f32> {
                (0..rows.positions()).map(|p| rows.row(p)[term]).collect()
            };
            let (c, s) = (column(&count_rows), column(&sum_rows));
            TermTotals {
                term,
                count: c.iter().sum(),
                sum: s.iter().sum(),
                min_count: c.iter().copied().fold(f32::INFINITY, f32::min),
                max_count: c.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                min_sum: s.iter().copied().fold(f32::INFINITY, f32::min),
                max_sum: s.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            }
        })
        .collect()
}

/// Summarises `counts`/`sums` across all positions as a single line.
///
/// `terms` is required after [`crate::filter_classifications`] has reordered
/// the slots. Positions excluded by `mask` contribute zeros. Returns
/// `"<empty>"` when no term has a positive count.
pub fn summarise(
    counts: &ArrayD<f32>,
    sums: &ArrayD<f32>,
    terms: Option<&ArrayD<usize>>,
    mask: Option<&ArrayD<bool>>,
    opts: &SummaryOptions,
) -> ExplainResult<String> {
    opts.validate()?;
    let standard = standardize(counts, sums, terms, mask)?;
    let mode = standard.mode;

    let mut totals = reduce_terms(&standard.counts, &standard.sums);
    totals.sort_by(|a, b| b.count.partial_cmp(&a.count).unwrap_or(Ordering::Equal));

    if opts.show_means {
        for t in &mut totals {
            t.sum = safe_divide(t.sum, t.count);
            t.min_sum = safe_divide(t.min_sum, t.count);
            t.max_sum = safe_divide(t.max_sum, t.count);
        }
    }
    if opts.show_percentages {
        let mut factor: f32 = totals.iter().map(|t| t.count).sum();
        if factor == 0.0 {
            factor = 1.0;
        }
        for t in &mut totals {
            t.count /= factor;
            t.min_count /= factor;
            t.max_count /= factor;
        }
    }
    totals.retain(|t| t.count > 0.0);
    if totals.is_empty() {
        return Ok("<empty>".to_string());
    }

    let format_count = |count: f32, with_symbol: bool| match (opts.show_percentages, with_symbol) {
        (true, true) => format!("{:.1}%", count * 100.0),
        (true, false) => format!("{:.1}", count * 100.0),
        (false, _) => format!("{count}"),
    };
    let symbol = if opts.show_means || opts.show_ranges { "x" } else { "= Σ" };
    let largest = totals
        .iter()
        .map(|t| {
            if opts.show_ranges {
                t.min_sum.abs().max(t.max_sum.abs())
            } else {
                t.sum.abs()
            }
        })
        .fold(0.0f32, f32::max);
    let scale = Some(decimal_scale(largest));
    let digits = opts.significant_digits;

    let parts: Vec<String> = totals
        .iter()
        .map(|t| {
            let label = mode.label(t.term).unwrap_or("--");
            if opts.show_ranges {
                let (lo, hi) = if t.min_sum < t.max_sum && t.max_sum < 0.0 {
                    (t.max_sum, t.min_sum)
                } else {
                    (t.min_sum, t.max_sum)
                };
                format!(
                    "{label}: {}..{} {symbol} {}..{}",
                    format_count(t.min_count, false),
                    format_count(t.max_count, true),
                    format_decimal(lo, digits, scale),
                    format_decimal(hi, digits, scale),
                )
            } else {
                format!(
                    "{label}: {} {symbol} {}",
                    format_count(t.count, true),
                    format_decimal(t.sum, digits, scale),
                )
            }
        })
        .collect();
    Ok(parts.join(", "))
}

/// Per-group sizes and summaries, index-aligned with the input groups.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "report-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupDescriptions {
    pub sizes: Vec<usize>,
    pub summaries: Vec<String>,
}

/// Summarises every group with the same options as [`summarise`].
pub fn describe_groups(
    groups: &[ClassificationGroup],
    opts: &SummaryOptions,
) -> ExplainResult<GroupDescriptions> {
    let mut descriptions = GroupDescriptions::default();
    for group in groups {
        let counts = group.counts.clone().into_dyn();
        let sums = group.sums.clone().into_dyn();
        let terms = group.terms.clone().into_dyn();
        descriptions.sizes.push(group.size());
        descriptions
            .summaries
            .push(summarise(&counts, &sums, Some(&terms), None, opts)?);
    }
    Ok(descriptions)
}
