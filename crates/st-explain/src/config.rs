// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::sync::OnceLock;

const DEFAULT_CONFIDENCE: f32 = 0.95;
const DEFAULT_COMPLETENESS: f32 = 0.75;
const DEFAULT_SIGNIFICANT_DIGITS: usize = 4;

/// Process-wide defaults for the explainer pipeline.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "report-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExplainConfig {
    /// Confidence used when no explicit threshold is supplied.
    pub confidence: f32,
    /// Coverage target used by filtering and group trimming defaults.
    pub completeness: f32,
    /// Significant digits shown by summaries.
    pub significant_digits: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            completeness: DEFAULT_COMPLETENESS,
            significant_digits: DEFAULT_SIGNIFICANT_DIGITS,
        }
    }
}

impl ExplainConfig {
    /// Builds a configuration snapshot from environment variables.
    fn from_env() -> Self {
        let confidence = fraction_from_env("SPIRAL_EXPLAIN_CONFIDENCE").unwrap_or(DEFAULT_CONFIDENCE);
        let completeness =
            fraction_from_env("SPIRAL_EXPLAIN_COMPLETENESS").unwrap_or(DEFAULT_COMPLETENESS);
        let significant_digits = std::env::var("SPIRAL_EXPLAIN_SIGNIFICANT_DIGITS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&digits| digits > 0)
            .unwrap_or(DEFAULT_SIGNIFICANT_DIGITS);

        Self {
            confidence,
            completeness,
            significant_digits,
        }
    }
}

fn fraction_from_env(key: &str) -> Option<f32> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
        .filter(|v| (0.0..=1.0).contains(v))
}

static CONFIG: OnceLock<ExplainConfig> = OnceLock::new();

/// Returns the lazily initialised configuration.
pub fn config() -> &'static ExplainConfig {
    CONFIG.get_or_init(ExplainConfig::from_env)
}

/// Installs `cfg` as the process-wide configuration.
///
/// Fails with the rejected configuration once [`config`] or an earlier
/// `configure` has already fixed it.
pub fn configure(cfg: ExplainConfig) -> Result<&'static ExplainConfig, ExplainConfig> {
    CONFIG.set(cfg)?;
    Ok(config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
    use std::sync::Mutex;

    fn with_env(vars: &[(&str, Option<&str>)], test: impl FnOnce()) {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        let _lock = GUARD.get_or_init(|| Mutex::new(())).lock().unwrap();

        let snapshot: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, value)| {
                let previous = std::env::var(key).ok();
                match value {
                    Some(val) => std::env::set_var(key, val),
                    None => std::env::remove_var(key),
                }
                ((*key).to_string(), previous)
            })
            .collect();

        let result = catch_unwind(AssertUnwindSafe(test));

        for (key, value) in snapshot {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }

        if let Err(err) = result {
            resume_unwind(err);
        }
    }

    #[test]
    fn late_override_is_rejected() {
        let active = config().clone();
        let late = ExplainConfig {
            significant_digits: active.significant_digits + 1,
            ..active.clone()
        };
        let rejected = configure(late.clone()).unwrap_err();
        assert_eq!(rejected, late);
        assert_eq!(config(), &active);
    }

    #[test]
    fn defaults_when_unset() {
        with_env(
            &[
                ("SPIRAL_EXPLAIN_CONFIDENCE", None),
                ("SPIRAL_EXPLAIN_COMPLETENESS", None),
                ("SPIRAL_EXPLAIN_SIGNIFICANT_DIGITS", None),
            ],
            || {
                let cfg = ExplainConfig::from_env();
                assert_eq!(cfg, ExplainConfig::default());
            },
        );
    }

    #[test]
    fn explicit_values_override_defaults() {
        with_env(
            &[
                ("SPIRAL_EXPLAIN_CONFIDENCE", Some("0.9")),
                ("SPIRAL_EXPLAIN_COMPLETENESS", Some(" 0.5 ")),
                ("SPIRAL_EXPLAIN_SIGNIFICANT_DIGITS", Some("6")),
            ],
            || {
                let cfg = ExplainConfig::from_env();
                assert_eq!(cfg.confidence, 0.9);
                assert_eq!(cfg.completeness, 0.5);
                assert_eq!(cfg.significant_digits, 6);
            },
        );
    }

    #[test]
    fn out_of_range_values_fall_back() {
        with_env(
            &[
                ("SPIRAL_EXPLAIN_CONFIDENCE", Some("1.5")),
                ("SPIRAL_EXPLAIN_COMPLETENESS", Some("lots")),
                ("SPIRAL_EXPLAIN_SIGNIFICANT_DIGITS", Some("0")),
            ],
            || {
                let cfg = ExplainConfig::from_env();
                assert_eq!(cfg, ExplainConfig::default());
            },
        );
    }
}
