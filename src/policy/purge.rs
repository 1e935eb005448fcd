//! Purge Mode Resolver
//!
//! Validates user-supplied purge modes and falls back to configuration
//! defaults, warning instead of failing.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use super::metric::{Limits, PurgeMetric};

/// Threshold used for `purge_stale_on_get` when limits exist.
pub const DEFAULT_PURGE_STALE_ON_GET_THRESHOLD: f64 = 0.80;
/// Threshold used for `purge_stale_on_sweep` when limits exist.
pub const DEFAULT_PURGE_STALE_ON_SWEEP_THRESHOLD: f64 = 0.50;

// == Purge Mode ==
/// Boolean or threshold policy for removing stale entries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PurgeMode {
    /// Always (`true`) or never (`false`) purge
    Fixed(bool),
    /// Purge once resource usage reaches this fraction of its limit
    Threshold(f64),
}

impl PurgeMode {
    /// Whether the policy fires at the given usage ratio.
    pub fn is_active(&self, usage: f64) -> bool {
        match *self {
            PurgeMode::Fixed(enabled) => enabled,
            PurgeMode::Threshold(threshold) => usage >= threshold,
        }
    }
}

impl From<bool> for PurgeMode {
    fn from(enabled: bool) -> Self {
        PurgeMode::Fixed(enabled)
    }
}

impl fmt::Display for PurgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurgeMode::Fixed(enabled) => write!(f, "{}", enabled),
            PurgeMode::Threshold(t) => write!(f, "threshold {:.0}%", t * 100.0),
        }
    }
}

impl FromStr for PurgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "true" => Ok(PurgeMode::Fixed(true)),
            "false" => Ok(PurgeMode::Fixed(false)),
            other => other
                .parse::<f64>()
                .map(PurgeMode::Threshold)
                .map_err(|_| format!("invalid purge mode '{}'", other)),
        }
    }
}

// == Purge Operation ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOperation {
    OnGet,
    OnSweep,
}

impl PurgeOperation {
    /// Default used when the required limits are configured.
    pub fn default_with_limits(&self) -> PurgeMode {
        match self {
            PurgeOperation::OnGet => PurgeMode::Threshold(DEFAULT_PURGE_STALE_ON_GET_THRESHOLD),
            PurgeOperation::OnSweep => {
                PurgeMode::Threshold(DEFAULT_PURGE_STALE_ON_SWEEP_THRESHOLD)
            }
        }
    }

    /// Default used when they are not.
    pub fn default_without_limits(&self) -> PurgeMode {
        match self {
            PurgeOperation::OnGet => PurgeMode::Fixed(false),
            // Without limits the sweeper is the only thing bounding growth
            PurgeOperation::OnSweep => PurgeMode::Fixed(true),
        }
    }
}

impl fmt::Display for PurgeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurgeOperation::OnGet => f.write_str("purge_stale_on_get"),
            PurgeOperation::OnSweep => f.write_str("purge_stale_on_sweep"),
        }
    }
}

// == Resolve ==
/// Resolves the effective purge mode for one operation.
///
/// Booleans are always accepted. A threshold must satisfy `0 < t <= 1`,
/// must not be paired with [`PurgeMetric::Fixed`], and needs the limits
/// its metric measures against; otherwise a warning is logged and the
/// configuration default is returned.
pub fn resolve_purge_mode(
    limits: &Limits,
    metric: PurgeMetric,
    operation: PurgeOperation,
    user_value: Option<PurgeMode>,
) -> PurgeMode {
    let has_required_limits = metric.has_required_limits(limits);
    let fallback = if has_required_limits {
        operation.default_with_limits()
    } else {
        operation.default_without_limits()
    };

    let Some(mode) = user_value else {
        return fallback;
    };
    let PurgeMode::Threshold(threshold) = mode else {
        return mode;
    };

    let problem = if !(threshold > 0.0 && threshold <= 1.0) {
        Some("Numeric threshold must be between 0 (exclusive) and 1 (inclusive).".to_string())
    } else if metric == PurgeMetric::Fixed {
        Some("Numeric thresholds don't work with purge_resource_metric 'fixed'.".to_string())
    } else if !has_required_limits {
        Some(metric.requirement().to_string())
    } else {
        None
    };

    match problem {
        Some(reason) => {
            warn!(
                "[Cache] {}: Set to {} with purge_resource_metric '{}'. Invalid: {} \
                 Fallback: {} = {}",
                operation, mode, metric, reason, operation, fallback
            );
            fallback
        }
        None => mode,
    }
}
