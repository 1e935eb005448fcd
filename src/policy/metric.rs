//! Purge Resource Metric
//!
//! Selects the resource a numeric purge threshold is measured against.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::CacheConfig;

// == Limits ==
/// Capacity limits taken from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    pub max_size: Option<usize>,
    pub max_memory_bytes: Option<u64>,
}

impl Limits {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_size: config.max_size,
            max_memory_bytes: config.max_memory_bytes(),
        }
    }

    pub fn has_size_limit(&self) -> bool {
        self.max_size.is_some_and(|n| n > 0)
    }

    pub fn has_memory_limit(&self) -> bool {
        self.max_memory_bytes.is_some_and(|n| n > 0)
    }
}

// == Purge Metric ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeMetric {
    /// Entry count against `max_size`
    Size,
    /// Process memory against the memory ceiling
    Memory,
    /// Whichever of size and memory is closer to its limit
    Higher,
    /// No limits; thresholds are unsupported
    Fixed,
}

impl PurgeMetric {
    /// Whether the limits this metric measures against are configured.
    pub fn has_required_limits(&self, limits: &Limits) -> bool {
        match self {
            PurgeMetric::Fixed => false,
            PurgeMetric::Size => limits.has_size_limit(),
            PurgeMetric::Memory => limits.has_memory_limit(),
            PurgeMetric::Higher => limits.has_size_limit() && limits.has_memory_limit(),
        }
    }

    /// Human-readable requirement, used in diagnostics.
    pub fn requirement(&self) -> &'static str {
        match self {
            PurgeMetric::Fixed => "Numeric thresholds are not supported (metric is 'fixed')",
            PurgeMetric::Size => "'max_size' must be a valid positive number",
            PurgeMetric::Memory => "'max_memory_size_mb' must be a valid positive number",
            PurgeMetric::Higher => {
                "both 'max_size' and 'max_memory_size_mb' must be valid positive numbers"
            }
        }
    }
}

impl fmt::Display for PurgeMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PurgeMetric::Size => "size",
            PurgeMetric::Memory => "memory",
            PurgeMetric::Higher => "higher",
            PurgeMetric::Fixed => "fixed",
        };
        f.write_str(name)
    }
}

impl FromStr for PurgeMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "size" => Ok(PurgeMetric::Size),
            "memory" => Ok(PurgeMetric::Memory),
            "higher" => Ok(PurgeMetric::Higher),
            "fixed" => Ok(PurgeMetric::Fixed),
            other => Err(format!("unknown purge resource metric '{}'", other)),
        }
    }
}

/// Derives the metric from which limits are configured.
pub fn resolve_purge_metric(limits: &Limits) -> PurgeMetric {
    match (limits.has_size_limit(), limits.has_memory_limit()) {
        (true, true) => PurgeMetric::Higher,
        (false, true) => PurgeMetric::Memory,
        (true, false) => PurgeMetric::Size,
        (false, false) => PurgeMetric::Fixed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_size: Option<usize>, max_memory_bytes: Option<u64>) -> Limits {
        Limits {
            max_size,
            max_memory_bytes,
        }
    }

    #[test]
    fn test_resolve_metric_from_limits() {
        assert_eq!(resolve_purge_metric(&limits(Some(10), Some(1024))), PurgeMetric::Higher);
        assert_eq!(resolve_purge_metric(&limits(None, Some(1024))), PurgeMetric::Memory);
        assert_eq!(resolve_purge_metric(&limits(Some(10), None)), PurgeMetric::Size);
        assert_eq!(resolve_purge_metric(&limits(None, None)), PurgeMetric::Fixed);
    }

    #[test]
    fn test_zero_limits_do_not_count() {
        assert_eq!(resolve_purge_metric(&limits(Some(0), Some(0))), PurgeMetric::Fixed);
    }

    #[test]
    fn test_required_limits() {
        let size_only = limits(Some(10), None);
        assert!(PurgeMetric::Size.has_required_limits(&size_only));
        assert!(!PurgeMetric::Memory.has_required_limits(&size_only));
        assert!(!PurgeMetric::Higher.has_required_limits(&size_only));
        assert!(!PurgeMetric::Fixed.has_required_limits(&limits(Some(1), Some(1))));
    }

    #[test]
    fn test_metric_parse_and_display() {
        assert_eq!("Higher".parse::<PurgeMetric>(), Ok(PurgeMetric::Higher));
        assert!("lru".parse::<PurgeMetric>().is_err());
        assert_eq!(PurgeMetric::Memory.to_string(), "memory");
    }
}
