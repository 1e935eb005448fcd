//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;

use tracing::warn;

use crate::policy::{PurgeMetric, PurgeMode};

/// Upper bound for `keys_per_batch`.
pub const MAX_KEYS_PER_BATCH: usize = 1000;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Default TTL in milliseconds for entries without explicit TTL (0 = never expires)
    pub default_ttl_ms: u64,
    /// Default stale window in milliseconds (0 = no stale phase)
    pub default_stale_window_ms: u64,
    /// Maximum number of entries, `None` for unbounded
    pub max_size: Option<usize>,
    /// Memory ceiling in megabytes, `None` for no memory-based limits
    pub max_memory_size_mb: Option<f64>,
    /// Delay between sweep cycles in milliseconds
    pub sweep_interval_ms: u64,
    /// Wall-clock budget of one sweep cycle in milliseconds
    pub sweep_time_budget_ms: u64,
    /// Entries processed between two cooperative yields
    pub keys_per_batch: usize,
    /// Expired ratio above which the sweeper speeds up
    pub sweep_expired_ratio: f64,
    /// Purge stale entries when they are read
    pub purge_stale_on_get: Option<PurgeMode>,
    /// Purge stale entries during sweeps
    pub purge_stale_on_sweep: Option<PurgeMode>,
    /// Resource metric for threshold purge modes, derived from limits when unset
    pub purge_resource_metric: Option<PurgeMetric>,
    /// Start the background sweeper together with the cache
    pub auto_start_sweep: bool,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL (default: 300000)
    /// - `CACHE_DEFAULT_STALE_WINDOW_MS` - Default stale window (default: 0)
    /// - `CACHE_MAX_SIZE` - Maximum entries (default: unbounded)
    /// - `CACHE_MAX_MEMORY_MB` - Memory ceiling in MB (default: none)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweep interval (default: 250)
    /// - `CACHE_SWEEP_TIME_BUDGET_MS` - Sweep time budget (default: 30)
    /// - `CACHE_KEYS_PER_BATCH` - Keys per batch (default: 500)
    /// - `CACHE_SWEEP_EXPIRED_RATIO` - Expired ratio target (default: 0.3)
    /// - `CACHE_PURGE_STALE_ON_GET` - `true`, `false` or a fraction
    /// - `CACHE_PURGE_STALE_ON_SWEEP` - `true`, `false` or a fraction
    /// - `CACHE_PURGE_RESOURCE_METRIC` - `size`, `memory`, `higher` or `fixed`
    /// - `CACHE_AUTO_START_SWEEP` - Start the sweeper (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_ttl_ms: parse_env("CACHE_DEFAULT_TTL_MS").unwrap_or(defaults.default_ttl_ms),
            default_stale_window_ms: parse_env("CACHE_DEFAULT_STALE_WINDOW_MS")
                .unwrap_or(defaults.default_stale_window_ms),
            max_size: parse_env("CACHE_MAX_SIZE").or(defaults.max_size),
            max_memory_size_mb: parse_env("CACHE_MAX_MEMORY_MB").or(defaults.max_memory_size_mb),
            sweep_interval_ms: parse_env("CACHE_SWEEP_INTERVAL_MS")
                .unwrap_or(defaults.sweep_interval_ms),
            sweep_time_budget_ms: parse_env("CACHE_SWEEP_TIME_BUDGET_MS")
                .unwrap_or(defaults.sweep_time_budget_ms),
            keys_per_batch: parse_env("CACHE_KEYS_PER_BATCH").unwrap_or(defaults.keys_per_batch),
            sweep_expired_ratio: parse_env("CACHE_SWEEP_EXPIRED_RATIO")
                .unwrap_or(defaults.sweep_expired_ratio),
            purge_stale_on_get: parse_env("CACHE_PURGE_STALE_ON_GET"),
            purge_stale_on_sweep: parse_env("CACHE_PURGE_STALE_ON_SWEEP"),
            purge_resource_metric: parse_env("CACHE_PURGE_RESOURCE_METRIC"),
            auto_start_sweep: parse_env("CACHE_AUTO_START_SWEEP")
                .unwrap_or(defaults.auto_start_sweep),
        }
    }

    // == Normalize ==
    /// Replaces out-of-range tuning values with safe ones, warning about each.
    pub fn normalized(mut self) -> Self {
        if self.keys_per_batch == 0 || self.keys_per_batch > MAX_KEYS_PER_BATCH {
            let clamped = self.keys_per_batch.clamp(1, MAX_KEYS_PER_BATCH);
            warn!(
                "[Cache] keys_per_batch {} out of range, using {}",
                self.keys_per_batch, clamped
            );
            self.keys_per_batch = clamped;
        }

        if !(self.sweep_expired_ratio > 0.0 && self.sweep_expired_ratio <= 1.0) {
            let fallback = Self::default().sweep_expired_ratio;
            warn!(
                "[Cache] sweep_expired_ratio {} must be in (0, 1], using {}",
                self.sweep_expired_ratio, fallback
            );
            self.sweep_expired_ratio = fallback;
        }

        if self.max_size == Some(0) {
            warn!("[Cache] max_size 0 is not a valid limit, treating cache as unbounded");
            self.max_size = None;
        }

        if let Some(mb) = self.max_memory_size_mb {
            if !(mb.is_finite() && mb > 0.0) {
                warn!("[Cache] max_memory_size_mb {} is not a valid limit, ignoring it", mb);
                self.max_memory_size_mb = None;
            }
        }

        self
    }

    /// Memory ceiling in bytes, if configured.
    pub fn max_memory_bytes(&self) -> Option<u64> {
        self.max_memory_size_mb
            .filter(|mb| mb.is_finite() && *mb > 0.0)
            .map(|mb| (mb * 1024.0 * 1024.0) as u64)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5 * 60 * 1000,
            default_stale_window_ms: 0,
            max_size: None,
            max_memory_size_mb: None,
            sweep_interval_ms: 250,
            sweep_time_budget_ms: 30,
            keys_per_batch: 500,
            sweep_expired_ratio: 0.3,
            purge_stale_on_get: None,
            purge_stale_on_sweep: None,
            purge_resource_metric: None,
            auto_start_sweep: true,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
