//! Admission Control
//!
//! Combines configured limits, the resolved purge modes and the latest
//! resource snapshot into the decisions core operations and the sweeper ask
//! for.

use crate::config::CacheConfig;
use crate::models::RejectReason;
use crate::monitor::ResourceMonitor;

use super::metric::{resolve_purge_metric, Limits, PurgeMetric};
use super::purge::{resolve_purge_mode, PurgeMode, PurgeOperation};

/// Share of the discovered process memory limit the cache may plan around.
pub const MEMORY_LIMIT_SHARE: f64 = 0.8;

// == Admission Policy ==
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionPolicy {
    pub limits: Limits,
    pub metric: PurgeMetric,
    pub purge_on_get: PurgeMode,
    pub purge_on_sweep: PurgeMode,
}

impl AdmissionPolicy {
    // == Constructor ==
    /// Resolves the metric and both purge modes from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let limits = Limits::from_config(config);
        let metric = config
            .purge_resource_metric
            .unwrap_or_else(|| resolve_purge_metric(&limits));

        Self {
            limits,
            metric,
            purge_on_get: resolve_purge_mode(
                &limits,
                metric,
                PurgeOperation::OnGet,
                config.purge_stale_on_get,
            ),
            purge_on_sweep: resolve_purge_mode(
                &limits,
                metric,
                PurgeOperation::OnSweep,
                config.purge_stale_on_sweep,
            ),
        }
    }

    // == Memory Ceiling ==
    /// Configured memory ceiling, lowered to 80% of the limit the monitor
    /// discovered when that is smaller.
    pub fn memory_ceiling(&self, monitor: &dyn ResourceMonitor) -> Option<u64> {
        let configured = self.limits.max_memory_bytes?;
        let discovered = monitor
            .memory_limit_bytes()
            .map(|limit| (limit as f64 * MEMORY_LIMIT_SHARE) as u64)
            .filter(|&limit| limit > 0);

        Some(discovered.map_or(configured, |limit| configured.min(limit)))
    }

    // == Usage ==
    /// Usage ratio for the purge metric. Missing metrics count as zero.
    pub fn usage(&self, len: usize, monitor: &dyn ResourceMonitor) -> f64 {
        let size_usage = || match self.limits.max_size {
            Some(max) if max > 0 => len as f64 / max as f64,
            _ => 0.0,
        };
        let memory_usage = || match (monitor.snapshot(), self.memory_ceiling(monitor)) {
            (Some(snapshot), Some(ceiling)) if ceiling > 0 => {
                snapshot.process_memory_bytes as f64 / ceiling as f64
            }
            _ => 0.0,
        };

        match self.metric {
            PurgeMetric::Size => size_usage(),
            PurgeMetric::Memory => memory_usage(),
            PurgeMetric::Higher => size_usage().max(memory_usage()),
            PurgeMetric::Fixed => 0.0,
        }
    }

    pub fn should_purge_on_get(&self, len: usize, monitor: &dyn ResourceMonitor) -> bool {
        self.purge_on_get.is_active(self.usage(len, monitor))
    }

    pub fn should_purge_on_sweep(&self, len: usize, monitor: &dyn ResourceMonitor) -> bool {
        self.purge_on_sweep.is_active(self.usage(len, monitor))
    }

    // == Admission ==
    /// Checks whether a write may proceed. Updates of existing keys are
    /// always admitted; new keys are refused at the entry limit or when
    /// process memory is at or above the ceiling.
    pub fn check_admission(
        &self,
        len: usize,
        key_exists: bool,
        monitor: &dyn ResourceMonitor,
    ) -> Option<RejectReason> {
        if key_exists {
            return None;
        }

        if let Some(limit) = self.limits.max_size.filter(|&n| n > 0) {
            if len >= limit {
                return Some(RejectReason::MaxSize { limit });
            }
        }

        if let (Some(snapshot), Some(ceiling)) = (monitor.snapshot(), self.memory_ceiling(monitor))
        {
            if snapshot.process_memory_bytes >= ceiling {
                return Some(RejectReason::MaxMemory {
                    used_bytes: snapshot.process_memory_bytes,
                    ceiling_bytes: ceiling,
                });
            }
        }

        None
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
