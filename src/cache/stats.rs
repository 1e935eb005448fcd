//! Cache Statistics Module
//!
//! Tracks cache activity: reads, removals by reason, rejections and sweeps.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::listener::DeleteReason;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Reads served from a fresh entry
    pub hits: u64,
    /// Reads served from a stale entry
    pub stale_hits: u64,
    /// Reads that found nothing or an expired entry
    pub misses: u64,
    /// Entries removed because they expired
    pub expired: u64,
    /// Stale entries removed by a purge policy
    pub stale_purged: u64,
    /// Entries removed by an explicit delete
    pub deletes: u64,
    /// New keys refused by admission control
    pub rejected: u64,
    /// Completed sweep cycles
    pub sweeps: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Number of tags ever invalidated
    pub total_tags: usize,
    /// Wall-clock time the last sweep cycle finished
    pub last_sweep_at: Option<DateTime<Utc>>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate, counting stale hits as hits.
    ///
    /// Returns 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_hits;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_stale_hit(&mut self) {
        self.stale_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_rejection(&mut self) {
        self.rejected += 1;
    }

    // == Record Removal ==
    pub fn record_removal(&mut self, reason: DeleteReason) {
        match reason {
            DeleteReason::Manual => self.deletes += 1,
            DeleteReason::Expired => self.expired += 1,
            DeleteReason::Stale => self.stale_purged += 1,
        }
    }

    // == Record Sweep ==
    /// Counts a finished sweep cycle. Removals are counted as they happen.
    pub fn record_sweep(&mut self) {
        self.sweeps += 1;
        self.last_sweep_at = Some(Utc::now());
    }

    // == Update Counts ==
    pub fn set_totals(&mut self, entries: usize, tags: usize) {
        self.total_entries = entries;
        self.total_tags = tags;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.total_entries, 0);
        assert!(stats.last_sweep_at.is_none());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_stale_hits() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_stale_hit();
        stats.record_miss();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_record_removal_by_reason() {
        let mut stats = CacheStats::new();
        stats.record_removal(DeleteReason::Manual);
        stats.record_removal(DeleteReason::Expired);
        stats.record_removal(DeleteReason::Expired);
        stats.record_removal(DeleteReason::Stale);

        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.expired, 2);
        assert_eq!(stats.stale_purged, 1);
    }

    #[test]
    fn test_record_sweep_sets_timestamp() {
        let mut stats = CacheStats::new();
        stats.record_sweep();
        assert_eq!(stats.sweeps, 1);
        assert!(stats.last_sweep_at.is_some());
    }

    #[test]
    fn test_stats_serialize() {
        let mut stats = CacheStats::new();
        stats.set_totals(3, 1);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total_entries"], 3);
        assert_eq!(json["total_tags"], 1);
    }
}
