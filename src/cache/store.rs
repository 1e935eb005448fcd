//! Cache Store Module
//!
//! Main cache engine: the ordered key/entry map, the tag registry, admission
//! control and the resumable sweep cursor.
//!
//! The store never runs callbacks itself. Operations that remove entries
//! hand the removed values back as [`Removal`]s so the caller can notify
//! listeners once the store is no longer borrowed.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::rc::Rc;
use std::time::Instant;

use tracing::debug;

use crate::cache::entry::{CacheEntry, EntryClock};
use crate::cache::listener::DeleteReason;
use crate::cache::stats::CacheStats;
use crate::cache::status::{resolve_status, stale_window_end, EntryStatus};
use crate::cache::tags::TagRegistry;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::models::{InvalidateOptions, SetInput, SetOutcome, SweepReport};
use crate::monitor::{NoopMonitor, ResourceMonitor};
use crate::policy::AdmissionPolicy;

/// Weight of the latest cycle in the running expired ratio.
const EXPIRED_RATIO_SMOOTHING: f64 = 0.25;

// == Removal ==
/// An entry that left the store, waiting to be reported to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal<V> {
    pub key: String,
    pub value: V,
    pub reason: DeleteReason,
}

// == Batch Progress ==
/// Outcome of one sweep batch.
#[derive(Debug)]
pub struct BatchProgress<V> {
    pub processed: usize,
    pub expired: usize,
    pub stale_purged: usize,
    pub exhausted: bool,
    pub over_budget: bool,
    pub removals: Vec<Removal<V>>,
}

impl<V> BatchProgress<V> {
    fn new() -> Self {
        Self {
            processed: 0,
            expired: 0,
            stale_purged: 0,
            exhausted: false,
            over_budget: false,
            removals: Vec::new(),
        }
    }

    /// Folds the counters into a cycle report and returns the removals.
    pub fn merge_into(self, report: &mut SweepReport) -> Vec<Removal<V>> {
        report.processed += self.processed;
        report.expired += self.expired;
        report.stale_purged += self.stale_purged;
        report.batches += 1;
        report.exhausted |= self.exhausted;
        report.over_budget |= self.over_budget;
        self.removals
    }
}

// == Cache Store ==
/// Cache state: entries, tags, resolved policy and sweep cursor.
pub struct CacheStore<V> {
    /// Key-value storage, ordered so the sweep cursor can resume by key
    entries: BTreeMap<String, CacheEntry<V>>,
    /// Tag invalidation clocks
    tags: TagRegistry,
    /// Performance statistics
    stats: CacheStats,
    config: CacheConfig,
    policy: AdmissionPolicy,
    monitor: Rc<dyn ResourceMonitor>,
    /// Last key visited by the sweeper, `None` when idle or reset
    cursor: Option<String>,
    /// Running average of the expired ratio seen by sweeps
    expired_ratio: f64,
}

impl<V> CacheStore<V> {
    // == Constructor ==
    /// Creates a store without resource metrics.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_monitor(config, Rc::new(NoopMonitor))
    }

    /// Creates a store reading resource usage from `monitor`.
    pub fn with_monitor(config: CacheConfig, monitor: Rc<dyn ResourceMonitor>) -> Self {
        let config = config.normalized();
        let policy = AdmissionPolicy::from_config(&config);
        debug!(
            metric = %policy.metric,
            purge_on_get = %policy.purge_on_get,
            purge_on_sweep = %policy.purge_on_sweep,
            "Cache store initialized"
        );

        Self {
            entries: BTreeMap::new(),
            tags: TagRegistry::new(),
            stats: CacheStats::new(),
            config,
            policy,
            monitor,
            cursor: None,
            expired_ratio: 0.0,
        }
    }

    // == Set ==
    /// Stores or replaces an entry.
    ///
    /// The entry is replaced wholesale, tags included. A request without a
    /// value leaves the store untouched. New keys go through admission
    /// control; existing keys are always updated.
    pub fn set(&mut self, input: SetInput<V>, now: u64) -> Result<SetOutcome> {
        if input.key.is_empty() {
            return Err(CacheError::MissingKey);
        }
        if let Some(message) = input.validate() {
            return Err(CacheError::InvalidTag(message));
        }

        let SetInput {
            key,
            value,
            ttl_ms,
            stale_window_ms,
            tags,
        } = input;

        let Some(value) = value else {
            return Ok(SetOutcome::Skipped);
        };

        let exists = self.entries.contains_key(&key);
        if let Some(reason) =
            self.policy
                .check_admission(self.entries.len(), exists, self.monitor.as_ref())
        {
            debug!(key = %key, %reason, "Rejected new cache entry");
            self.stats.record_rejection();
            return Ok(SetOutcome::Rejected(reason));
        }

        let clock = EntryClock::new(
            now,
            ttl_ms.unwrap_or(self.config.default_ttl_ms),
            stale_window_ms.unwrap_or(self.config.default_stale_window_ms),
        );
        let tags = tags.filter(|t| !t.is_empty());

        self.entries.insert(key, CacheEntry::new(clock, value, tags));
        Ok(SetOutcome::Stored)
    }

    // == Get ==
    /// Reads an entry.
    ///
    /// Fresh and stale entries return their value; a stale entry is purged
    /// afterwards when the get purge policy is active. Expired entries are
    /// always removed and read as a miss.
    pub fn get(&mut self, key: &str, now: u64) -> (Option<V>, Option<Removal<V>>)
    where
        V: Clone,
    {
        let Some(status) = self.status(key, now) else {
            self.stats.record_miss();
            return (None, None);
        };

        match status {
            EntryStatus::Fresh => {
                self.stats.record_hit();
                (self.entries.get(key).map(|e| e.value.clone()), None)
            }
            EntryStatus::Stale => {
                self.stats.record_stale_hit();
                if self
                    .policy
                    .should_purge_on_get(self.entries.len(), self.monitor.as_ref())
                {
                    let removal = self.remove(key, DeleteReason::Stale);
                    (removal.as_ref().map(|r| r.value.clone()), removal)
                } else {
                    (self.entries.get(key).map(|e| e.value.clone()), None)
                }
            }
            EntryStatus::Expired => {
                self.stats.record_miss();
                (None, self.remove(key, DeleteReason::Expired))
            }
        }
    }

    // == Remove ==
    /// Removes an entry unconditionally, recording why.
    pub fn remove(&mut self, key: &str, reason: DeleteReason) -> Option<Removal<V>> {
        let (key, entry) = self.entries.remove_entry(key)?;
        self.stats.record_removal(reason);

        Some(Removal {
            key,
            value: entry.value,
            reason,
        })
    }

    // == Has ==
    /// True when the entry exists and is not expired. Never mutates.
    pub fn has(&self, key: &str, now: u64) -> bool {
        self.status(key, now)
            .is_some_and(|status| status != EntryStatus::Expired)
    }

    // == Status ==
    /// Resolves the status of `key` without side effects.
    pub fn status(&self, key: &str, now: u64) -> Option<EntryStatus> {
        self.entries
            .get(key)
            .map(|entry| resolve_status(&entry.clock, entry.tags(), &self.tags, now))
    }

    // == Invalidate Tag ==
    /// Records a tag invalidation. Entries observe it on their next resolve.
    pub fn invalidate_tag(
        &mut self,
        tag: &str,
        options: InvalidateOptions,
        now: u64,
    ) -> Result<()> {
        if tag.is_empty() {
            return Err(CacheError::InvalidTag("empty tag name".to_string()));
        }
        self.tags.invalidate(tag, options.as_stale, now);
        Ok(())
    }

    // == Remaining Stale Window ==
    /// Milliseconds left until the stale window of `key` closes.
    ///
    /// A stale tag marker that holds the entry stale bounds the window as
    /// well. Zero when the key is missing or expired or has no stale window.
    pub fn remaining_stale_window(&self, key: &str, now: u64) -> u64 {
        self.entries
            .get(key)
            .and_then(|entry| stale_window_end(&entry.clock, entry.tags(), &self.tags, now))
            .map_or(0, |end| end.saturating_sub(now))
    }

    // == Sweep Batch ==
    /// Visits up to `limit` entries after the cursor, removing expired ones
    /// and, when `purge_stale` is set, stale ones.
    ///
    /// Stops early once `deadline` has passed or the end of the store is
    /// reached; in the latter case the cursor goes back to the start.
    pub fn sweep_batch(
        &mut self,
        now: u64,
        limit: usize,
        purge_stale: bool,
        deadline: Instant,
    ) -> BatchProgress<V> {
        let mut progress = BatchProgress::new();

        while progress.processed < limit {
            let next = match &self.cursor {
                Some(after) => self
                    .entries
                    .range::<str, _>((Bound::Excluded(after.as_str()), Bound::Unbounded))
                    .next(),
                None => self.entries.iter().next(),
            }
            .map(|(key, entry)| {
                let status = resolve_status(&entry.clock, entry.tags(), &self.tags, now);
                (key.clone(), status)
            });

            let Some((key, status)) = next else {
                self.cursor = None;
                progress.exhausted = true;
                break;
            };

            let reason = match status {
                EntryStatus::Expired => Some(DeleteReason::Expired),
                EntryStatus::Stale if purge_stale => Some(DeleteReason::Stale),
                _ => None,
            };
            if let Some(removal) = reason.and_then(|r| self.remove(&key, r)) {
                match removal.reason {
                    DeleteReason::Stale => progress.stale_purged += 1,
                    _ => progress.expired += 1,
                }
                progress.removals.push(removal);
            }

            self.cursor = Some(key);
            progress.processed += 1;

            if Instant::now() >= deadline {
                progress.over_budget = true;
                break;
            }
        }

        progress
    }

    /// Whether the sweep purge policy is active right now.
    pub fn should_purge_on_sweep(&self) -> bool {
        self.policy
            .should_purge_on_sweep(self.entries.len(), self.monitor.as_ref())
    }

    // == Record Sweep ==
    /// Folds a finished cycle into the statistics and the running expired ratio.
    pub fn record_sweep(&mut self, report: &SweepReport) {
        if report.processed > 0 {
            self.expired_ratio = EXPIRED_RATIO_SMOOTHING * report.expired_ratio()
                + (1.0 - EXPIRED_RATIO_SMOOTHING) * self.expired_ratio;
        }
        self.stats.record_sweep();
    }

    /// Drops the sweep cursor so the next cycle starts from the first key.
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn expired_ratio(&self) -> f64 {
        self.expired_ratio
    }

    // == Accessors ==
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    pub fn monitor(&self) -> &dyn ResourceMonitor {
        self.monitor.as_ref()
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_totals(self.entries.len(), self.tags.len());
        stats
    }

    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys in cursor order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }
}
