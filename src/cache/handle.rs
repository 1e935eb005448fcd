//! Cache Handle
//!
//! The public face of the cache: core operations with listener dispatch,
//! manual sweeps and the background sweeper lifecycle.
//!
//! A `Cache` is single-threaded. It is neither `Send` nor `Sync`, and the
//! background sweeper runs on a [`tokio::task::LocalSet`] chosen by the caller.
//! Hosts with several worker threads keep one cache per thread or serialize
//! access themselves.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tokio::task::{JoinHandle, LocalSet};
use tracing::info;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::listener::{DeleteReason, Listener, Listeners};
use crate::cache::stats::CacheStats;
use crate::cache::status::EntryStatus;
use crate::cache::store::{CacheStore, Removal};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::{InvalidateOptions, SetInput, SetOutcome, SweepReport};
use crate::monitor::{NoopMonitor, ResourceMonitor};
use crate::tasks::{run_cycle, sweep_loop, InstanceId, SweepRegistry, SweepWeight};

// == Cache ==
/// In-process key/value cache with fresh, stale and expired phases.
pub struct Cache<V> {
    store: Rc<RefCell<CacheStore<V>>>,
    listeners: Listeners<V>,
    registry: SweepRegistry,
    id: InstanceId,
    sweeper: RefCell<Option<JoinHandle<()>>>,
}

impl<V: Clone + 'static> Cache<V> {
    /// Creates a cache without callbacks or resource metrics. The sweeper
    /// is not started; see [`Cache::start_sweep`].
    pub fn new(config: CacheConfig) -> Self {
        CacheBuilder::new(config).build()
    }

    pub fn builder(config: CacheConfig) -> CacheBuilder<V> {
        CacheBuilder::new(config)
    }

    fn notify(&self, removal: Option<Removal<V>>) {
        if let Some(removal) = removal {
            self.listeners
                .notify(&removal.key, &removal.value, removal.reason);
        }
    }

    // == Get ==
    /// Returns the value of a fresh or stale entry.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, current_timestamp_ms())
    }

    pub fn get_at(&self, key: &str, now: u64) -> Option<V> {
        let (value, removal) = self.store.borrow_mut().get(key, now);
        self.notify(removal);
        value
    }

    // == Set ==
    /// Stores `value` under `key` with the default ttl and stale window.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<SetOutcome> {
        self.set_with(SetInput::new(key, value))
    }

    /// Stores an entry described by `input`.
    ///
    /// # Errors
    /// `MissingKey` for an empty key, `InvalidTag` for an empty tag name.
    /// Capacity rejections are reported as [`SetOutcome::Rejected`].
    pub fn set_with(&self, input: SetInput<V>) -> Result<SetOutcome> {
        self.set_at(input, current_timestamp_ms())
    }

    pub fn set_at(&self, input: SetInput<V>, now: u64) -> Result<SetOutcome> {
        self.store.borrow_mut().set(input, now)
    }

    // == Delete ==
    /// Removes `key`, returning whether anything was removed.
    pub fn delete(&self, key: &str) -> bool {
        let removal = self.store.borrow_mut().remove(key, DeleteReason::Manual);
        let removed = removal.is_some();
        self.notify(removal);
        removed
    }

    // == Has ==
    /// True when `key` holds a fresh or stale entry.
    pub fn has(&self, key: &str) -> bool {
        self.has_at(key, current_timestamp_ms())
    }

    pub fn has_at(&self, key: &str, now: u64) -> bool {
        self.store.borrow().has(key, now)
    }

    // == Status ==
    pub fn status(&self, key: &str) -> Option<EntryStatus> {
        self.status_at(key, current_timestamp_ms())
    }

    pub fn status_at(&self, key: &str, now: u64) -> Option<EntryStatus> {
        self.store.borrow().status(key, now)
    }

    // == Invalidate Tag ==
    /// Marks every entry carrying `tag`, and created before now, as expired
    /// or stale.
    pub fn invalidate_tag(&self, tag: &str, options: InvalidateOptions) -> Result<()> {
        self.invalidate_tag_at(tag, options, current_timestamp_ms())
    }

    pub fn invalidate_tag_at(&self, tag: &str, options: InvalidateOptions, now: u64) -> Result<()> {
        self.store.borrow_mut().invalidate_tag(tag, options, now)
    }

    // == Remaining Stale Window ==
    /// Milliseconds until the stale window of `key` closes, 0 when unknown
    /// or already expired.
    pub fn remaining_stale_window(&self, key: &str) -> u64 {
        self.remaining_stale_window_at(key, current_timestamp_ms())
    }

    pub fn remaining_stale_window_at(&self, key: &str, now: u64) -> u64 {
        self.store.borrow().remaining_stale_window(key, now)
    }

    // == Manual Sweep ==
    /// Runs a single sweep cycle now.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(current_timestamp_ms()).await
    }

    /// Runs a single sweep cycle as of `now`.
    pub async fn sweep_at(&self, now: u64) -> SweepReport {
        let report = run_cycle(&self.store, &self.listeners, now).await;
        self.update_weight();
        report
    }

    fn update_weight(&self) {
        let weight = {
            let store = self.store.borrow();
            SweepWeight::new(store.len(), store.expired_ratio())
        };
        self.registry.update(self.id, weight);
    }

    // == Sweeper Lifecycle ==
    /// Starts the background sweeper on `local`. Does nothing when it
    /// already runs.
    ///
    /// The sweeper makes progress while `local` is being driven, e.g. by
    /// [`LocalSet::run_until`] or [`LocalSet::block_on`].
    pub fn start_sweep(&self, local: &LocalSet) {
        if self.is_sweeping() {
            return;
        }

        let handle = local.spawn_local(sweep_loop(
            Rc::downgrade(&self.store),
            self.listeners.clone(),
            self.registry.clone(),
            self.id,
        ));
        *self.sweeper.borrow_mut() = Some(handle);
    }

    /// Stops the background sweeper. No pending cycle survives this call.
    pub fn stop_sweep(&self) {
        if let Some(handle) = self.sweeper.borrow_mut().take() {
            handle.abort();
            info!(instance = %self.id, "Sweeper stopped");
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .borrow()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // == Accessors ==
    pub fn stats(&self) -> CacheStats {
        self.store.borrow().stats()
    }

    pub fn len(&self) -> usize {
        self.store.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.borrow().is_empty()
    }

    /// The normalized configuration in effect.
    pub fn config(&self) -> CacheConfig {
        self.store.borrow().config().clone()
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Last key visited by the sweeper, `None` between full passes.
    pub fn sweep_cursor(&self) -> Option<String> {
        self.store.borrow().cursor().map(str::to_string)
    }

    /// Restarts the next sweep from the first key.
    pub fn reset_sweep_cursor(&self) {
        self.store.borrow_mut().reset_cursor();
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
        self.registry.unregister(self.id);
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("id", &self.id)
            .field("len", &self.store.borrow().len())
            .field("listeners", &self.listeners)
            .field("sweeping", &self.sweeper.borrow().is_some())
            .finish_non_exhaustive()
    }
}

// == Cache Builder ==
/// Builder for a [`Cache`] with callbacks, a resource monitor or a
/// dedicated sweep registry.
pub struct CacheBuilder<V> {
    config: CacheConfig,
    listeners: Listeners<V>,
    monitor: Option<Rc<dyn ResourceMonitor>>,
    registry: Option<SweepRegistry>,
}

impl<V: Clone + 'static> CacheBuilder<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            listeners: Listeners::default(),
            monitor: None,
            registry: None,
        }
    }

    /// Called for every removal, with the reason.
    pub fn on_delete<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str, &V, DeleteReason) + 'static,
    {
        let listener: Listener<V> = Rc::new(listener);
        self.listeners.on_delete = Some(listener);
        self
    }

    /// Called for every removal that was not an explicit delete.
    pub fn on_expire<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str, &V, DeleteReason) + 'static,
    {
        let listener: Listener<V> = Rc::new(listener);
        self.listeners.on_expire = Some(listener);
        self
    }

    /// Source of resource metrics for memory admission and pressure.
    pub fn monitor(mut self, monitor: Rc<dyn ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Registry to coordinate sweep fairness in, instead of the thread's
    /// shared one.
    pub fn registry(mut self, registry: SweepRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the cache without starting the sweeper.
    pub fn build(self) -> Cache<V> {
        let monitor = self.monitor.unwrap_or_else(|| Rc::new(NoopMonitor));
        let registry = self.registry.unwrap_or_else(SweepRegistry::local);
        let id = registry.register();

        Cache {
            store: Rc::new(RefCell::new(CacheStore::with_monitor(self.config, monitor))),
            listeners: self.listeners,
            registry,
            id,
            sweeper: RefCell::new(None),
        }
    }

    /// Builds the cache and starts the sweeper on `local` unless
    /// `auto_start_sweep` is off.
    pub fn start(self, local: &LocalSet) -> Cache<V> {
        let auto_start = self.config.auto_start_sweep;
        let cache = self.build();
        if auto_start {
            cache.start_sweep(local);
        }
        cache
    }
}

impl<V> fmt::Debug for CacheBuilder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("config", &self.config)
            .field("listeners", &self.listeners)
            .field("has_monitor", &self.monitor.is_some())
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const T0: u64 = 1_000_000;

    fn cache() -> Cache<String> {
        Cache::builder(CacheConfig::default())
            .registry(SweepRegistry::new())
            .build()
    }

    #[test]
    fn test_set_get_delete() {
        let cache = cache();
        assert!(cache.set("k", "v".to_string()).unwrap().is_stored());
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert!(cache.has("k"));

        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_listeners_fire_after_store_borrow() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let deletes = Rc::clone(&log);
        let expires = Rc::clone(&log);

        let cache: Cache<String> = Cache::builder(CacheConfig::default())
            .registry(SweepRegistry::new())
            .on_delete(move |key, _, reason| {
                deletes.borrow_mut().push(format!("delete {} {}", key, reason))
            })
            .on_expire(move |key, _, reason| {
                expires.borrow_mut().push(format!("expire {} {}", key, reason))
            })
            .build();

        cache.set_at(SetInput::new("a", "1".to_string()), T0).unwrap();
        cache.set_at(SetInput::new("b", "2".to_string()).ttl(10), T0).unwrap();

        cache.delete("a");
        assert!(cache.get_at("b", T0 + 20).is_none());

        assert_eq!(
            *log.borrow(),
            vec!["delete a manual", "delete b expired", "expire b expired"]
        );
    }

    #[test]
    fn test_listener_may_reenter_cache() {
        let cache = Rc::new(RefCell::new(None::<Rc<Cache<String>>>));
        let slot = Rc::clone(&cache);

        let built = Rc::new(
            Cache::builder(CacheConfig::default())
                .registry(SweepRegistry::new())
                .on_delete(move |_, _, _| {
                    if let Some(cache) = slot.borrow().as_ref() {
                        // The store is not borrowed while listeners run
                        assert_eq!(cache.len(), 0);
                    }
                })
                .build(),
        );
        *cache.borrow_mut() = Some(Rc::clone(&built));

        built.set("k", "v".to_string()).unwrap();
        assert!(built.delete("k"));
        cache.borrow_mut().take();
    }

    #[test]
    fn test_manual_sweep_updates_registry_weight() {
        let registry = SweepRegistry::new();
        let cache: Cache<String> = Cache::builder(CacheConfig::default())
            .registry(registry.clone())
            .build();
        for i in 0..3 {
            cache.set_at(SetInput::new(format!("k{}", i), "v".to_string()), T0).unwrap();
        }

        let report = tokio_test::block_on(cache.sweep_at(T0));
        assert_eq!(report.processed, 3);
        assert_eq!(registry.weight(cache.id()), Some(SweepWeight::new(3, 0.0)));
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = SweepRegistry::new();
        let cache: Cache<String> = Cache::builder(CacheConfig::default())
            .registry(registry.clone())
            .build();
        assert_eq!(registry.len(), 1);

        drop(cache);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_start_sweep_outside_local_context() {
        let local = LocalSet::new();
        let cache: Cache<String> = Cache::builder(CacheConfig {
            sweep_interval_ms: 10,
            ..CacheConfig::default()
        })
        .registry(SweepRegistry::new())
        .start(&local);
        assert!(cache.is_sweeping());

        // Starting again keeps the running sweeper
        cache.start_sweep(&local);
        assert!(cache.is_sweeping());

        cache
            .set_with(SetInput::new("short", "v".to_string()).ttl(1))
            .unwrap();
        local.run_until(tokio::time::sleep(Duration::from_millis(100))).await;
        assert!(cache.is_empty());
        assert!(cache.stats().sweeps > 0);
    }

    #[test]
    fn test_builder_respects_auto_start_off() {
        let local = LocalSet::new();
        let cache: Cache<String> = Cache::builder(CacheConfig {
            auto_start_sweep: false,
            ..CacheConfig::default()
        })
        .registry(SweepRegistry::new())
        .start(&local);
        assert!(!cache.is_sweeping());
    }

    #[tokio::test]
    async fn test_start_and_stop_sweep() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let cache: Cache<String> = Cache::builder(CacheConfig {
                    sweep_interval_ms: 10,
                    ..CacheConfig::default()
                })
                .registry(SweepRegistry::new())
                .start(&local);
                assert!(cache.is_sweeping());

                cache
                    .set_with(SetInput::new("short", "v".to_string()).ttl(1))
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert!(cache.is_empty());

                cache.stop_sweep();
                assert!(!cache.is_sweeping());
                let sweeps = cache.stats().sweeps;
                tokio::time::sleep(Duration::from_millis(50)).await;
                assert_eq!(cache.stats().sweeps, sweeps);
            })
            .await;
    }
}
