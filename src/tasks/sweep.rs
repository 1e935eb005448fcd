//! Sweep Task
//!
//! Background reclamation of expired and stale entries. A cycle walks the
//! store from the saved cursor in batches, yielding to the runtime between
//! batches, and stops when its time budget runs out or the store has been
//! covered. The loop then sleeps for an interval adapted to resource
//! pressure, churn and the instance's weight among its peers.

use std::cell::RefCell;
use std::rc::Weak;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::cache::{current_timestamp_ms, CacheStore, Listeners};
use crate::config::CacheConfig;
use crate::models::SweepReport;

use super::registry::{InstanceId, SweepRegistry, SweepWeight};

/// Interval the sweeper converges to under full resource pressure.
pub const WORST_SWEEP_INTERVAL_MS: u64 = 300;

// == Run Cycle ==
/// Runs one sweep cycle against `store` as of `now`.
///
/// Listeners are notified after each batch, once the store borrow has been
/// released, so they may use the cache themselves.
pub(crate) async fn run_cycle<V>(
    store: &RefCell<CacheStore<V>>,
    listeners: &Listeners<V>,
    now: u64,
) -> SweepReport {
    let started = Instant::now();
    let (budget, batch, purge_stale) = {
        let store = store.borrow();
        (
            Duration::from_millis(store.config().sweep_time_budget_ms),
            store.config().keys_per_batch,
            store.should_purge_on_sweep(),
        )
    };
    let deadline = started + budget;
    let mut report = SweepReport::default();

    loop {
        let progress = store
            .borrow_mut()
            .sweep_batch(now, batch, purge_stale, deadline);
        let removals = progress.merge_into(&mut report);

        if !listeners.is_empty() {
            for removal in &removals {
                listeners.notify(&removal.key, &removal.value, removal.reason);
            }
        }

        if report.exhausted || report.over_budget {
            break;
        }
        tokio::task::yield_now().await;
    }

    store.borrow_mut().record_sweep(&report);

    if report.removed() > 0 {
        info!(
            expired = report.expired,
            stale_purged = report.stale_purged,
            processed = report.processed,
            "Sweep removed entries"
        );
    } else {
        debug!(
            processed = report.processed,
            batches = report.batches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sweep found nothing to remove"
        );
    }

    report
}

// == Next Interval ==
/// Delay before the next cycle.
///
/// # Arguments
/// * `config` - Supplies the base interval and the churn threshold
/// * `fairness` - Interval factor from the sweep registry
/// * `pressure` - Combined resource pressure, `None` without metrics
/// * `expired_ratio` - Smoothed expired ratio of recent cycles
pub fn next_interval(
    config: &CacheConfig,
    fairness: f64,
    pressure: Option<f64>,
    expired_ratio: f64,
) -> Duration {
    let base = config.sweep_interval_ms as f64;

    let mut interval = match pressure {
        Some(pressure) => interpolate(
            base,
            base.min(WORST_SWEEP_INTERVAL_MS as f64),
            pressure.clamp(0.0, 1.0),
        ),
        None => base,
    };

    if fairness.is_finite() && fairness > 0.0 {
        interval *= fairness;
    }

    if expired_ratio >= config.sweep_expired_ratio {
        interval /= 2.0;
    }

    Duration::from_millis(interval.max(1.0) as u64)
}

fn interpolate(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

// == Sweep Loop ==
/// Sweeps `store` forever, one cycle per interval.
///
/// Only a weak reference is held between cycles, so the loop ends by itself
/// once the owning cache is gone.
pub(crate) async fn sweep_loop<V>(
    store: Weak<RefCell<CacheStore<V>>>,
    listeners: Listeners<V>,
    registry: SweepRegistry,
    id: InstanceId,
) {
    info!(instance = %id, "Sweeper started");

    loop {
        let interval = {
            let Some(store) = store.upgrade() else { break };
            let store = store.borrow();
            let monitor = store.monitor();
            let pressure = monitor
                .snapshot()
                .map(|s| s.pressure(store.policy().memory_ceiling(monitor)));

            next_interval(
                store.config(),
                registry.interval_factor(id),
                pressure,
                store.expired_ratio(),
            )
        };

        tokio::time::sleep(interval).await;

        let Some(strong) = store.upgrade() else { break };
        let report = run_cycle(&strong, &listeners, current_timestamp_ms()).await;
        let weight = {
            let store = strong.borrow();
            SweepWeight::new(store.len(), store.expired_ratio())
        };
        registry.update(id, weight);

        debug!(
            instance = %id,
            processed = report.processed,
            weight = weight.value(),
            "Sweep cycle finished"
        );
    }

    info!(instance = %id, "Sweeper stopped, cache dropped");
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DeleteReason;
    use crate::models::SetInput;
    use crate::monitor::{ManualMonitor, ResourceSnapshot};
    use std::cell::Cell;
    use std::rc::Rc;

    const T0: u64 = 1_000_000;

    fn filled_store(config: CacheConfig, count: usize, ttl: u64) -> RefCell<CacheStore<String>> {
        let mut store = CacheStore::new(config);
        for i in 0..count {
            store
                .set(SetInput::new(format!("key{:04}", i), "v".to_string()).ttl(ttl), T0)
                .unwrap();
        }
        RefCell::new(store)
    }

    fn config() -> CacheConfig {
        CacheConfig {
            sweep_time_budget_ms: 10_000,
            keys_per_batch: 10,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn test_cycle_removes_all_expired_in_batches() {
        let store = filled_store(config(), 35, 100);
        let listeners = Listeners::default();

        let report = tokio_test::block_on(run_cycle(&store, &listeners, T0 + 200));

        assert_eq!(report.processed, 35);
        assert_eq!(report.expired, 35);
        assert_eq!(report.batches, 4);
        assert!(report.exhausted);
        assert!(!report.over_budget);
        assert!(store.borrow().is_empty());
        assert_eq!(store.borrow().stats().sweeps, 1);
    }

    #[test]
    fn test_cycle_keeps_fresh_entries() {
        let store = filled_store(config(), 20, 10_000);
        let listeners = Listeners::default();

        for _ in 0..3 {
            let report = tokio_test::block_on(run_cycle(&store, &listeners, T0 + 200));
            assert_eq!(report.processed, 20);
            assert_eq!(report.removed(), 0);
        }
        assert_eq!(store.borrow().len(), 20);
    }

    #[test]
    fn test_cycle_over_budget_resumes_next_time() {
        let store = filled_store(
            CacheConfig {
                sweep_time_budget_ms: 0,
                ..config()
            },
            5,
            100,
        );
        let listeners = Listeners::default();

        let first = tokio_test::block_on(run_cycle(&store, &listeners, T0 + 200));
        assert!(first.over_budget);
        assert_eq!(first.processed, 1);
        assert_eq!(store.borrow().len(), 4);

        let mut total = first.processed;
        for _ in 0..10 {
            total += tokio_test::block_on(run_cycle(&store, &listeners, T0 + 200)).processed;
        }
        assert_eq!(total, 5);
        assert!(store.borrow().is_empty());
    }

    #[test]
    fn test_cycle_notifies_listeners() {
        let store = filled_store(config(), 3, 100);
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        let listeners = Listeners {
            on_delete: None,
            on_expire: Some(Rc::new(move |_: &str, _: &String, reason: DeleteReason| {
                assert_eq!(reason, DeleteReason::Expired);
                counter.set(counter.get() + 1);
            })),
        };

        tokio_test::block_on(run_cycle(&store, &listeners, T0 + 200));
        assert_eq!(seen.get(), 3);
    }

    #[tokio::test]
    async fn test_cycle_yields_between_batches() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let store = filled_store(
                    CacheConfig {
                        keys_per_batch: 2,
                        ..config()
                    },
                    6,
                    100,
                );

                // Counts how often another task on the same thread got to run
                let ticks = Rc::new(Cell::new(0u32));
                let ticker = tokio::task::spawn_local({
                    let ticks = Rc::clone(&ticks);
                    async move {
                        loop {
                            ticks.set(ticks.get() + 1);
                            tokio::task::yield_now().await;
                        }
                    }
                });

                let seen = Rc::new(RefCell::new(Vec::new()));
                let listeners = Listeners {
                    on_delete: None,
                    on_expire: Some(Rc::new({
                        let (seen, ticks) = (Rc::clone(&seen), Rc::clone(&ticks));
                        move |_: &str, _: &String, _: DeleteReason| {
                            seen.borrow_mut().push(ticks.get())
                        }
                    })),
                };

                let report = run_cycle(&store, &listeners, T0 + 200).await;
                ticker.abort();

                // The fourth batch only finds the end of the store
                assert_eq!(report.batches, 4);
                let seen = seen.borrow();
                assert_eq!(seen.len(), 6);
                // Entries of one batch are handled without suspending
                assert_eq!(seen[0], seen[1]);
                assert_eq!(seen[4], seen[5]);
                // The ticker ran between the first and the last batch
                assert!(seen[1] < seen[2], "ticks per entry: {:?}", *seen);
                assert!(seen[3] < seen[4], "ticks per entry: {:?}", *seen);
            })
            .await;
    }

    #[test]
    fn test_cycle_updates_expired_ratio() {
        let store = filled_store(config(), 4, 100);
        tokio_test::block_on(run_cycle(&store, &Listeners::default(), T0 + 200));
        assert_eq!(store.borrow().expired_ratio(), 0.25);
    }

    #[test]
    fn test_next_interval_base() {
        let config = CacheConfig {
            sweep_interval_ms: 1000,
            ..CacheConfig::default()
        };
        assert_eq!(next_interval(&config, 1.0, None, 0.0), Duration::from_millis(1000));
    }

    #[test]
    fn test_next_interval_pressure_moves_toward_worst() {
        let config = CacheConfig {
            sweep_interval_ms: 1300,
            ..CacheConfig::default()
        };
        assert_eq!(next_interval(&config, 1.0, Some(0.0), 0.0), Duration::from_millis(1300));
        assert_eq!(next_interval(&config, 1.0, Some(0.5), 0.0), Duration::from_millis(800));
        assert_eq!(next_interval(&config, 1.0, Some(1.0), 0.0), Duration::from_millis(300));
    }

    #[test]
    fn test_next_interval_short_base_not_stretched_by_pressure() {
        let config = CacheConfig {
            sweep_interval_ms: 100,
            ..CacheConfig::default()
        };
        assert_eq!(next_interval(&config, 1.0, Some(1.0), 0.0), Duration::from_millis(100));
    }

    #[test]
    fn test_next_interval_fairness_and_churn() {
        let config = CacheConfig {
            sweep_interval_ms: 1000,
            sweep_expired_ratio: 0.3,
            ..CacheConfig::default()
        };
        assert_eq!(next_interval(&config, 2.0, None, 0.0), Duration::from_millis(2000));
        assert_eq!(next_interval(&config, 0.5, None, 0.3), Duration::from_millis(250));
        assert_eq!(next_interval(&config, f64::NAN, None, 0.0), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_loop_sweeps_and_ends_with_store() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let monitor = Rc::new(ManualMonitor::new());
                monitor.set_snapshot(ResourceSnapshot::default());

                let mut store: CacheStore<String> = CacheStore::with_monitor(
                    CacheConfig {
                        sweep_interval_ms: 10,
                        ..CacheConfig::default()
                    },
                    monitor,
                );
                store
                    .set(
                        SetInput::new("short", "v".to_string()).ttl(1),
                        current_timestamp_ms(),
                    )
                    .unwrap();
                let store = Rc::new(RefCell::new(store));

                let registry = SweepRegistry::new();
                let id = registry.register();
                let handle = tokio::task::spawn_local(sweep_loop(
                    Rc::downgrade(&store),
                    Listeners::default(),
                    registry.clone(),
                    id,
                ));

                tokio::time::sleep(Duration::from_millis(100)).await;
                assert!(store.borrow().is_empty());
                assert!(store.borrow().stats().sweeps > 0);
                assert_eq!(registry.weight(id), Some(SweepWeight::new(0, 0.25)));

                drop(store);
                tokio::time::timeout(Duration::from_secs(1), handle)
                    .await
                    .expect("loop should end once the store is dropped")
                    .unwrap();
            })
            .await;
    }
}
