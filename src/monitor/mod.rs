//! Resource Monitor Module
//!
//! The cache reads resource usage as a last-known snapshot and never waits
//! on it. A missing snapshot means "no resource pressure".

mod system;

use std::cell::Cell;

use serde::Serialize;

pub use system::SystemMonitor;

/// Relative weight of memory pressure in the combined pressure score.
pub const MEMORY_WEIGHT: f64 = 10.0;
/// Relative weight of CPU utilisation.
pub const CPU_WEIGHT: f64 = 8.5;
/// Relative weight of event-loop (scheduler) utilisation.
pub const LOOP_WEIGHT: f64 = 6.5;

// == Resource Snapshot ==
/// Periodically refreshed resource usage of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    pub process_memory_bytes: u64,
    /// Fraction of one core, 0.0..=1.0
    pub cpu_utilization: f64,
    /// Fraction of scheduler time lost to lag, 0.0..=1.0
    pub event_loop_utilization: f64,
}

impl ResourceSnapshot {
    /// Combined pressure in `0.0..=1.0`, weighting memory usage against
    /// `memory_ceiling` together with CPU and scheduler utilisation.
    pub fn pressure(&self, memory_ceiling: Option<u64>) -> f64 {
        let cpu = self.cpu_utilization.clamp(0.0, 1.0);
        let lag = self.event_loop_utilization.clamp(0.0, 1.0);

        let (memory, memory_weight) = match memory_ceiling {
            Some(ceiling) if ceiling > 0 => (
                (self.process_memory_bytes as f64 / ceiling as f64).clamp(0.0, 1.0),
                MEMORY_WEIGHT,
            ),
            _ => (0.0, 0.0),
        };

        let total = memory_weight + CPU_WEIGHT + LOOP_WEIGHT;
        (memory * memory_weight + cpu * CPU_WEIGHT + lag * LOOP_WEIGHT) / total
    }
}

// == Resource Monitor ==
/// Source of resource usage consumed by admission control and the sweeper.
pub trait ResourceMonitor {
    /// Latest snapshot, `None` when metrics are unavailable.
    fn snapshot(&self) -> Option<ResourceSnapshot>;

    /// Discovered effective memory ceiling of the process in bytes.
    fn memory_limit_bytes(&self) -> Option<u64> {
        None
    }
}

/// Monitor for environments without metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ResourceMonitor for NoopMonitor {
    fn snapshot(&self) -> Option<ResourceSnapshot> {
        None
    }
}

// == Manual Monitor ==
/// Monitor whose readings are set by hand. Handy for embedding hosts that
/// sample resources themselves, and for tests.
#[derive(Debug, Default)]
pub struct ManualMonitor {
    snapshot: Cell<Option<ResourceSnapshot>>,
    memory_limit: Cell<Option<u64>>,
}

impl ManualMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, snapshot: ResourceSnapshot) {
        self.snapshot.set(Some(snapshot));
    }

    pub fn set_memory_bytes(&self, bytes: u64) {
        let mut snapshot = self.snapshot.get().unwrap_or_default();
        snapshot.process_memory_bytes = bytes;
        self.snapshot.set(Some(snapshot));
    }

    pub fn set_memory_limit(&self, bytes: Option<u64>) {
        self.memory_limit.set(bytes);
    }

    pub fn clear(&self) {
        self.snapshot.set(None);
    }
}

impl ResourceMonitor for ManualMonitor {
    fn snapshot(&self) -> Option<ResourceSnapshot> {
        self.snapshot.get()
    }

    fn memory_limit_bytes(&self) -> Option<u64> {
        self.memory_limit.get()
    }
}
