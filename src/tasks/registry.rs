//! Sweep Registry
//!
//! Shared table of live cache instances and their sweep weights. Each
//! sweeper asks it how its own weight compares to the fair share and
//! stretches or shrinks its interval accordingly.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Lower bound on the interval factor, i.e. at most 4x faster than base.
///
/// With `n` instances the unclamped factor never drops below `1/n`, so
/// this bound only takes effect with more than four instances.
pub const MIN_INTERVAL_FACTOR: f64 = 0.25;
/// Upper bound on the interval factor, i.e. at most 4x slower than base.
pub const MAX_INTERVAL_FACTOR: f64 = 4.0;

thread_local! {
    static LOCAL_REGISTRY: SweepRegistry = SweepRegistry::new();
}

/// Identity of a cache instance within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache-{}", self.0)
    }
}

// == Sweep Weight ==
/// How much sweeping an instance deserves relative to its peers.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SweepWeight(f64);

impl SweepWeight {
    /// Weight of an instance holding `len` entries whose sweeps find
    /// `expired_ratio` of visited entries expired.
    ///
    /// An empty instance still weighs 1 so it keeps a share.
    pub fn new(len: usize, expired_ratio: f64) -> Self {
        let ratio = if expired_ratio.is_finite() {
            expired_ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self((len as f64 + 1.0) * (1.0 + ratio))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for SweepWeight {
    fn default() -> Self {
        Self::new(0, 0.0)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    weights: HashMap<InstanceId, SweepWeight>,
}

// == Sweep Registry ==
/// Cheaply clonable handle to a set of instance weights.
///
/// Caches built without an explicit registry share the thread's
/// [`SweepRegistry::local`] one.
#[derive(Debug, Clone, Default)]
pub struct SweepRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl SweepRegistry {
    /// Creates an empty registry, independent of every other one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by all caches on the current thread.
    pub fn local() -> Self {
        LOCAL_REGISTRY.with(Clone::clone)
    }

    /// Adds an instance with the minimum weight and returns its id.
    pub fn register(&self) -> InstanceId {
        let mut state = self.state.borrow_mut();
        let id = InstanceId(state.next_id);
        state.next_id += 1;
        state.weights.insert(id, SweepWeight::default());
        id
    }

    pub fn unregister(&self, id: InstanceId) {
        self.state.borrow_mut().weights.remove(&id);
    }

    /// Replaces the weight of a registered instance. Unknown ids are ignored.
    pub fn update(&self, id: InstanceId, weight: SweepWeight) {
        if let Some(slot) = self.state.borrow_mut().weights.get_mut(&id) {
            *slot = weight;
        }
    }

    pub fn weight(&self, id: InstanceId) -> Option<SweepWeight> {
        self.state.borrow().weights.get(&id).copied()
    }

    // == Interval Factor ==
    /// Multiplier for the sweep interval of `id`: fair share divided by the
    /// instance's share of the total weight.
    ///
    /// Heavier instances get a factor below 1 and sweep more often. A lone
    /// or unknown instance gets 1.
    pub fn interval_factor(&self, id: InstanceId) -> f64 {
        let state = self.state.borrow();
        let Some(own) = state.weights.get(&id) else {
            return 1.0;
        };

        let count = state.weights.len() as f64;
        let total: f64 = state.weights.values().map(SweepWeight::value).sum();
        if count <= 1.0 || total <= 0.0 || own.value() <= 0.0 {
            return 1.0;
        }

        let fair_share = 1.0 / count;
        let own_share = own.value() / total;
        (fair_share / own_share).clamp(MIN_INTERVAL_FACTOR, MAX_INTERVAL_FACTOR)
    }

    pub fn len(&self) -> usize {
        self.state.borrow().weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().weights.is_empty()
    }

    /// Forgets every instance. Ids keep increasing.
    pub fn reset(&self) {
        self.state.borrow_mut().weights.clear();
    }
}
