//! Background Tasks Module
//!
//! Contains the background sweeper that reclaims expired and stale entries.
//!
//! # Tasks
//! - Sweep: budgeted, resumable reclamation cycles at an adaptive interval
//! - Registry: sweep weights of the live cache instances, for fairness

mod registry;
mod sweep;

pub use registry::{
    InstanceId, SweepRegistry, SweepWeight, MAX_INTERVAL_FACTOR, MIN_INTERVAL_FACTOR,
};
pub use sweep::{next_interval, WORST_SWEEP_INTERVAL_MS};

pub(crate) use sweep::{run_cycle, sweep_loop};
