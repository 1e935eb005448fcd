//! Stale Cache - An in-process key/value cache with stale-while-revalidate
//!
//! Entries move from fresh to stale to expired on their own clock, tags
//! invalidate groups of entries lazily, admission control bounds the store
//! by entry count and process memory, and a budgeted background sweeper
//! reclaims what has expired.
//!
//! Caches are single-threaded: a [`Cache`] is neither `Send` nor `Sync` and
//! its sweeper runs on a [`tokio::task::LocalSet`].

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod policy;
pub mod tasks;

pub use cache::{Cache, CacheBuilder, CacheStats, DeleteReason, EntryStatus};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use models::{InvalidateOptions, RejectReason, SetInput, SetOutcome, SweepReport};
pub use monitor::{ManualMonitor, NoopMonitor, ResourceMonitor, ResourceSnapshot, SystemMonitor};
pub use policy::{PurgeMetric, PurgeMode};
pub use tasks::SweepRegistry;
