//! Cache Module
//!
//! Provides the in-memory store with fresh, stale and expired phases, tag
//! invalidation and the `Cache` handle wrapping it.

mod entry;
mod handle;
mod listener;
mod stats;
mod status;
mod store;
mod tags;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, EntryClock, NEVER, UNBOUNDED};
pub use handle::{Cache, CacheBuilder};
pub use listener::{DeleteReason, Listener};
pub use stats::CacheStats;
pub use status::{resolve_status, stale_window_end, EntryStatus};
pub use store::{BatchProgress, CacheStore, Removal};
pub use tags::{TagClock, TagRegistry};

pub(crate) use listener::Listeners;
