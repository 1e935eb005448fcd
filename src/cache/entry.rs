//! Cache Entry Module
//!
//! Defines the three-point lifecycle clock and the structure for individual
//! cache entries.

use std::sync::OnceLock;
use std::time::Instant;

/// Sentinel instant meaning "never".
pub const NEVER: u64 = u64::MAX;

/// Stale window length meaning "stale forever once expired".
pub const UNBOUNDED: u64 = u64::MAX;

// == Entry Clock ==
/// Lifecycle instants of an entry, in milliseconds on the cache clock.
///
/// `stale_expires_at == 0` means the entry has no stale window and
/// `expires_at == NEVER` means it never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryClock {
    pub created_at: u64,
    pub expires_at: u64,
    pub stale_expires_at: u64,
}

impl EntryClock {
    // == Constructor ==
    /// Builds a clock from a creation instant, a ttl and a stale window.
    ///
    /// A ttl of zero never expires; a stale window of zero disables the
    /// stale phase.
    pub fn new(now: u64, ttl_ms: u64, stale_window_ms: u64) -> Self {
        let expires_at = if ttl_ms > 0 {
            now.saturating_add(ttl_ms)
        } else {
            NEVER
        };
        let stale_expires_at = if stale_window_ms > 0 {
            expires_at.saturating_add(stale_window_ms)
        } else {
            0
        };

        Self {
            created_at: now,
            expires_at,
            stale_expires_at,
        }
    }

    /// True when the entry can be served as stale after it expires.
    pub fn has_stale_window(&self) -> bool {
        self.stale_expires_at > self.expires_at
    }

    /// Length of the stale window, zero when there is none.
    pub fn stale_window(&self) -> u64 {
        if self.has_stale_window() {
            self.stale_expires_at - self.expires_at
        } else {
            0
        }
    }

    // == Status Checks ==
    /// Boundary condition: fresh strictly before `expires_at`.
    pub fn is_fresh(&self, now: u64) -> bool {
        now < self.expires_at
    }

    pub fn is_stale(&self, now: u64) -> bool {
        self.stale_expires_at > 0 && now >= self.expires_at && now < self.stale_expires_at
    }

    pub fn is_expired(&self, now: u64) -> bool {
        if self.stale_expires_at == 0 {
            now >= self.expires_at
        } else {
            now >= self.stale_expires_at
        }
    }
}

// == Cache Entry ==
/// A single stored value with its clock and tag names.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub clock: EntryClock,
    pub value: V,
    /// Tag names, looked up in the tag registry on every resolve
    pub tags: Option<Vec<String>>,
}

impl<V> CacheEntry<V> {
    pub fn new(clock: EntryClock, value: V, tags: Option<Vec<String>>) -> Self {
        Self { clock, value, tags }
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or(&[])
    }
}

// == Utility Functions ==
/// Returns milliseconds elapsed on the monotonic cache clock.
///
/// The clock starts the first time it is read in the process, so values
/// stay well clear of both `0` and `NEVER`.
pub fn current_timestamp_ms() -> u64 {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    let anchor = ANCHOR.get_or_init(Instant::now);
    // Offset keeps real instants above the "unset" zero used by stale_expires_at.
    1 + anchor.elapsed().as_millis() as u64
}
