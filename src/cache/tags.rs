//! Tag Registry Module
//!
//! Maps tag names to their invalidation instants. Entries refer to tags by
//! name only, so tags and entries have independent lifecycles.

use std::collections::HashMap;

// == Tag Clock ==
/// Invalidation instants recorded for one tag. `None` means not applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagClock {
    pub expired_at: Option<u64>,
    pub stale_at: Option<u64>,
}

impl TagClock {
    /// Expired marker, if it applies to an entry created at `created_at`.
    pub fn expired_since(&self, created_at: u64) -> Option<u64> {
        self.expired_at.filter(|&at| at >= created_at)
    }

    /// Stale marker, if it applies to an entry created at `created_at`.
    pub fn stale_since(&self, created_at: u64) -> Option<u64> {
        self.stale_at.filter(|&at| at >= created_at)
    }
}

// == Tag Registry ==
#[derive(Debug, Default)]
pub struct TagRegistry {
    tags: HashMap<String, TagClock>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // == Invalidate ==
    /// Records an invalidation of `tag` at `now`.
    ///
    /// Each kind of marker only moves forward; a stale invalidation never
    /// clears an earlier expired one.
    pub fn invalidate(&mut self, tag: &str, as_stale: bool, now: u64) {
        let clock = self.tags.entry(tag.to_string()).or_default();
        let slot = if as_stale {
            &mut clock.stale_at
        } else {
            &mut clock.expired_at
        };
        *slot = Some(slot.map_or(now, |prev| prev.max(now)));
    }

    pub fn get(&self, tag: &str) -> Option<&TagClock> {
        self.tags.get(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag_is_absent() {
        let registry = TagRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalidate_records_expired_marker() {
        let mut registry = TagRegistry::new();
        registry.invalidate("users", false, 50);

        let clock = registry.get("users").unwrap();
        assert_eq!(clock.expired_at, Some(50));
        assert_eq!(clock.stale_at, None);
    }

    #[test]
    fn test_stale_invalidation_keeps_expired_marker() {
        let mut registry = TagRegistry::new();
        registry.invalidate("t", false, 10);
        registry.invalidate("t", true, 20);

        let clock = registry.get("t").unwrap();
        assert_eq!(clock.expired_at, Some(10));
        assert_eq!(clock.stale_at, Some(20));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_markers_only_move_forward() {
        let mut registry = TagRegistry::new();
        registry.invalidate("t", true, 40);
        registry.invalidate("t", true, 30);

        assert_eq!(registry.get("t").unwrap().stale_at, Some(40));
    }

    #[test]
    fn test_markers_before_creation_do_not_apply() {
        let clock = TagClock {
            expired_at: Some(99),
            stale_at: Some(100),
        };

        assert_eq!(clock.expired_since(100), None);
        assert_eq!(clock.stale_since(100), Some(100));
    }
}
