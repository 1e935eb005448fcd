//! Status Resolver
//!
//! Computes the effective freshness of an entry from its own clock and the
//! clocks of the tags it references.

use std::fmt;

use serde::Serialize;

use crate::cache::entry::EntryClock;
use crate::cache::tags::TagRegistry;

// == Entry Status ==
/// Derived freshness. Ordering follows precedence: `Expired > Stale > Fresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Fresh,
    Stale,
    Expired,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Fresh => write!(f, "fresh"),
            EntryStatus::Stale => write!(f, "stale"),
            EntryStatus::Expired => write!(f, "expired"),
        }
    }
}

// == Tag Verdict ==
/// What the tags of an entry impose on it, before the entry clock is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagVerdict {
    None,
    Expired,
    /// Earliest applicable stale marker
    Stale(u64),
}

fn verdict_from_tags(clock: &EntryClock, tags: &[String], registry: &TagRegistry) -> TagVerdict {
    let mut earliest_stale: Option<u64> = None;

    for tag in tags {
        let Some(tag_clock) = registry.get(tag) else {
            continue;
        };

        if tag_clock.expired_since(clock.created_at).is_some() {
            return TagVerdict::Expired;
        }

        if let Some(stale_at) = tag_clock.stale_since(clock.created_at) {
            earliest_stale = Some(earliest_stale.map_or(stale_at, |e| e.min(stale_at)));
        }
    }

    earliest_stale.map_or(TagVerdict::None, TagVerdict::Stale)
}

fn status_from_clock(clock: &EntryClock, now: u64) -> EntryStatus {
    if clock.is_fresh(now) {
        EntryStatus::Fresh
    } else if clock.is_stale(now) {
        EntryStatus::Stale
    } else {
        EntryStatus::Expired
    }
}

// == Resolve ==
/// Resolves the status of an entry at `now`.
///
/// Only tags invalidated at or after the entry was created count. An
/// expired tag marker wins outright. A stale tag marker makes the entry
/// stale when the entry has a stale window of its own, until the marker
/// plus that window has passed; after that the entry clock decides.
pub fn resolve_status(
    clock: &EntryClock,
    tags: &[String],
    registry: &TagRegistry,
    now: u64,
) -> EntryStatus {
    match verdict_from_tags(clock, tags, registry) {
        TagVerdict::Expired => return EntryStatus::Expired,
        TagVerdict::Stale(stale_at) => {
            if tag_stale_deadline(clock, stale_at).is_some_and(|deadline| now < deadline) {
                return EntryStatus::Stale;
            }
        }
        TagVerdict::None => {}
    }

    status_from_clock(clock, now)
}

fn tag_stale_deadline(clock: &EntryClock, stale_at: u64) -> Option<u64> {
    clock
        .has_stale_window()
        .then(|| stale_at.saturating_add(clock.stale_window()))
}

// == Stale Window End ==
/// Instant at which the entry stops being servable as stale, as of `now`.
///
/// Returns `None` when the entry is expired at `now`, or when it has no
/// stale window at all. While a stale tag marker holds the entry stale,
/// the window ends with the marker, unless the entry's own clock is
/// already stale by then and carries it further.
pub fn stale_window_end(
    clock: &EntryClock,
    tags: &[String],
    registry: &TagRegistry,
    now: u64,
) -> Option<u64> {
    if !clock.has_stale_window() {
        return None;
    }

    match verdict_from_tags(clock, tags, registry) {
        TagVerdict::Expired => None,
        TagVerdict::Stale(stale_at) => match tag_stale_deadline(clock, stale_at) {
            Some(deadline) if now < deadline => {
                if clock.is_stale(deadline) {
                    Some(clock.stale_expires_at)
                } else {
                    Some(deadline)
                }
            }
            _ => own_stale_window_end(clock, now),
        },
        TagVerdict::None => own_stale_window_end(clock, now),
    }
}

fn own_stale_window_end(clock: &EntryClock, now: u64) -> Option<u64> {
    (status_from_clock(clock, now) != EntryStatus::Expired).then_some(clock.stale_expires_at)
}
