//! Response Models
//!
//! Outcomes of writes and sweep cycles.

use std::fmt;

use serde::Serialize;

// == Reject Reason ==
/// Why a new key was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// The entry-count limit is reached
    MaxSize { limit: usize },
    /// Process memory is at or above the memory ceiling
    MaxMemory { used_bytes: u64, ceiling_bytes: u64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MaxSize { limit } => write!(f, "entry limit of {} reached", limit),
            RejectReason::MaxMemory {
                used_bytes,
                ceiling_bytes,
            } => write!(
                f,
                "memory usage {} bytes at or above ceiling of {} bytes",
                used_bytes, ceiling_bytes
            ),
        }
    }
}

// == Set Outcome ==
/// Result of a write. Capacity rejections are outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SetOutcome {
    /// The entry was written
    Stored,
    /// The request carried no value; nothing changed
    Skipped,
    /// The key was new and admission control refused it
    Rejected(RejectReason),
}

impl SetOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, SetOutcome::Stored)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SetOutcome::Rejected(_))
    }
}

// == Sweep Report ==
/// Summary of one sweep cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entries visited
    pub processed: usize,
    /// Entries removed because they expired
    pub expired: usize,
    /// Stale entries removed by the sweep purge policy
    pub stale_purged: usize,
    /// Batches run, i.e. cooperative yields plus one
    pub batches: usize,
    /// The cursor reached the end of the store and was reset
    pub exhausted: bool,
    /// The cycle stopped because its time budget ran out
    pub over_budget: bool,
}

impl SweepReport {
    /// Fraction of visited entries that had expired.
    pub fn expired_ratio(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.expired as f64 / self.processed as f64
        }
    }

    pub fn removed(&self) -> usize {
        self.expired + self.stale_purged
    }
}
