//! Policy Module
//!
//! Purge-mode resolution and admission control.
//!
//! # Policies
//! - Purge metric: which resource a threshold is measured against
//! - Purge mode: boolean or threshold policy for removing stale entries
//! - Admission: whether a new key may be stored under size/memory pressure

mod admission;
mod metric;
mod purge;

pub use admission::AdmissionPolicy;
pub use metric::{resolve_purge_metric, Limits, PurgeMetric};
pub use purge::{resolve_purge_mode, PurgeMode, PurgeOperation};
