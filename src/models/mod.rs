//! Data Models
//!
//! Value types passed into and returned from cache operations.
//!
//! # Modules
//! - `requests`: write and invalidation inputs
//! - `responses`: write outcomes and sweep reports

pub mod requests;
pub mod responses;

pub use requests::{InvalidateOptions, SetInput};
pub use responses::{RejectReason, SetOutcome, SweepReport};
