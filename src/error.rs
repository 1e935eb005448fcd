//! Error types for the cache
//!
//! Only programmer errors surface here. Misses, admission rejections and
//! invalid purge configuration are reported through return values and
//! diagnostics instead.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A write was attempted with an empty key
    #[error("Missing key.")]
    MissingKey,

    /// A tag name was empty
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
