//! Deletion Listeners
//!
//! Callbacks invoked when entries leave the cache.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

/// Describes why an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteReason {
    /// Removed by an explicit delete.
    Manual,
    /// Removed because it expired, by clock or by tag.
    Expired,
    /// Removed while stale by a purge policy.
    Stale,
}

impl fmt::Display for DeleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteReason::Manual => write!(f, "manual"),
            DeleteReason::Expired => write!(f, "expired"),
            DeleteReason::Stale => write!(f, "stale"),
        }
    }
}

/// Callback receiving the key, the removed value and the reason.
pub type Listener<V> = Rc<dyn Fn(&str, &V, DeleteReason)>;

/// The pair of callbacks a cache may carry.
pub(crate) struct Listeners<V> {
    /// Called for every removal
    pub on_delete: Option<Listener<V>>,
    /// Called for every removal that is not manual
    pub on_expire: Option<Listener<V>>,
}

impl<V> Listeners<V> {
    pub(crate) fn is_empty(&self) -> bool {
        self.on_delete.is_none() && self.on_expire.is_none()
    }

    pub(crate) fn notify(&self, key: &str, value: &V, reason: DeleteReason) {
        if let Some(on_delete) = &self.on_delete {
            on_delete(key, value, reason);
        }
        if reason != DeleteReason::Manual {
            if let Some(on_expire) = &self.on_expire {
                on_expire(key, value, reason);
            }
        }
    }
}

impl<V> Default for Listeners<V> {
    fn default() -> Self {
        Self {
            on_delete: None,
            on_expire: None,
        }
    }
}

impl<V> Clone for Listeners<V> {
    fn clone(&self) -> Self {
        Self {
            on_delete: self.on_delete.clone(),
            on_expire: self.on_expire.clone(),
        }
    }
}

impl<V> fmt::Debug for Listeners<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("on_delete", &self.on_delete.is_some())
            .field("on_expire", &self.on_expire.is_some())
            .finish()
    }
}
