//! Request Models
//!
//! Inputs for writes and tag invalidation.

// == Set Input ==
/// A write request.
///
/// `value: None` means "do not write": any existing entry is left as is.
/// To store an explicit null, use an `Option` as the cache's value type.
#[derive(Debug, Clone, PartialEq)]
pub struct SetInput<V> {
    pub key: String,
    pub value: Option<V>,
    /// TTL in milliseconds; `None` uses the cache default, `0` never expires
    pub ttl_ms: Option<u64>,
    /// Stale window in milliseconds; `None` uses the cache default
    pub stale_window_ms: Option<u64>,
    pub tags: Option<Vec<String>>,
}

impl<V> SetInput<V> {
    /// Creates a write of `value` under `key` with cache defaults.
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
            ttl_ms: None,
            stale_window_ms: None,
            tags: None,
        }
    }

    /// Creates a request that leaves `key` untouched.
    pub fn skip(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            ttl_ms: None,
            stale_window_ms: None,
            tags: None,
        }
    }

    pub fn ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn stale_window(mut self, stale_window_ms: u64) -> Self {
        self.stale_window_ms = Some(stale_window_ms);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(Vec::new).push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags
            .get_or_insert_with(Vec::new)
            .extend(tags.into_iter().map(Into::into));
        self
    }

    /// Validates the tags of the request. The key is checked by the store,
    /// which reports an empty one as a missing key.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.tag_names().iter().any(|t| t.is_empty()) {
            return Some("empty tag name".to_string());
        }
        None
    }

    pub fn tag_names(&self) -> &[String] {
        self.tags.as_deref().unwrap_or(&[])
    }
}

// == Invalidate Options ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidateOptions {
    /// Mark entries stale instead of expired
    pub as_stale: bool,
}

impl InvalidateOptions {
    pub fn expired() -> Self {
        Self { as_stale: false }
    }

    pub fn stale() -> Self {
        Self { as_stale: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_input_builder() {
        let input = SetInput::new("k", 1).ttl(100).stale_window(200).tag("a").tags(["b", "c"]);

        assert_eq!(input.key, "k");
        assert_eq!(input.value, Some(1));
        assert_eq!(input.ttl_ms, Some(100));
        assert_eq!(input.stale_window_ms, Some(200));
        assert_eq!(input.tag_names(), ["a", "b", "c"]);
        assert!(input.validate().is_none());
    }

    #[test]
    fn test_skip_has_no_value() {
        let input: SetInput<String> = SetInput::skip("k");
        assert!(input.value.is_none());
    }

    #[test]
    fn test_validate_ignores_key() {
        let input = SetInput::new("", "v").tag("t");
        assert!(input.validate().is_none());
    }

    #[test]
    fn test_validate_empty_tag() {
        let input = SetInput::new("k", "v").tag("");
        assert!(input.validate().is_some());
    }

    #[test]
    fn test_invalidate_options() {
        assert!(!InvalidateOptions::default().as_stale);
        assert!(InvalidateOptions::stale().as_stale);
        assert!(!InvalidateOptions::expired().as_stale);
    }
}
