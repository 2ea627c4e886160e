//! Module-scoped memoization of service results

use std::sync::Arc;

use dashmap::DashMap;

use crate::context::Value;

/// Maps service task names to their first successful value.
///
/// Cloning shares the underlying map. Concurrent first populations of the same
/// service are not serialized: the last write wins.
#[derive(Debug, Clone, Default)]
pub struct ServiceCache {
    entries: Arc<DashMap<String, Value>>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn put(&self, name: &str, value: Value) {
        tracing::debug!(service = name, "Caching service value");
        self.entries.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Drop every cached value, forcing services to recompute
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_clear() {
        let cache = ServiceCache::new();
        assert!(cache.get("bacon").is_none());

        cache.put("bacon", Arc::new("crispy"));
        assert!(cache.contains("bacon"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("bacon").unwrap().downcast_ref::<&str>(), Some(&"crispy"));

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("bacon").is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ServiceCache::new();
        let other = cache.clone();
        other.put("eggs", Arc::new(2u8));
        assert!(cache.contains("eggs"));
    }

    #[test]
    fn test_last_write_wins() {
        let cache = ServiceCache::new();
        cache.put("eggs", Arc::new(1u8));
        cache.put("eggs", Arc::new(2u8));
        assert_eq!(cache.get("eggs").unwrap().downcast_ref::<u8>(), Some(&2));
    }
}
