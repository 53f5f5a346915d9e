//! Login cache.
//!
//! Maps `(mechanism, username)` to the most recent session issued for that
//! identity, so a client performing explicit login does not pay a catalogue
//! handshake per call. Entries are evicted LRU at the configured bound;
//! stale hits are verified against the catalogue by the caller and evicted.

use moka::sync::Cache;

/// Bounded cache of issued session ids keyed by identity.
#[derive(Clone)]
pub struct AuthCache {
    cache: Cache<(String, String), String>,
}

impl AuthCache {
    pub fn new(max_entries: u64) -> Self {
        AuthCache {
            cache: Cache::builder().max_capacity(max_entries).build(),
        }
    }

    /// Most recent session id issued for this identity, if cached.
    pub fn get(&self, mechanism: &str, username: &str) -> Option<String> {
        self.cache
            .get(&(mechanism.to_string(), username.to_string()))
    }

    pub fn put(&self, mechanism: &str, username: &str, session_id: String) {
        self.cache
            .insert((mechanism.to_string(), username.to_string()), session_id);
    }

    /// Remove an entry the catalogue no longer recognises.
    pub fn evict(&self, mechanism: &str, username: &str) {
        self.cache
            .invalidate(&(mechanism.to_string(), username.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_evict() {
        let cache = AuthCache::new(4);
        assert!(cache.get("simple", "root").is_none());

        cache.put("simple", "root", "sess-1".to_string());
        assert_eq!(cache.get("simple", "root").as_deref(), Some("sess-1"));

        // Same user under a different mechanism is a distinct identity.
        assert!(cache.get("ldap", "root").is_none());

        cache.evict("simple", "root");
        assert!(cache.get("simple", "root").is_none());
    }

    #[test]
    fn bounded_capacity_evicts() {
        let cache = AuthCache::new(2);
        cache.put("simple", "a", "1".to_string());
        cache.put("simple", "b", "2".to_string());
        cache.put("simple", "c", "3".to_string());
        cache.cache.run_pending_tasks();

        let live = ["a", "b", "c"]
            .iter()
            .filter(|u| cache.get("simple", u).is_some())
            .count();
        assert!(live <= 2);
    }
}
