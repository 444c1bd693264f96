//! A bounded in-memory replay cache keyed by `(client principal,
//! authenticator ctime, cusec)`, protected by a single mutex outside the
//! hot decrypt path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReplayKey {
    principal: String,
    ctime: i64,
    cusec: i64,
}

/// Rejects a second acceptance of the same `(principal, ctime, cusec)`
/// authenticator within a sliding window of `2 * clock_skew_seconds`.
pub struct ReplayCache {
    entries: Mutex<HashMap<ReplayKey, Instant>>,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` (and records the authenticator) if this is the
    /// first time it has been seen within the window; `false` if it's a
    /// replay.
    pub fn check_and_insert(&self, principal: &str, ctime: i64, cusec: i64, window: Duration) -> bool {
        let key = ReplayKey {
            principal: principal.to_string(),
            ctime,
            cusec,
        };
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("replay cache mutex poisoned");
        entries.retain(|_, seen_at| now.duration_since(*seen_at) < window);

        if entries.contains_key(&key) {
            false
        } else {
            entries.insert(key, now);
            true
        }
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_acceptance_succeeds() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("alice@TEST.COM", 100, 0, Duration::from_secs(600)));
    }

    #[test]
    fn second_acceptance_within_window_is_rejected() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("alice@TEST.COM", 100, 0, Duration::from_secs(600)));
        assert!(!cache.check_and_insert("alice@TEST.COM", 100, 0, Duration::from_secs(600)));
    }

    #[test]
    fn distinct_cusec_is_not_a_replay() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("alice@TEST.COM", 100, 0, Duration::from_secs(600)));
        assert!(cache.check_and_insert("alice@TEST.COM", 100, 1, Duration::from_secs(600)));
    }

    #[test]
    fn expired_entry_is_evicted_and_reusable() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("alice@TEST.COM", 100, 0, Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.check_and_insert("alice@TEST.COM", 100, 0, Duration::from_millis(1)));
    }
}
