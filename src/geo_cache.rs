//! # Geocode Cache Module
//!
//! In-memory cache of geocoding outcomes keyed by normalized address.
//! Expiry is checked lazily on read; nothing runs in the background.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Coordinates and matched label returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub lon: f64,
    pub lat: f64,
    pub label: String,
}

/// What a lookup produced
#[derive(Debug, Clone, PartialEq)]
pub enum CachedOutcome {
    Found(GeocodeResult),
    /// Upstream answered but had no match
    NoMatch,
}

/// A single cached lookup
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub outcome: CachedOutcome,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

/// Trim surrounding whitespace; case is kept as supplied.
///
/// Returns `None` for an empty or whitespace-only address.
pub fn normalize_query(address: &str) -> Option<&str> {
    let trimmed = address.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Thread-safe geocode cache
///
/// One entry per normalized query, last write wins. The cache is an explicit
/// object handed to the gateway at construction, so tests and separate
/// gateway instances never share state by accident.
///
/// # Capacity
///
/// When full, inserting a new key first drops expired entries and then
/// evicts the oldest entry by creation time.
pub struct GeocodeCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
}

impl GeocodeCache {
    /// Create an empty cache holding at most `capacity` queries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    // Poisoning leaves the map intact
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the live entry for `key`, dropping it if it has expired
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, Utc::now())
    }

    /// Same as [`get`](Self::get) but against an explicit clock
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.clone()),
            Some(_) => {
                debug!("Geocode cache entry expired for query: {key}");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store an outcome, overwriting any previous entry for `key`
    pub fn put(&self, key: &str, outcome: CachedOutcome, ttl: Option<Duration>) {
        self.put_at(key, outcome, ttl, Utc::now());
    }

    /// Same as [`put`](Self::put) but against an explicit clock
    pub fn put_at(&self, key: &str, outcome: CachedOutcome, ttl: Option<Duration>, now: DateTime<Utc>) {
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| now + ttl);
        let entry = CacheEntry {
            outcome,
            created_at: now,
            expires_at,
        };

        let mut entries = self.lock();
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            entries.retain(|_, existing| existing.is_live(now));
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, existing)| existing.created_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    debug!("Geocode cache full, evicting query: {oldest}");
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key.to_string(), entry);
    }

    /// Remove the entry for `key`, returning whether one existed
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, expired ones included until next read
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GeocodeCache {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kaluga() -> GeocodeResult {
        GeocodeResult {
            lon: 36.261,
            lat: 54.513,
            label: "Россия, Калуга".to_string(),
        }
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Калуга, ул. Ленина 1 "), Some("Калуга, ул. Ленина 1"));
        assert_eq!(normalize_query("Kaluga"), Some("Kaluga"));
        assert_eq!(normalize_query(""), None);
        assert_eq!(normalize_query(" \t\n"), None);
    }

    #[test]
    fn test_put_then_get_returns_entry() {
        let cache = GeocodeCache::new(10);
        cache.put("Калуга", CachedOutcome::Found(kaluga()), None);

        let entry = cache.get("Калуга").expect("entry should exist");
        assert_eq!(entry.outcome, CachedOutcome::Found(kaluga()));
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn test_expired_entry_is_dropped_on_read() {
        let cache = GeocodeCache::new(10);
        let written = Utc::now();
        cache.put_at("Калуга", CachedOutcome::NoMatch, Some(Duration::from_secs(60)), written);

        assert!(cache.get_at("Калуга", written + chrono::Duration::seconds(30)).is_some());
        assert!(cache.get_at("Калуга", written + chrono::Duration::seconds(61)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = GeocodeCache::new(10);
        cache.put("Калуга", CachedOutcome::NoMatch, None);
        cache.put("Калуга", CachedOutcome::Found(kaluga()), None);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("Калуга").unwrap().outcome, CachedOutcome::Found(kaluga()));
    }

    #[test]
    fn test_invalidate() {
        let cache = GeocodeCache::new(10);
        cache.put("Калуга", CachedOutcome::NoMatch, None);

        assert!(cache.invalidate("Калуга"));
        assert!(!cache.invalidate("Калуга"));
        assert!(cache.get("Калуга").is_none());
    }

    #[test]
    fn test_capacity_prefers_expired_then_oldest() {
        let cache = GeocodeCache::new(2);
        let t0 = Utc::now();
        cache.put_at("a", CachedOutcome::NoMatch, None, t0);
        cache.put_at("b", CachedOutcome::NoMatch, Some(Duration::from_secs(1)), t0);

        // "b" has expired by now, so it goes first
        let t1 = t0 + chrono::Duration::seconds(5);
        cache.put_at("c", CachedOutcome::NoMatch, None, t1);
        assert!(cache.get_at("a", t1).is_some());
        assert!(cache.get_at("b", t1).is_none());
        assert!(cache.get_at("c", t1).is_some());

        // Nothing expired, so the oldest ("a") goes
        let t2 = t1 + chrono::Duration::seconds(5);
        cache.put_at("d", CachedOutcome::NoMatch, None, t2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at("a", t2).is_none());
        assert!(cache.get_at("d", t2).is_some());
    }

    #[test]
    fn test_overwrite_does_not_evict_when_full() {
        let cache = GeocodeCache::new(1);
        cache.put("a", CachedOutcome::NoMatch, None);
        cache.put("a", CachedOutcome::Found(kaluga()), None);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("a").is_some());
    }
}
