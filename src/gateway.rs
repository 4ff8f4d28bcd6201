//! # Geocoding Gateway Module
//!
//! Caching proxy in front of the upstream geocoding provider. It validates
//! input, answers repeated lookups from the injected [`GeocodeCache`], and
//! folds every upstream failure into exactly one [`GeoError`] kind.
//!
//! The gateway never retries. Upstream calls run inside the caller's future:
//! if the caller is dropped (client disconnects) the call is abandoned and
//! nothing is written to the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::geo_cache::{normalize_query, CachedOutcome, GeocodeCache, GeocodeResult};
use crate::geo_errors::{GeoError, ProviderError};
use crate::provider::{GeoProvider, MapImage, StaticMapRequest};

struct InflightEntry {
    lock: Arc<Mutex<()>>,
    /// Callers holding or waiting on `lock`
    holders: usize,
}

/// Per-key locks used when single-flight coalescing is enabled
#[derive(Default)]
struct InflightLocks {
    inflight: StdMutex<HashMap<String, InflightEntry>>,
}

impl InflightLocks {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, InflightEntry>> {
        self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for the key's lock. The returned slot releases it on drop, so a
    /// caller cancelled while waiting or while holding it leaves nothing behind.
    async fn acquire(&self, key: &str) -> InflightSlot<'_> {
        let lock = {
            let mut inflight = self.entries();
            let entry = inflight.entry(key.to_string()).or_insert_with(|| InflightEntry {
                lock: Arc::new(Mutex::new(())),
                holders: 0,
            });
            entry.holders += 1;
            Arc::clone(&entry.lock)
        };

        let mut slot = InflightSlot {
            locks: self,
            key: key.to_string(),
            guard: None,
        };
        slot.guard = Some(lock.lock_owned().await);
        slot
    }

    fn leave(&self, key: &str) {
        let mut inflight = self.entries();
        if let Some(entry) = inflight.get_mut(key) {
            entry.holders = entry.holders.saturating_sub(1);
            if entry.holders == 0 {
                inflight.remove(key);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}

/// A caller's claim on one key's lock
struct InflightSlot<'a> {
    locks: &'a InflightLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // Unlock first so the next waiter can proceed
        self.guard.take();
        self.locks.leave(&self.key);
    }
}

/// Caching, error-normalizing front for a [`GeoProvider`]
pub struct GeocodingGateway {
    provider: Arc<dyn GeoProvider>,
    cache: Arc<GeocodeCache>,
    config: GatewayConfig,
    inflight: InflightLocks,
}

impl GeocodingGateway {
    /// Create a gateway around `provider`, storing outcomes in `cache`
    pub fn new(provider: Arc<dyn GeoProvider>, cache: Arc<GeocodeCache>, config: GatewayConfig) -> Self {
        Self {
            provider,
            cache,
            config,
            inflight: InflightLocks::default(),
        }
    }

    /// The cache this gateway reads and writes
    pub fn cache(&self) -> &Arc<GeocodeCache> {
        &self.cache
    }

    /// Resolve an address to coordinates.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty or whitespace-only address
    /// - `NotFound` when upstream has (or had, per a live negative entry) no match
    /// - `UpstreamUnavailable` for transport faults, timeouts and 5xx; not cached
    /// - `UpstreamConfigError` for rejected credentials; not cached
    pub async fn geocode(&self, address: &str) -> Result<GeocodeResult, GeoError> {
        let key = normalize_query(address)
            .ok_or_else(|| GeoError::InvalidArgument("address must not be empty".to_string()))?;

        if let Some(result) = self.lookup_cached(key) {
            return result;
        }

        if !self.config.single_flight {
            return self.fetch_and_store(key, address).await;
        }

        let _slot = self.inflight.acquire(key).await;
        // Another caller may have filled the entry while we waited
        match self.lookup_cached(key) {
            Some(result) => result,
            None => self.fetch_and_store(key, address).await,
        }
    }

    /// Re-query upstream for `address`, overwriting whatever is cached
    pub async fn refresh(&self, address: &str) -> Result<GeocodeResult, GeoError> {
        let key = normalize_query(address)
            .ok_or_else(|| GeoError::InvalidArgument("address must not be empty".to_string()))?;
        info!("Refreshing cached geocode for query: {key}");
        self.fetch_and_store(key, address).await
    }

    /// Remove the cached outcome for `address`, returning whether one existed
    pub fn invalidate(&self, address: &str) -> Result<bool, GeoError> {
        let key = normalize_query(address)
            .ok_or_else(|| GeoError::InvalidArgument("address must not be empty".to_string()))?;
        let removed = self.cache.invalidate(key);
        if removed {
            info!("Invalidated cached geocode for query: {key}");
        }
        Ok(removed)
    }

    /// Render a static map. Never cached; every call reaches upstream.
    pub async fn static_map(&self, lon: f64, lat: f64, with_marker: bool) -> Result<MapImage, GeoError> {
        validate_coordinates(lon, lat)?;

        let request = StaticMapRequest {
            lon,
            lat,
            with_marker,
        };
        self.provider
            .static_map(request)
            .await
            .map_err(|e| self.normalize_failure("static map", e))
    }

    fn lookup_cached(&self, key: &str) -> Option<Result<GeocodeResult, GeoError>> {
        let entry = self.cache.get(key)?;
        debug!("Geocode cache hit for query: {key}");
        Some(match entry.outcome {
            CachedOutcome::Found(result) => Ok(result),
            CachedOutcome::NoMatch => Err(GeoError::NotFound),
        })
    }

    async fn fetch_and_store(&self, key: &str, address: &str) -> Result<GeocodeResult, GeoError> {
        match self.provider.geocode(address).await {
            Ok(Some(result)) => {
                self.cache
                    .put(key, CachedOutcome::Found(result.clone()), self.config.positive_ttl);
                Ok(result)
            }
            Ok(None) => {
                info!("No geocode match for query: {key}");
                self.cache.put(key, CachedOutcome::NoMatch, self.config.negative_ttl);
                Err(GeoError::NotFound)
            }
            Err(e) => Err(self.normalize_failure("geocode", e)),
        }
    }

    fn normalize_failure(&self, operation: &str, err: ProviderError) -> GeoError {
        let normalized = GeoError::from(err);
        match &normalized {
            GeoError::UpstreamConfigError(detail) => {
                error!("Upstream {operation} rejected our configuration, operator action needed: {detail}")
            }
            other => warn!("Upstream {operation} failed: {other}"),
        }
        normalized
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.len()
    }
}

/// Check longitude is within [-180, 180] and latitude within [-90, 90]
pub fn validate_coordinates(lon: f64, lat: f64) -> Result<(), GeoError> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(GeoError::InvalidArgument(format!(
            "longitude must be within [-180, 180], got {lon}"
        )));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(GeoError::InvalidArgument(format!(
            "latitude must be within [-90, 90], got {lat}"
        )));
    }
    Ok(())
}
