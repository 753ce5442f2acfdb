//! The geocoding resolver: cache, fallback chain, global rate limit.
//!
//! `resolve` never fails: every provider error, timeout or invalid
//! response is swallowed per attempt and the chain moves on; exhaustion
//! yields `None` and the caller offers manual navigation instead of a
//! map.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::ApiError;

use super::cache::GeocodeCache;
use super::simplify::candidate_queries;
use super::Coordinates;

/// Nominatim usage policy: at most one request per second. A little
/// slack keeps clock jitter from tripping the provider's limiter.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

/// Geocoding request timeout in seconds
const GEOCODE_TIMEOUT_SECS: u64 = 10;

const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Nominatim requires an identifying client header.
const GEOCODER_USER_AGENT: &str = "GasRun-Mobile/1.0 (gasrun@example.com)";

/// Restrict results to Brazil; delivery addresses are domestic.
const COUNTRY_FILTER: &str = "br";

/// One raw provider result. `lat`/`lon` arrive as strings and are only
/// trusted after parsing and range validation.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeHit {
    pub lat: String,
    pub lon: String,
    #[serde(rename = "display_name", default)]
    pub display_name: Option<String>,
}

/// Upstream geocoding provider, injectable for tests.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeHit>, ApiError>;
}

/// Nominatim-backed provider.
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new() -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GEOCODE_TIMEOUT_SECS))
            .user_agent(GEOCODER_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: NOMINATIM_BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl GeocodeProvider for NominatimClient {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeHit>, ApiError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", "1"),
                ("addressdetails", "1"),
                ("countrycodes", COUNTRY_FILTER),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        Ok(response.json().await?)
    }
}

/// Serializes outbound requests so no two are issued closer together
/// than the minimum interval, across all callers sharing the resolver.
/// The lock is held over the wait on purpose: concurrent callers queue
/// behind it and each inherits the previous caller's send time.
struct RateLimiter {
    min_interval: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Waiting out geocoding rate limit");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct GeocodingResolver<P> {
    provider: P,
    cache: Mutex<GeocodeCache>,
    limiter: RateLimiter,
}

fn lock_cache(cache: &Mutex<GeocodeCache>) -> std::sync::MutexGuard<'_, GeocodeCache> {
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<P: GeocodeProvider> GeocodingResolver<P> {
    pub fn new(provider: P, cache: GeocodeCache) -> Self {
        Self {
            provider,
            cache: Mutex::new(cache),
            limiter: RateLimiter::new(MIN_REQUEST_INTERVAL),
        }
    }

    /// Resolve a delivery address to coordinates, or `None` when every
    /// strategy fails. Successful results are cached under the ORIGINAL
    /// normalized address, not the simplified query that produced them.
    pub async fn resolve(&self, address: &str) -> Option<Coordinates> {
        if let Some(coords) = lock_cache(&self.cache).get(address) {
            debug!(address, "Geocode cache hit");
            return Some(coords);
        }

        for query in candidate_queries(address) {
            if let Some(coords) = self.attempt(&query).await {
                lock_cache(&self.cache).insert(address, coords);
                return Some(coords);
            }
        }

        debug!(address, "No coordinates found after all strategies");
        None
    }

    /// Drop expired cache entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        lock_cache(&self.cache).purge_expired()
    }

    async fn attempt(&self, query: &str) -> Option<Coordinates> {
        self.limiter.acquire().await;
        debug!(query, "Attempting geocode");

        let hits = match self.provider.search(query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(query, error = %e, "Geocoding attempt failed");
                return None;
            }
        };

        let hit = hits.first()?;
        let lat: f64 = hit.lat.parse().ok()?;
        let lon: f64 = hit.lon.parse().ok()?;
        match Coordinates::validated(lat, lon) {
            Some(coords) => Some(coords),
            None => {
                warn!(query, lat = %hit.lat, lon = %hit.lon, "Provider returned invalid coordinates");
                None
            }
        }
    }
}
