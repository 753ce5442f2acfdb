//! Persistent geocoding cache.
//!
//! One JSON file in the cache directory holds the whole map, keyed by the
//! normalized address string. Entries older than the retention window are
//! treated as expired and evicted on access. The cache is exclusively
//! owned by the geocoding resolver; a re-insert with equivalent data is
//! harmless, so last-writer-wins needs no locking beyond the resolver's.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::simplify::cache_key;
use super::Coordinates;

/// Cache file name in the cache directory
const CACHE_FILE: &str = "geocode_cache.json";

/// Entries older than this are re-fetched. Street coordinates do not
/// move; 30 days mostly bounds damage from a bad upstream answer.
const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeCacheEntry {
    pub coords: Coordinates,
    pub cached_at: DateTime<Utc>,
}

impl GeocodeCacheEntry {
    fn is_expired(&self) -> bool {
        Utc::now() - self.cached_at > Duration::days(RETENTION_DAYS)
    }
}

pub struct GeocodeCache {
    path: PathBuf,
    entries: HashMap<String, GeocodeCacheEntry>,
}

impl GeocodeCache {
    /// Open the cache, loading any existing file. A missing or corrupt
    /// file starts an empty cache; geocoding must work without it.
    pub fn open(cache_dir: &Path) -> Self {
        let path = cache_dir.join(CACHE_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<HashMap<String, GeocodeCacheEntry>>(
                &contents,
            ) {
                Ok(entries) => {
                    debug!(count = entries.len(), "Loaded geocode cache");
                    entries
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse geocode cache, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, entries }
    }

    /// Look up a non-expired entry for an address. An expired entry is
    /// evicted so the caller re-fetches.
    pub fn get(&mut self, address: &str) -> Option<Coordinates> {
        let key = cache_key(address);
        match self.entries.get(&key) {
            Some(entry) if !entry.is_expired() => Some(entry.coords),
            Some(_) => {
                debug!(key = %key, "Geocode cache entry expired, evicting");
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Store coordinates under the normalized address key and persist.
    /// A persistence failure is logged, not fatal: the in-memory entry
    /// still serves this session.
    pub fn insert(&mut self, address: &str, coords: Coordinates) {
        self.entries.insert(
            cache_key(address),
            GeocodeCacheEntry {
                coords,
                cached_at: Utc::now(),
            },
        );
        if let Err(e) = self.save() {
            warn!(error = %e, "Failed to persist geocode cache");
        }
    }

    /// Drop all expired entries, persisting if anything was removed.
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "Purged expired geocode cache entries");
            if let Err(e) = self.save() {
                warn!(error = %e, "Failed to persist geocode cache after purge");
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create cache directory")?;
        }
        let contents = serde_json::to_string(&self.entries)?;
        std::fs::write(&self.path, contents).context("Failed to write geocode cache file")?;
        Ok(())
    }
}
