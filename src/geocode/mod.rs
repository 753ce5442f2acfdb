//! Geocoding: free-form delivery address → coordinates.
//!
//! Resolution goes cache first, then a prioritized chain of
//! progressively simpler queries against the geocoding provider, under a
//! strict global rate limit. "Not found" is a normal outcome (`None`),
//! never an error: the caller falls back to manual navigation.

pub mod cache;
pub mod resolver;
pub mod simplify;

use serde::{Deserialize, Serialize};

pub use cache::GeocodeCache;
pub use resolver::{GeocodeHit, GeocodeProvider, GeocodingResolver, NominatimClient};

/// Validated geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build coordinates only if both values are finite and in range;
    /// anything else from the provider is treated as a miss.
    pub fn validated(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }
}
