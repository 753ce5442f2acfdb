//! Driver location telemetry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device position as produced by the OS location provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// One sample sent to the backend. Ephemeral: built, transmitted once,
/// dropped on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSample {
    #[serde(rename = "entregador_id")]
    pub driver_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(driver_id: i64, position: Position) -> Self {
        Self {
            driver_id,
            latitude: position.latitude,
            longitude: position.longitude,
            timestamp: Utc::now(),
        }
    }
}
