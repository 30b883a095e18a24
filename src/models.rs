//! Data models for scraped park records and the events that carry them.
//!
//! - [`Record`]: one normalized park, the unit every sink receives
//! - [`Activity`]: a named activity offered at a park
//! - [`Coordinates`]: a latitude/longitude pair
//! - [`ScrapedEvent`]: a successfully extracted [`Record`] plus timing data
//!
//! Records serialize with camelCase keys, which is the shape the downstream
//! parks API and the per-record JSON files expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An activity offered at a park (e.g. "Hiking").
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Activity {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Activity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }
}

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A normalized park record.
///
/// A record is only ever published when [`Record::is_valid`] holds: the name
/// is non-empty and both coordinates are finite numbers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Display name of the park.
    pub name: String,
    /// Code of the configured source that produced this record.
    pub source_code: String,
    /// Street address, when the source page exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Activities in page order.
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl Record {
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && self.latitude.is_finite() && self.longitude.is_finite()
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Emitted once for every record that was extracted successfully.
///
/// Subscribers receive it by reference and cannot mutate it.
#[derive(Debug, Clone)]
pub struct ScrapedEvent {
    pub record: Record,
    pub source_code: String,
    /// Detail page the record was scraped from.
    pub url: String,
    /// Time spent in the retrying fetch unit, including backoff sleeps.
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}
