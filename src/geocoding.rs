//! Address to coordinate lookup.
//!
//! [`Geocoder`] is the narrow contract extractors depend on. [`MapboxGeocoder`]
//! implements it against the Mapbox places API, which answers with GeoJSON
//! features whose `center` is `[longitude, latitude]`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::ScrapeError;
use crate::models::Coordinates;

const MAPBOX_PLACES_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Coordinates, ScrapeError>;
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    center: Vec<f64>,
    #[serde(default)]
    place_name: Option<String>,
}

impl PlacesResponse {
    fn best_match(self, address: &str) -> Result<Coordinates, ScrapeError> {
        let feature = self
            .features
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::Geocoding(format!("no results for address: {address}")))?;

        match feature.center.as_slice() {
            [longitude, latitude, ..] => {
                debug!(place = ?feature.place_name, latitude, longitude, "Geocoded address");
                Ok(Coordinates {
                    latitude: *latitude,
                    longitude: *longitude,
                })
            }
            _ => Err(ScrapeError::Geocoding(format!(
                "invalid coordinates in response for address: {address}"
            ))),
        }
    }
}

/// [`Geocoder`] backed by the Mapbox places endpoint.
#[derive(Debug, Clone)]
pub struct MapboxGeocoder {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl MapboxGeocoder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ScrapeError> {
        Self::with_base_url(api_key, MAPBOX_PLACES_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ScrapeError::Client)?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn request_url(&self, address: &str) -> String {
        format!(
            "{}/{}.json?access_token={}&limit=1",
            self.base_url,
            urlencoding::encode(address),
            urlencoding::encode(&self.api_key)
        )
    }
}

#[async_trait]
impl Geocoder for MapboxGeocoder {
    // The request URL carries the access token, so it is never logged.
    #[instrument(level = "debug", skip_all, fields(%address))]
    async fn geocode(&self, address: &str) -> Result<Coordinates, ScrapeError> {
        if address.trim().is_empty() {
            return Err(ScrapeError::Geocoding("address cannot be empty".into()));
        }
        if self.api_key.is_empty() {
            return Err(ScrapeError::Geocoding("Mapbox API key is not configured".into()));
        }

        let response = self
            .client
            .get(self.request_url(address))
            .send()
            .await
            .map_err(|e| ScrapeError::Geocoding(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Geocoding(format!(
                "geocoding API returned status {}",
                status.as_u16()
            )));
        }

        let places: PlacesResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::Geocoding(format!("failed to decode response: {e}")))?;
        places.best_match(address)
    }
}
