//! Address lookup for school locations.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GeocoderConfig;
use crate::error::AppError;

/// Resolved location for a school address.
#[derive(Debug, Clone, Default)]
pub struct Location {
    pub formatted_address: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zipcode: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve an address. Failure is fatal to the school write that
    /// triggered it.
    async fn geocode(&self, address: &str) -> Result<Location, AppError>;
}

/// Nominatim-backed geocoder.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct NominatimResult {
    display_name: String,
    lon: String,
    lat: String,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Deserialize, Default)]
struct NominatimAddress {
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    state: Option<String>,
    country_code: Option<String>,
    postcode: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Location, AppError> {
        let results: Vec<NominatimResult> = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", address),
                ("format", "json"),
                ("limit", "1"),
                ("addressdetails", "1"),
            ])
            .header(reqwest::header::USER_AGENT, "studyabroad/0.1")
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("geocoder request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("geocoder response invalid: {}", e)))?;

        let first = results
            .into_iter()
            .next()
            .ok_or_else(|| AppError::BadRequest("Address could not be resolved".into()))?;

        let address_parts = first.address.unwrap_or_default();
        Ok(Location {
            formatted_address: first.display_name,
            longitude: first.lon.parse().ok(),
            latitude: first.lat.parse().ok(),
            street: address_parts.road,
            city: address_parts.city.or(address_parts.town),
            state: address_parts.state,
            country: address_parts.country_code.map(|c| c.to_uppercase()),
            zipcode: address_parts.postcode,
        })
    }
}

/// Echoes the submitted address back without a network call. Used by tests
/// and local development.
pub struct StaticGeocoder;

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, address: &str) -> Result<Location, AppError> {
        Ok(Location {
            formatted_address: address.to_string(),
            ..Location::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_geocoder_echoes_address() {
        let location = StaticGeocoder.geocode("1 Main St, Springfield").await.unwrap();
        assert_eq!(location.formatted_address, "1 Main St, Springfield");
        assert!(location.longitude.is_none());
    }
}
