//! Geocoding provider adapter: address string to coordinates.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::errors::ServiceError;
use crate::geo::GeoPoint;

/// Outcome of a successful geocode.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    pub point: GeoPoint,
    pub normalized_address: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-form address to coordinates. Failure here is fatal for
    /// the calculation: no coordinates, no price.
    async fn geocode(&self, address: &str) -> Result<GeocodedAddress, ServiceError>;
}

/// Wire format of the geocoding provider (Google-style).
#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: WireLocation,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug)]
pub struct HttpGeocodingClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl HttpGeocodingClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ServiceError> {
        if api_key.trim().is_empty() {
            return Err(ServiceError::Configuration(
                "geocoding provider API key is not configured".to_string(),
            ));
        }
        let base_url = Url::parse(base_url)
            .map_err(|e| ServiceError::Configuration(format!("invalid geocoding URL: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Configuration(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn component<'a>(result: &'a GeocodeResult, kind: &str) -> Option<&'a str> {
        result
            .address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == kind))
            .map(|c| c.long_name.as_str())
    }
}

#[async_trait]
impl Geocoder for HttpGeocodingClient {
    async fn geocode(&self, address: &str) -> Result<GeocodedAddress, ServiceError> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("address", address)
            .append_pair("key", &self.api_key);

        let response = self.http.get(url).send().await.map_err(|e| {
            warn!(error = %e, "geocoding provider request failed");
            ServiceError::GeocodingFailed("provider unavailable".to_string())
        })?;

        let body: GeocodeResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "geocoding provider returned malformed body");
            ServiceError::GeocodingFailed("provider returned malformed response".to_string())
        })?;

        if body.status != "OK" || body.results.is_empty() {
            return Err(ServiceError::GeocodingFailed(format!(
                "no results (status {})",
                body.status
            )));
        }

        let top = &body.results[0];
        let point = GeoPoint::new(top.geometry.location.lat, top.geometry.location.lng);
        if !point.is_valid() {
            return Err(ServiceError::GeocodingFailed(
                "provider returned out-of-range coordinates".to_string(),
            ));
        }

        Ok(GeocodedAddress {
            point,
            normalized_address: top.formatted_address.clone(),
            city: Self::component(top, "locality").map(str::to_string),
            region: Self::component(top, "administrative_area_level_1").map(str::to_string),
            postal_code: Self::component(top, "postal_code").map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let err = HttpGeocodingClient::new(
            "https://maps.example.com/geocode/json",
            "  ",
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err =
            HttpGeocodingClient::new("not a url", "key", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }
}
