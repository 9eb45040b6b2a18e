//! Distance-matrix provider adapter: origin plus destination list to
//! durations and distances.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::errors::ServiceError;
use crate::geo::GeoPoint;

/// Provider hard limit on destinations per request.
pub const MAX_DESTINATIONS_PER_CALL: usize = 25;

/// Routing options forwarded to the provider.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub traffic_model: Option<String>,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
}

/// A routable origin-to-destination leg.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteLeg {
    pub minutes: f64,
    pub distance_km: f64,
    pub distance_text: String,
    pub duration_text: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistanceMatrixApi: Send + Sync {
    /// Route one origin against up to [`MAX_DESTINATIONS_PER_CALL`]
    /// destinations. `None` entries mean the provider found no route for
    /// that destination; a top-level `Err` means the whole call failed and
    /// callers should fall back to geometric estimates.
    async fn routes(
        &self,
        origin: GeoPoint,
        destinations: &[GeoPoint],
        options: &RouteOptions,
    ) -> Result<Vec<Option<RouteLeg>>, ServiceError>;
}

/// Wire format of the distance-matrix provider (Google-style rows/elements).
#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    duration: Option<TextValue>,
    duration_in_traffic: Option<TextValue>,
    distance: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
    /// Seconds for durations, meters for distances
    value: f64,
}

pub struct HttpDistanceMatrixClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl HttpDistanceMatrixClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ServiceError> {
        if api_key.trim().is_empty() {
            return Err(ServiceError::Configuration(
                "distance-matrix provider API key is not configured".to_string(),
            ));
        }
        let base_url = Url::parse(base_url).map_err(|e| {
            ServiceError::Configuration(format!("invalid distance-matrix URL: {}", e))
        })?;
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

    fn format_point(p: &GeoPoint) -> String {
        format!("{},{}", p.lat, p.lng)
    }

    fn leg_from_element(element: &MatrixElement) -> Option<RouteLeg> {
        if element.status != "OK" {
            return None;
        }
        // Prefer the traffic-aware duration when the provider returns one.
        let duration = element
            .duration_in_traffic
            .as_ref()
            .or(element.duration.as_ref())?;
        let distance = element.distance.as_ref()?;
        Some(RouteLeg {
            minutes: duration.value / 60.0,
            distance_km: distance.value / 1000.0,
            distance_text: distance.text.clone(),
            duration_text: duration.text.clone(),
        })
    }
}

#[async_trait]
impl DistanceMatrixApi for HttpDistanceMatrixClient {
    async fn routes(
        &self,
        origin: GeoPoint,
        destinations: &[GeoPoint],
        options: &RouteOptions,
    ) -> Result<Vec<Option<RouteLeg>>, ServiceError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }
        if destinations.len() > MAX_DESTINATIONS_PER_CALL {
            return Err(ServiceError::InvalidInput(format!(
                "at most {} destinations per call, got {}",
                MAX_DESTINATIONS_PER_CALL,
                destinations.len()
            )));
        }

        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("origins", &Self::format_point(&origin));
            pairs.append_pair(
                "destinations",
                &destinations
                    .iter()
                    .map(Self::format_point)
                    .collect::<Vec<_>>()
                    .join("|"),
            );
            if let Some(model) = &options.traffic_model {
                pairs.append_pair("traffic_model", model);
                pairs.append_pair("departure_time", "now");
            }
            let mut avoid = Vec::new();
            if options.avoid_highways {
                avoid.push("highways");
            }
            if options.avoid_tolls {
                avoid.push("tolls");
            }
            if !avoid.is_empty() {
                pairs.append_pair("avoid", &avoid.join("|"));
            }
            pairs.append_pair("key", &self.api_key);
        }

        let response = self.http.get(url).send().await.map_err(|e| {
            warn!(error = %e, "distance-matrix provider request failed");
            ServiceError::ExternalService("distance-matrix provider unavailable".to_string())
        })?;

        let body: MatrixResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "distance-matrix provider returned malformed body");
            ServiceError::ExternalService("malformed distance-matrix response".to_string())
        })?;

        if body.status != "OK" {
            warn!(status = %body.status, "distance-matrix provider rejected request");
            return Err(ServiceError::ExternalService(format!(
                "provider status {}",
                body.status
            )));
        }

        let row = body.rows.first().ok_or_else(|| {
            ServiceError::ExternalService("distance-matrix response had no rows".to_string())
        })?;

        let mut legs: Vec<Option<RouteLeg>> =
            row.elements.iter().map(Self::leg_from_element).collect();
        // Pad short responses so callers can zip against their destinations.
        legs.resize(destinations.len(), None);
        Ok(legs)
    }
}
