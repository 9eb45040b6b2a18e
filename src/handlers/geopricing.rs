use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{CalculationResult, ServiceItem};
use crate::services::geopricing::CalculationOptions;
use crate::AppState;

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
#[schema(example = json!({
    "business_id": "550e8400-e29b-41d4-a716-446655440000",
    "customer_address": "123 Main Street, San Francisco, CA 94102",
    "services": [{"service_type": "lawn_treatment", "area_sqft": "5000"}]
}))]
pub struct CalculateRequest {
    pub business_id: Uuid,
    /// Free-form customer address, resolved by the geocoder
    #[validate(length(min = 1, max = 512))]
    pub customer_address: String,
    #[validate(length(min = 1, max = 50))]
    pub services: Vec<ServiceItem>,
    #[serde(default)]
    pub options: Option<CalculateRequestOptions>,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct CalculateRequestOptions {
    /// Consult the drive-time cache (default true)
    pub use_cache: Option<bool>,
    /// Provider traffic model, e.g. "best_guess"
    pub traffic_model: Option<String>,
    #[serde(default)]
    pub avoid_highways: bool,
    #[serde(default)]
    pub avoid_tolls: bool,
    /// Pin the calculation to a specific shop origin
    pub preferred_origin_id: Option<Uuid>,
    /// Date the service will be performed; seasonal adjustments key off this
    pub service_date: Option<DateTime<Utc>>,
}

impl From<CalculateRequestOptions> for CalculationOptions {
    fn from(opts: CalculateRequestOptions) -> Self {
        CalculationOptions {
            use_cache: opts.use_cache.unwrap_or(true),
            traffic_model: opts.traffic_model,
            avoid_highways: opts.avoid_highways,
            avoid_tolls: opts.avoid_tolls,
            preferred_origin_id: opts.preferred_origin_id,
            service_date: opts.service_date,
        }
    }
}

/// Compute a location-adjusted price for a customer address.
#[utoipa::path(
    post,
    path = "/api/v1/geopricing/calculate",
    tag = "geopricing",
    request_body = CalculateRequest,
    responses(
        (status = 200, description = "Calculation complete", body = CalculationResult),
        (status = 404, description = "Address not found or unknown business", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded"),
        (status = 503, description = "Service misconfigured or unavailable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn calculate(
    State(state): State<AppState>,
    Json(request): Json<CalculateRequest>,
) -> Result<Json<CalculationResult>, ServiceError> {
    request.validate()?;

    let options: CalculationOptions = request.options.unwrap_or_default().into();
    let result = state
        .geopricing
        .calculate(
            request.business_id,
            &request.customer_address,
            &request.services,
            &options,
        )
        .await?;

    Ok(Json(result))
}
