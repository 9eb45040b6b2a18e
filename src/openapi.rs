//! OpenAPI document for the public surface.

use utoipa::OpenApi;

use crate::errors::ErrorResponse;
use crate::geo::GeoPoint;
use crate::handlers::geopricing::{CalculateRequest, CalculateRequestOptions};
use crate::models::{
    Adjustment, CalculationResult, DriveTimeSummary, Location, MatchedZoneSummary,
    PerServicePrice, ServiceItem,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Geopricing API",
        description = "Dynamic location-based price calculation with zone matching, drive-time caching, and rate limiting"
    ),
    paths(crate::handlers::geopricing::calculate, crate::handlers::health),
    components(schemas(
        CalculateRequest,
        CalculateRequestOptions,
        CalculationResult,
        Adjustment,
        DriveTimeSummary,
        ErrorResponse,
        GeoPoint,
        Location,
        MatchedZoneSummary,
        PerServicePrice,
        ServiceItem,
    )),
    tags(
        (name = "geopricing", description = "Price calculation"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
