pub mod geopricing;

use std::time::Duration;

use axum::{routing::get, routing::post, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::rate_limiter::RateLimitLayer;
use crate::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Assemble the public router. The rate-limit layer wraps everything except
/// the paths it skips internally (health, docs).
pub fn router(state: AppState) -> Router {
    let rate_limit = RateLimitLayer::new(state.limiter.clone());

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/geopricing/calculate", post(geopricing::calculate))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(rate_limit)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness plus component status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service healthy"))
)]
pub async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "cache_entries": state.cache.live_entries(),
        "rate_limiter_identifiers": state.limiter.active_identifiers(),
    }))
}

async fn openapi_json() -> Json<Value> {
    use utoipa::OpenApi;
    Json(
        serde_json::to_value(crate::openapi::ApiDoc::openapi())
            .unwrap_or_else(|_| json!({"error": "failed to render OpenAPI document"})),
    )
}
