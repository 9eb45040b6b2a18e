//! Provider adapter tests against a local mock HTTP server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use geopricing_api::clients::distance_matrix::{
    DistanceMatrixApi, HttpDistanceMatrixClient, RouteOptions,
};
use geopricing_api::clients::geocoding::{Geocoder, HttpGeocodingClient};
use geopricing_api::errors::ServiceError;
use geopricing_api::geo::GeoPoint;

const TIMEOUT: Duration = Duration::from_secs(5);

fn geocode_body() -> serde_json::Value {
    json!({
        "status": "OK",
        "results": [{
            "formatted_address": "123 Main St, San Francisco, CA 94102, USA",
            "geometry": { "location": { "lat": 37.7793, "lng": -122.4193 } },
            "address_components": [
                { "long_name": "San Francisco", "types": ["locality", "political"] },
                { "long_name": "California", "types": ["administrative_area_level_1"] },
                { "long_name": "94102", "types": ["postal_code"] }
            ]
        }]
    })
}

#[tokio::test]
async fn geocoding_parses_a_full_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode/json"))
        .and(query_param("address", "123 Main St"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(geocode_body()))
        .mount(&server)
        .await;

    let client = HttpGeocodingClient::new(
        &format!("{}/geocode/json", server.uri()),
        "test-key",
        TIMEOUT,
    )
    .unwrap();

    let geocoded = client.geocode("123 Main St").await.unwrap();
    assert!((geocoded.point.lat - 37.7793).abs() < 1e-9);
    assert!((geocoded.point.lng + 122.4193).abs() < 1e-9);
    assert_eq!(
        geocoded.normalized_address,
        "123 Main St, San Francisco, CA 94102, USA"
    );
    assert_eq!(geocoded.city.as_deref(), Some("San Francisco"));
    assert_eq!(geocoded.region.as_deref(), Some("California"));
    assert_eq!(geocoded.postal_code.as_deref(), Some("94102"));
}

#[tokio::test]
async fn geocoding_zero_results_is_a_geocoding_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "ZERO_RESULTS", "results": [] })),
        )
        .mount(&server)
        .await;

    let client =
        HttpGeocodingClient::new(&format!("{}/geocode/json", server.uri()), "k", TIMEOUT).unwrap();

    let err = client.geocode("gibberish").await.unwrap_err();
    assert!(matches!(err, ServiceError::GeocodingFailed(_)));
}

#[tokio::test]
async fn geocoding_out_of_range_coordinates_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [{
                "formatted_address": "nowhere",
                "geometry": { "location": { "lat": 123.0, "lng": 500.0 } },
                "address_components": []
            }]
        })))
        .mount(&server)
        .await;

    let client =
        HttpGeocodingClient::new(&format!("{}/geocode/json", server.uri()), "k", TIMEOUT).unwrap();

    let err = client.geocode("anywhere").await.unwrap_err();
    assert!(matches!(err, ServiceError::GeocodingFailed(_)));
}

#[tokio::test]
async fn distance_matrix_parses_rows_and_missing_routes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/distancematrix/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "rows": [{
                "elements": [
                    {
                        "status": "OK",
                        "duration": { "text": "12 mins", "value": 720.0 },
                        "distance": { "text": "8.4 km", "value": 8400.0 }
                    },
                    { "status": "ZERO_RESULTS" }
                ]
            }]
        })))
        .mount(&server)
        .await;

    let client = HttpDistanceMatrixClient::new(
        &format!("{}/distancematrix/json", server.uri()),
        "k",
        TIMEOUT,
    )
    .unwrap();

    let legs = client
        .routes(
            GeoPoint::new(37.7749, -122.4194),
            &[GeoPoint::new(37.8044, -122.2712), GeoPoint::new(0.0, 0.0)],
            &RouteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(legs.len(), 2);
    let leg = legs[0].as_ref().unwrap();
    assert!((leg.minutes - 12.0).abs() < 1e-9);
    assert!((leg.distance_km - 8.4).abs() < 1e-9);
    assert!(legs[1].is_none());
}

#[tokio::test]
async fn distance_matrix_sends_routing_options() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/distancematrix/json"))
        .and(query_param("traffic_model", "pessimistic"))
        .and(query_param("departure_time", "now"))
        .and(query_param("avoid", "highways|tolls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "rows": [{ "elements": [{ "status": "ZERO_RESULTS" }] }]
        })))
        .mount(&server)
        .await;

    let client = HttpDistanceMatrixClient::new(
        &format!("{}/distancematrix/json", server.uri()),
        "k",
        TIMEOUT,
    )
    .unwrap();

    let options = RouteOptions {
        traffic_model: Some("pessimistic".into()),
        avoid_highways: true,
        avoid_tolls: true,
    };
    let legs = client
        .routes(GeoPoint::new(1.0, 1.0), &[GeoPoint::new(1.1, 1.1)], &options)
        .await
        .unwrap();
    assert_eq!(legs, vec![None]);
}

#[tokio::test]
async fn distance_matrix_provider_rejection_is_an_external_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/distancematrix/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "OVER_QUERY_LIMIT", "rows": [] })),
        )
        .mount(&server)
        .await;

    let client = HttpDistanceMatrixClient::new(
        &format!("{}/distancematrix/json", server.uri()),
        "k",
        TIMEOUT,
    )
    .unwrap();

    let err = client
        .routes(
            GeoPoint::new(1.0, 1.0),
            &[GeoPoint::new(1.1, 1.1)],
            &RouteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ExternalService(_)));
}
