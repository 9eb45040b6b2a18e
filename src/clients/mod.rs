//! Adapters for external mapping providers.

pub mod distance_matrix;
pub mod geocoding;

pub use distance_matrix::{DistanceMatrixApi, HttpDistanceMatrixClient, RouteLeg, RouteOptions};
pub use geocoding::{GeocodedAddress, Geocoder, HttpGeocodingClient};
