//! Geopricing API Library
//!
//! Dynamic geopricing calculation engine: derives a location-based price
//! adjustment from travel distance/time between a service origin and the
//! customer, combines it with zone, seasonal, and service-specific modifiers,
//! and yields a final price. Expensive network lookups are cached, provider
//! failures degrade to geometric estimates, and a fixed-window rate limiter
//! guards the public calculation path.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod cache;
pub mod clients;
pub mod config;
pub mod errors;
pub mod geo;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod rate_limiter;
pub mod services;
pub mod stores;

use std::sync::Arc;

use crate::cache::InMemoryCache;
use crate::rate_limiter::FixedWindowLimiter;
use crate::services::geopricing::GeopricingService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub geopricing: Arc<GeopricingService>,
    pub limiter: FixedWindowLimiter,
    pub cache: InMemoryCache,
}
