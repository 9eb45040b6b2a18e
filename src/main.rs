use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tokio::signal;
use tracing::{info, warn};

use geopricing_api as api;

use api::cache::{CacheSweeper, InMemoryCache};
use api::clients::{HttpDistanceMatrixClient, HttpGeocodingClient};
use api::models::{ShopOrigin, Zone};
use api::rate_limiter::{FixedWindowLimiter, LimiterSweeper, RateLimitConfig};
use api::services::drive_time::{DriveTimeConfig, DriveTimeResolver};
use api::services::geopricing::{GeopricingConfig, GeopricingService};
use api::stores::{InMemoryCalculationStore, InMemoryShopOriginStore, InMemoryZoneStore};

/// Shape of the optional seed file: origins and zones loaded at boot.
#[derive(Debug, Deserialize)]
struct SeedData {
    #[serde(default)]
    origins: Vec<ShopOrigin>,
    #[serde(default)]
    zones: Vec<Zone>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let provider_timeout = Duration::from_secs(cfg.provider_timeout_secs);

    // Provider clients; a missing API key fails here, not mid-request.
    let geocoder = Arc::new(
        HttpGeocodingClient::new(&cfg.geocoding_url, &cfg.maps_api_key, provider_timeout)
            .context("failed to build geocoding client")?,
    );
    let matrix_client = Arc::new(
        HttpDistanceMatrixClient::new(
            &cfg.distance_matrix_url,
            &cfg.maps_api_key,
            provider_timeout,
        )
        .context("failed to build distance-matrix client")?,
    );

    // Shared drive-time cache and its sweeper.
    let cache = InMemoryCache::new(cfg.cache_capacity);
    let sweep_interval = Duration::from_secs(cfg.sweep_interval_secs);
    let cache_sweeper = CacheSweeper::start(cache.clone(), sweep_interval);

    // Rate limiter guarding the public calculation path.
    let limiter = FixedWindowLimiter::new(RateLimitConfig {
        limit: cfg.rate_limit_requests,
        window: Duration::from_secs(cfg.rate_limit_window_secs),
        enable_headers: true,
    });
    let limiter_sweeper = LimiterSweeper::start(limiter.clone(), sweep_interval);

    // Stores, optionally seeded from a JSON file.
    let origin_store = Arc::new(InMemoryShopOriginStore::new());
    let zone_store = Arc::new(InMemoryZoneStore::new());
    if let Some(path) = &cfg.seed_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path))?;
        let seed: SeedData =
            serde_json::from_str(&raw).context("failed to parse seed file")?;
        info!(
            origins = seed.origins.len(),
            zones = seed.zones.len(),
            "seeding stores"
        );
        for origin in seed.origins {
            origin_store.insert(origin);
        }
        for zone in seed.zones {
            zone_store.insert(zone);
        }
    }

    let drive_time = Arc::new(DriveTimeResolver::new(
        matrix_client,
        Arc::new(cache.clone()),
        DriveTimeConfig {
            routing_factor: cfg.routing_factor,
            fallback_speed_kmh: cfg.fallback_speed_kmh,
            max_concurrent_chunks: cfg.max_concurrent_chunks,
        },
    ));

    let geopricing = Arc::new(GeopricingService::new(
        geocoder,
        origin_store,
        zone_store,
        drive_time,
        Some(Arc::new(InMemoryCalculationStore::new())),
        GeopricingConfig {
            minimum_charge: cfg.minimum_charge,
            round_to: cfg.round_to,
            result_ttl_secs: cfg.result_ttl_secs,
        },
    ));

    let state = api::AppState {
        config: cfg.clone(),
        geopricing,
        limiter,
        cache,
    };

    let app = api::handlers::router(state)
        .into_make_service_with_connect_info::<SocketAddr>();

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid listen address")?;
    info!(%addr, "geopricing API listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listen address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Stop background sweepers before exiting.
    cache_sweeper.stop().await;
    limiter_sweeper.stop().await;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    } else {
        info!("shutdown signal received");
    }
}
