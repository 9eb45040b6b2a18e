//! Drive-time resolution with caching and graceful degradation.
//!
//! A resolved drive time is either a measured provider route or, when the
//! provider fails, times out, or finds no route, a geometric estimate:
//! Haversine distance scaled by a routing-inefficiency factor and converted
//! to minutes at an assumed urban average speed. Estimates are flagged so
//! callers can tell measured from estimated, and are never cached.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::CacheBackend;
use crate::clients::distance_matrix::{
    DistanceMatrixApi, RouteLeg, RouteOptions, MAX_DESTINATIONS_PER_CALL,
};
use crate::geo::GeoPoint;

/// Shared-cache entry TTL; entries are never served past this age.
pub const DRIVE_TIME_CACHE_TTL: Duration = Duration::from_secs(900);

#[derive(Debug, Clone)]
pub struct DriveTimeOptions {
    pub use_cache: bool,
    pub route: RouteOptions,
}

impl Default for DriveTimeOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            route: RouteOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriveTimeEstimate {
    pub minutes: f64,
    pub distance_km: f64,
    pub distance_text: String,
    pub duration_text: String,
    pub from_cache: bool,
    /// True when this is a geometric fallback, not a provider route
    pub estimated: bool,
}

/// Externalized cache value shape: `drivetime:{originKey}:{destKey}`.
#[derive(Debug, Serialize, Deserialize)]
struct CachedDriveTime {
    minutes: f64,
    distance_km: f64,
    distance_text: String,
    duration_text: String,
    calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DriveTimeConfig {
    /// Multiplier from great-circle to plausible road distance
    pub routing_factor: f64,
    /// Assumed urban average speed for fallback estimates
    pub fallback_speed_kmh: f64,
    /// Cap on concurrent in-flight provider calls during batch fan-out
    pub max_concurrent_chunks: usize,
}

impl Default for DriveTimeConfig {
    fn default() -> Self {
        Self {
            routing_factor: 1.3,
            fallback_speed_kmh: 40.0,
            max_concurrent_chunks: 4,
        }
    }
}

pub struct DriveTimeResolver {
    client: Arc<dyn DistanceMatrixApi>,
    cache: Arc<dyn CacheBackend>,
    config: DriveTimeConfig,
}

impl DriveTimeResolver {
    pub fn new(
        client: Arc<dyn DistanceMatrixApi>,
        cache: Arc<dyn CacheBackend>,
        config: DriveTimeConfig,
    ) -> Self {
        Self {
            client,
            cache,
            config,
        }
    }

    fn cache_key(origin: &GeoPoint, destination: &GeoPoint) -> String {
        format!(
            "drivetime:{}:{}",
            origin.rounded_key(),
            destination.rounded_key()
        )
    }

    /// Resolve drive time for one destination. Never fails: provider trouble
    /// degrades to a geometric estimate.
    pub async fn resolve(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        options: &DriveTimeOptions,
    ) -> DriveTimeEstimate {
        let key = Self::cache_key(&origin, &destination);

        if options.use_cache {
            if let Some(cached) = self.read_cache(&key).await {
                counter!("drive_time_cache_hits_total", 1);
                return cached;
            }
            counter!("drive_time_cache_misses_total", 1);
        }

        match self.client.routes(origin, &[destination], &options.route).await {
            Ok(legs) => match legs.into_iter().next().flatten() {
                Some(leg) => {
                    let estimate = Self::measured(&leg);
                    if options.use_cache {
                        self.write_cache(&key, &leg).await;
                    }
                    estimate
                }
                None => {
                    debug!("no route between origin and destination, using estimate");
                    self.fallback(origin, destination)
                }
            },
            Err(err) => {
                warn!(error = %err, "drive time provider call failed, using estimate");
                self.fallback(origin, destination)
            }
        }
    }

    /// Resolve drive times for many destinations. Cached destinations are
    /// served directly; the rest fan out to the provider in provider-sized
    /// chunks. A failed chunk degrades its entries to estimates without
    /// touching completed chunks; output order matches input order.
    pub async fn resolve_batch(
        &self,
        origin: GeoPoint,
        destinations: &[GeoPoint],
        options: &DriveTimeOptions,
    ) -> Vec<DriveTimeEstimate> {
        let mut resolved: Vec<Option<DriveTimeEstimate>> = vec![None; destinations.len()];
        let mut pending: Vec<(usize, GeoPoint)> = Vec::new();

        if options.use_cache {
            for (index, dest) in destinations.iter().enumerate() {
                let key = Self::cache_key(&origin, dest);
                match self.read_cache(&key).await {
                    Some(cached) => {
                        counter!("drive_time_cache_hits_total", 1);
                        resolved[index] = Some(cached);
                    }
                    None => {
                        counter!("drive_time_cache_misses_total", 1);
                        pending.push((index, *dest));
                    }
                }
            }
        } else {
            pending = destinations.iter().copied().enumerate().collect();
        }

        let chunks: Vec<Vec<(usize, GeoPoint)>> = pending
            .chunks(MAX_DESTINATIONS_PER_CALL)
            .map(|c| c.to_vec())
            .collect();

        let fetched: Vec<Vec<(usize, DriveTimeEstimate)>> = stream::iter(chunks)
            .map(|chunk| async move {
                let points: Vec<GeoPoint> = chunk.iter().map(|(_, p)| *p).collect();
                match self.client.routes(origin, &points, &options.route).await {
                    Ok(legs) => chunk
                        .iter()
                        .zip(legs)
                        .map(|((index, dest), leg)| {
                            let estimate = match leg {
                                Some(leg) => Self::measured(&leg),
                                None => self.fallback(origin, *dest),
                            };
                            (*index, estimate)
                        })
                        .collect(),
                    Err(err) => {
                        warn!(error = %err, "batch chunk failed, estimating its entries");
                        chunk
                            .iter()
                            .map(|(index, dest)| (*index, self.fallback(origin, *dest)))
                            .collect()
                    }
                }
            })
            .buffered(self.config.max_concurrent_chunks.max(1))
            .collect()
            .await;

        for (index, estimate) in fetched.into_iter().flatten() {
            // Cache measured legs; estimates stay uncached.
            if options.use_cache && !estimate.estimated {
                let key = Self::cache_key(&origin, &destinations[index]);
                let leg = RouteLeg {
                    minutes: estimate.minutes,
                    distance_km: estimate.distance_km,
                    distance_text: estimate.distance_text.clone(),
                    duration_text: estimate.duration_text.clone(),
                };
                self.write_cache(&key, &leg).await;
            }
            resolved[index] = Some(estimate);
        }

        resolved.into_iter().flatten().collect()
    }

    fn measured(leg: &RouteLeg) -> DriveTimeEstimate {
        DriveTimeEstimate {
            minutes: leg.minutes.max(0.0),
            distance_km: leg.distance_km.max(0.0),
            distance_text: leg.distance_text.clone(),
            duration_text: leg.duration_text.clone(),
            from_cache: false,
            estimated: false,
        }
    }

    /// Great-circle distance scaled for road inefficiency, at the configured
    /// urban average speed.
    fn fallback(&self, origin: GeoPoint, destination: GeoPoint) -> DriveTimeEstimate {
        counter!("drive_time_fallback_total", 1);
        let road_km = origin.haversine_km(&destination) * self.config.routing_factor;
        let minutes = road_km / self.config.fallback_speed_kmh * 60.0;
        DriveTimeEstimate {
            minutes,
            distance_km: road_km,
            distance_text: format!("{:.1} km", road_km),
            duration_text: format!("{} mins", minutes.round() as i64),
            from_cache: false,
            estimated: true,
        }
    }

    async fn read_cache(&self, key: &str) -> Option<DriveTimeEstimate> {
        let raw = match self.cache.get(key).await {
            Ok(value) => value?,
            Err(err) => {
                warn!(error = %err, "drive time cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<CachedDriveTime>(&raw) {
            Ok(cached) => Some(DriveTimeEstimate {
                minutes: cached.minutes,
                distance_km: cached.distance_km,
                distance_text: cached.distance_text,
                duration_text: cached.duration_text,
                from_cache: true,
                estimated: false,
            }),
            Err(err) => {
                warn!(error = %err, "dropping malformed drive time cache entry");
                let _ = self.cache.delete(key).await;
                None
            }
        }
    }

    async fn write_cache(&self, key: &str, leg: &RouteLeg) {
        let entry = CachedDriveTime {
            minutes: leg.minutes,
            distance_km: leg.distance_km,
            distance_text: leg.distance_text.clone(),
            duration_text: leg.duration_text.clone(),
            calculated_at: Utc::now(),
        };
        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(err) = self
                    .cache
                    .set(key, &json, Some(DRIVE_TIME_CACHE_TTL))
                    .await
                {
                    warn!(error = %err, "drive time cache write failed");
                }
            }
            Err(err) => warn!(error = %err, "drive time cache serialization failed"),
        }
    }
}
