//! Orchestrates one geopricing calculation: geocode, origin selection, drive
//! time, zone resolution, price combination.
//!
//! The product requirement is "always return a usable price": only a
//! geocoding failure or missing configuration aborts a request. Every other
//! step degrades (estimated drive time, neutral zone adjustment) and the
//! result carries confidence metadata instead of failing.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::distance_matrix::RouteOptions;
use crate::clients::geocoding::Geocoder;
use crate::errors::ServiceError;
use crate::models::{
    CalculationResult, DriveTimeSummary, Location, MatchedZoneSummary, ServiceItem, ShopOrigin,
};
use crate::services::drive_time::{DriveTimeOptions, DriveTimeResolver};
use crate::services::pricing::PriceCalculator;
use crate::services::zones::ZoneResolver;
use crate::stores::{CalculationStore, ShopOriginStore, ZoneStore};

/// Pricing policy knobs applied to every calculation.
#[derive(Debug, Clone)]
pub struct GeopricingConfig {
    pub minimum_charge: Decimal,
    /// Rounding increment for the final price (0.01, 1.00, ...)
    pub round_to: Decimal,
    /// How long a calculation result stays quotable
    pub result_ttl_secs: i64,
}

impl Default for GeopricingConfig {
    fn default() -> Self {
        Self {
            minimum_charge: Decimal::from(50),
            round_to: Decimal::new(1, 2), // 0.01
            result_ttl_secs: 3600,
        }
    }
}

/// Per-request options from the caller.
#[derive(Debug, Clone)]
pub struct CalculationOptions {
    pub use_cache: bool,
    pub traffic_model: Option<String>,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
    pub preferred_origin_id: Option<Uuid>,
    /// Seasonal adjustments key off this; defaults to now
    pub service_date: Option<DateTime<Utc>>,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            traffic_model: None,
            avoid_highways: false,
            avoid_tolls: false,
            preferred_origin_id: None,
            service_date: None,
        }
    }
}

impl CalculationOptions {
    fn drive_time_options(&self) -> DriveTimeOptions {
        DriveTimeOptions {
            use_cache: self.use_cache,
            route: RouteOptions {
                traffic_model: self.traffic_model.clone(),
                avoid_highways: self.avoid_highways,
                avoid_tolls: self.avoid_tolls,
            },
        }
    }
}

pub struct GeopricingService {
    geocoder: Arc<dyn Geocoder>,
    origins: Arc<dyn ShopOriginStore>,
    zones: Arc<dyn ZoneStore>,
    drive_time: Arc<DriveTimeResolver>,
    zone_resolver: ZoneResolver,
    pricing: PriceCalculator,
    calculations: Option<Arc<dyn CalculationStore>>,
    config: GeopricingConfig,
}

impl GeopricingService {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        origins: Arc<dyn ShopOriginStore>,
        zones: Arc<dyn ZoneStore>,
        drive_time: Arc<DriveTimeResolver>,
        calculations: Option<Arc<dyn CalculationStore>>,
        config: GeopricingConfig,
    ) -> Self {
        let zone_resolver = ZoneResolver::new(drive_time.clone());
        Self {
            geocoder,
            origins,
            zones,
            drive_time,
            zone_resolver,
            pricing: PriceCalculator,
            calculations,
            config,
        }
    }

    /// Run one calculation end to end.
    pub async fn calculate(
        &self,
        business_id: Uuid,
        customer_address: &str,
        services: &[ServiceItem],
        options: &CalculationOptions,
    ) -> Result<CalculationResult, ServiceError> {
        if customer_address.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "customer address must not be empty".to_string(),
            ));
        }
        if services.is_empty() {
            return Err(ServiceError::InvalidInput(
                "at least one service item is required".to_string(),
            ));
        }

        // 1. Geocode. The only per-request fatal step besides configuration.
        let geocoded = self.geocoder.geocode(customer_address).await?;
        let customer = Location {
            point: geocoded.point,
            address: geocoded.normalized_address,
            city: geocoded.city,
            region: geocoded.region,
            postal_code: geocoded.postal_code,
        };

        // 2. Select exactly one origin.
        let origin = self
            .select_origin(business_id, &customer, options.preferred_origin_id)
            .await?;

        // 3. Drive time, cache-aware, degrades to an estimate.
        let drive_options = options.drive_time_options();
        let drive = self
            .drive_time
            .resolve(origin.location.point, customer.point, &drive_options)
            .await;

        // 4. Zone resolution; no match is a neutral result.
        let service_date = options.service_date.unwrap_or_else(Utc::now);
        let zones = self.zones.active_zones(business_id).await?;
        let zone_match = self
            .zone_resolver
            .resolve(&zones, &customer, service_date, &drive_options)
            .await;

        // 5. Price combination.
        let breakdown = self.pricing.compute(
            origin.base_rate_per_unit,
            services,
            &zone_match.adjustment,
            self.config.minimum_charge,
            self.config.round_to,
        );

        let computed_at = Utc::now();
        let result = CalculationResult {
            id: Uuid::new_v4(),
            business_id,
            origin_id: origin.id,
            customer_location: customer,
            drive_time: DriveTimeSummary {
                minutes: drive.minutes,
                distance_km: drive.distance_km,
                from_cache: drive.from_cache,
                estimated: drive.estimated || zone_match.estimated,
            },
            matched_zone: zone_match.zone.as_ref().map(|zone| MatchedZoneSummary {
                zone_id: zone.id,
                zone_name: zone.name.clone(),
                adjustment: zone_match.adjustment,
                reason: zone_match.reason.clone(),
            }),
            zone_reason: zone_match.reason.clone(),
            base_rate: origin.base_rate_per_unit,
            per_service_pricing: breakdown.per_service,
            adjusted_total: breakdown.adjusted_total,
            final_price: breakdown.final_price,
            currency: origin.currency.clone(),
            computed_at,
            expires_at: computed_at + ChronoDuration::seconds(self.config.result_ttl_secs),
        };

        // No partial state before this point; persistence is best-effort.
        if let Some(store) = &self.calculations {
            if let Err(err) = store.save(&result).await {
                warn!(error = %err, "failed to persist calculation result");
            }
        }

        info!(
            business_id = %business_id,
            final_price = %result.final_price,
            estimated = result.drive_time.estimated,
            zone = result.matched_zone.as_ref().map(|z| z.zone_name.as_str()).unwrap_or("none"),
            "calculation complete"
        );

        Ok(result)
    }

    /// Exactly one origin per calculation: preferred id when valid, else
    /// nearest active origin within its service radius, else a same-city
    /// origin, else the business primary.
    async fn select_origin(
        &self,
        business_id: Uuid,
        customer: &Location,
        preferred: Option<Uuid>,
    ) -> Result<ShopOrigin, ServiceError> {
        let origins = self.origins.active_origins(business_id).await?;
        if origins.is_empty() {
            return Err(ServiceError::Configuration(format!(
                "no active shop origin for business {}",
                business_id
            )));
        }

        if let Some(id) = preferred {
            if let Some(origin) = origins.iter().find(|o| o.id == id) {
                return Ok(origin.clone());
            }
            warn!(origin_id = %id, "preferred origin not active, falling back to selection");
        }

        let nearest_in_radius = origins
            .iter()
            .map(|o| (o, o.location.point.haversine_km(&customer.point)))
            .filter(|(o, d)| *d <= o.service_radius_km)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(o, _)| o);
        if let Some(origin) = nearest_in_radius {
            return Ok(origin.clone());
        }

        if let Some(origin) = origins.iter().find(|o| o.location.same_city(customer)) {
            return Ok(origin.clone());
        }

        Ok(origins
            .iter()
            .find(|o| o.is_primary)
            .unwrap_or(&origins[0])
            .clone())
    }
}
