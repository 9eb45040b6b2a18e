//! Zone matching: evaluates pricing zones against a customer location in
//! priority order and produces the combined adjustment for the winner.
//!
//! The first zone whose predicate is true wins and evaluation stops. Matching
//! is deterministic for a given active zone set: descending priority, ties
//! broken by creation order. There is no stacking of simultaneously matching
//! zones.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::geo::point_in_polygon;
use crate::models::{Adjustment, Location, Zone, ZoneStrategy};
use crate::services::drive_time::{DriveTimeOptions, DriveTimeResolver};

/// Outcome of zone resolution. A missing zone is not an error: the
/// calculation proceeds with a neutral adjustment.
#[derive(Debug, Clone)]
pub struct ZoneMatch {
    pub zone: Option<Zone>,
    /// Zone adjustment with seasonal and density modifiers folded in;
    /// neutral when no zone matched
    pub adjustment: Adjustment,
    pub reason: String,
    /// Drive time used by a drive-time predicate, when one was evaluated
    pub minutes: Option<f64>,
    /// True when a drive-time predicate had to use a geometric estimate
    pub estimated: bool,
}

impl ZoneMatch {
    fn unmatched() -> Self {
        Self {
            zone: None,
            adjustment: Adjustment::neutral(),
            reason: "no zone configured or customer out of range".to_string(),
            minutes: None,
            estimated: false,
        }
    }
}

pub struct ZoneResolver {
    drive_time: Arc<DriveTimeResolver>,
}

impl ZoneResolver {
    pub fn new(drive_time: Arc<DriveTimeResolver>) -> Self {
        Self { drive_time }
    }

    /// Evaluate `zones` (already filtered to active) against the customer
    /// location for a service date.
    pub async fn resolve(
        &self,
        zones: &[Zone],
        customer: &Location,
        service_date: DateTime<Utc>,
        options: &DriveTimeOptions,
    ) -> ZoneMatch {
        let mut ordered: Vec<&Zone> = zones.iter().collect();
        ordered.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        for zone in ordered {
            if let Some((reason, minutes, estimated)) = self.matches(zone, customer, options).await
            {
                let adjustment = Self::combined_adjustment(zone, service_date);
                debug!(zone = %zone.name, %reason, "zone matched");
                return ZoneMatch {
                    zone: Some(zone.clone()),
                    adjustment,
                    reason,
                    minutes,
                    estimated,
                };
            }
        }

        ZoneMatch::unmatched()
    }

    /// Strategy predicate; `Some` carries the match reason and any drive-time
    /// metadata.
    async fn matches(
        &self,
        zone: &Zone,
        customer: &Location,
        options: &DriveTimeOptions,
    ) -> Option<(String, Option<f64>, bool)> {
        match &zone.strategy {
            ZoneStrategy::Radius { center, radius_km } => {
                let distance = center.haversine_km(&customer.point);
                (distance <= *radius_km).then(|| {
                    (
                        format!("within {:.1} km radius ({:.1} km)", radius_km, distance),
                        None,
                        false,
                    )
                })
            }
            ZoneStrategy::DriveTime {
                origin,
                max_minutes,
            } => {
                let estimate = self
                    .drive_time
                    .resolve(*origin, customer.point, options)
                    .await;
                (estimate.minutes <= *max_minutes).then(|| {
                    (
                        format!(
                            "within {:.0} min drive time ({:.1} min)",
                            max_minutes, estimate.minutes
                        ),
                        Some(estimate.minutes),
                        estimate.estimated,
                    )
                })
            }
            ZoneStrategy::Polygon { ring } => point_in_polygon(&customer.point, ring)
                .then(|| ("inside zone polygon".to_string(), None, false)),
            ZoneStrategy::Zipcode { codes } => {
                let postal = customer.postal_code.as_deref()?;
                codes
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(postal.trim()))
                    .then(|| (format!("zipcode {} in zone list", postal), None, false))
            }
            ZoneStrategy::City { names } => {
                let city = customer.city.as_deref()?;
                names
                    .iter()
                    .any(|n| n.eq_ignore_ascii_case(city.trim()))
                    .then(|| (format!("city {} in zone list", city), None, false))
            }
        }
    }

    /// Fold seasonal and route-density modifiers into the zone's base
    /// adjustment value.
    fn combined_adjustment(zone: &Zone, service_date: DateTime<Utc>) -> Adjustment {
        let month = service_date.month();
        let mut adjustment = zone.adjustment;

        for seasonal in &zone.seasonal_adjustments {
            if seasonal.contains_month(month) {
                adjustment = adjustment.with_added(seasonal.value);
            }
        }

        if let Some(density) = zone.density.as_ref().filter(|d| d.enabled) {
            // target 0 counts as fully dense, guarding the division below.
            let fully_dense =
                density.target_density <= 0.0 || density.current_density >= density.target_density;
            let delta = if fully_dense {
                -density.density_bonus
            } else {
                let sparsity = 1.0 - density.current_density / density.target_density;
                density.sparse_penalty * Decimal::from_f64(sparsity).unwrap_or_default()
            };
            adjustment = adjustment.with_added(delta);
        }

        adjustment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::clients::distance_matrix::{MockDistanceMatrixApi, RouteLeg};
    use crate::geo::GeoPoint;
    use crate::models::{RouteDensitySettings, SeasonalAdjustment};
    use crate::services::drive_time::DriveTimeConfig;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn resolver_with_minutes(minutes: f64) -> ZoneResolver {
        let mut client = MockDistanceMatrixApi::new();
        client.expect_routes().returning(move |_, _, _| {
            Ok(vec![Some(RouteLeg {
                minutes,
                distance_km: minutes / 2.0,
                distance_text: "x km".into(),
                duration_text: "x mins".into(),
            })])
        });
        ZoneResolver::new(Arc::new(DriveTimeResolver::new(
            Arc::new(client),
            Arc::new(InMemoryCache::new(64)),
            DriveTimeConfig::default(),
        )))
    }

    fn customer() -> Location {
        Location {
            point: GeoPoint::new(37.7749, -122.4194),
            address: "test".into(),
            city: Some("San Francisco".into()),
            region: Some("CA".into()),
            postal_code: Some("94102".into()),
        }
    }

    fn radius_zone(priority: i32, radius_km: f64, pct: Decimal) -> Zone {
        Zone {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            name: format!("radius-p{}", priority),
            strategy: ZoneStrategy::Radius {
                center: GeoPoint::new(37.7749, -122.4194),
                radius_km,
            },
            adjustment: Adjustment::Percentage(pct),
            seasonal_adjustments: vec![],
            density: None,
            priority,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn june() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn higher_priority_zone_wins_when_both_match() {
        let resolver = resolver_with_minutes(5.0);
        let z1 = radius_zone(10, 50.0, dec!(-5));
        let z2 = radius_zone(5, 50.0, dec!(10));

        // Order in the slice must not matter.
        let matched = resolver
            .resolve(&[z2.clone(), z1.clone()], &customer(), june(), &DriveTimeOptions::default())
            .await;
        assert_eq!(matched.zone.unwrap().id, z1.id);
        assert_eq!(matched.adjustment, Adjustment::Percentage(dec!(-5)));
    }

    #[tokio::test]
    async fn priority_tie_broken_by_creation_order() {
        let resolver = resolver_with_minutes(5.0);
        let mut older = radius_zone(10, 50.0, dec!(-5));
        older.created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let newer = radius_zone(10, 50.0, dec!(10));

        let matched = resolver
            .resolve(&[newer, older.clone()], &customer(), june(), &DriveTimeOptions::default())
            .await;
        assert_eq!(matched.zone.unwrap().id, older.id);
    }

    #[tokio::test]
    async fn no_matching_zone_is_neutral_not_an_error() {
        let resolver = resolver_with_minutes(5.0);
        let matched = resolver
            .resolve(
                &[radius_zone(10, 0.001, dec!(-5))],
                &Location {
                    point: GeoPoint::new(45.0, -100.0),
                    address: "far away".into(),
                    city: None,
                    region: None,
                    postal_code: None,
                },
                june(),
                &DriveTimeOptions::default(),
            )
            .await;
        assert!(matched.zone.is_none());
        assert_eq!(matched.adjustment, Adjustment::neutral());
        assert!(matched.reason.contains("no zone"));
    }

    #[tokio::test]
    async fn drive_time_zone_matches_below_threshold() {
        let resolver = resolver_with_minutes(18.0);
        let zone = Zone {
            strategy: ZoneStrategy::DriveTime {
                origin: GeoPoint::new(37.7, -122.4),
                max_minutes: 20.0,
            },
            ..radius_zone(1, 0.0, dec!(10))
        };
        let matched = resolver
            .resolve(&[zone], &customer(), june(), &DriveTimeOptions::default())
            .await;
        assert!(matched.zone.is_some());
        assert_eq!(matched.minutes, Some(18.0));

        let resolver = resolver_with_minutes(25.0);
        let zone = Zone {
            strategy: ZoneStrategy::DriveTime {
                origin: GeoPoint::new(37.7, -122.4),
                max_minutes: 20.0,
            },
            ..radius_zone(1, 0.0, dec!(10))
        };
        let matched = resolver
            .resolve(&[zone], &customer(), june(), &DriveTimeOptions::default())
            .await;
        assert!(matched.zone.is_none());
    }

    #[tokio::test]
    async fn zipcode_and_city_match_case_insensitively() {
        let resolver = resolver_with_minutes(5.0);
        let zip_zone = Zone {
            strategy: ZoneStrategy::Zipcode {
                codes: vec!["94102".into(), "94110".into()],
            },
            ..radius_zone(2, 0.0, dec!(-3))
        };
        let city_zone = Zone {
            strategy: ZoneStrategy::City {
                names: vec!["SAN FRANCISCO".into()],
            },
            ..radius_zone(1, 0.0, dec!(7))
        };

        let matched = resolver
            .resolve(&[zip_zone.clone(), city_zone.clone()], &customer(), june(), &DriveTimeOptions::default())
            .await;
        assert_eq!(matched.zone.unwrap().id, zip_zone.id);

        let matched = resolver
            .resolve(&[city_zone.clone()], &customer(), june(), &DriveTimeOptions::default())
            .await;
        assert_eq!(matched.zone.unwrap().id, city_zone.id);
    }

    #[tokio::test]
    async fn seasonal_adjustment_applies_in_season_including_year_wrap() {
        let resolver = resolver_with_minutes(5.0);
        let mut zone = radius_zone(1, 50.0, dec!(10));
        zone.seasonal_adjustments = vec![SeasonalAdjustment {
            start_month: 11,
            end_month: 2,
            value: dec!(5),
        }];

        let january = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let matched = resolver
            .resolve(&[zone.clone()], &customer(), january, &DriveTimeOptions::default())
            .await;
        assert_eq!(matched.adjustment, Adjustment::Percentage(dec!(15)));

        let matched = resolver
            .resolve(&[zone], &customer(), june(), &DriveTimeOptions::default())
            .await;
        assert_eq!(matched.adjustment, Adjustment::Percentage(dec!(10)));
    }

    #[tokio::test]
    async fn density_bonus_when_dense_penalty_when_sparse() {
        let resolver = resolver_with_minutes(5.0);
        let mut dense = radius_zone(1, 50.0, dec!(10));
        dense.density = Some(RouteDensitySettings {
            enabled: true,
            target_density: 4.0,
            current_density: 6.0,
            density_bonus: dec!(3),
            sparse_penalty: dec!(8),
        });
        let matched = resolver
            .resolve(&[dense], &customer(), june(), &DriveTimeOptions::default())
            .await;
        assert_eq!(matched.adjustment, Adjustment::Percentage(dec!(7)));

        let mut sparse = radius_zone(1, 50.0, dec!(10));
        sparse.density = Some(RouteDensitySettings {
            enabled: true,
            target_density: 4.0,
            current_density: 1.0,
            density_bonus: dec!(3),
            sparse_penalty: dec!(8),
        });
        let matched = resolver
            .resolve(&[sparse], &customer(), june(), &DriveTimeOptions::default())
            .await;
        // penalty 8 * (1 - 1/4) = 6
        assert_eq!(matched.adjustment, Adjustment::Percentage(dec!(16)));
    }

    #[tokio::test]
    async fn zero_target_density_counts_as_fully_dense() {
        let resolver = resolver_with_minutes(5.0);
        let mut zone = radius_zone(1, 50.0, dec!(10));
        zone.density = Some(RouteDensitySettings {
            enabled: true,
            target_density: 0.0,
            current_density: 0.0,
            density_bonus: dec!(2),
            sparse_penalty: dec!(9),
        });
        let matched = resolver
            .resolve(&[zone], &customer(), june(), &DriveTimeOptions::default())
            .await;
        assert_eq!(matched.adjustment, Adjustment::Percentage(dec!(8)));
    }
}
