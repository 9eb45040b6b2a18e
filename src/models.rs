//! Domain model for the geopricing engine: shop origins, pricing zones,
//! service items, and the calculation result persisted by callers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::geo::GeoPoint;

/// A resolved customer or shop location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub point: GeoPoint,
    /// Normalized address as returned by the geocoder
    #[schema(example = "123 Main Street, San Francisco, CA 94102, US")]
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl Location {
    pub fn same_city(&self, other: &Location) -> bool {
        match (&self.city, &other.city) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

/// A service origin (shop, depot) prices are computed from. Created by
/// configuration; read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopOrigin {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub location: Location,
    /// Base rate charged per 1,000 sqft
    pub base_rate_per_unit: Decimal,
    pub currency: String,
    /// Radius within which this origin serves customers
    pub service_radius_km: f64,
    /// Fallback origin when no other selection strategy matches
    pub is_primary: bool,
    pub active: bool,
}

/// Price modification attached to a zone or service item.
///
/// Tagged variant so each kind carries its own `apply` semantics instead of
/// branching on a string at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Adjustment {
    /// `price * (1 + value / 100)`; value may be negative for discounts
    Percentage(Decimal),
    /// `price + value`
    Fixed(Decimal),
    /// `price * value`
    Multiplier(Decimal),
}

impl Adjustment {
    pub fn apply(&self, price: Decimal) -> Decimal {
        match self {
            Adjustment::Percentage(v) => price * (Decimal::ONE + *v / Decimal::from(100)),
            Adjustment::Fixed(v) => price + *v,
            Adjustment::Multiplier(v) => price * *v,
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            Adjustment::Percentage(v) | Adjustment::Fixed(v) | Adjustment::Multiplier(v) => *v,
        }
    }

    /// Same variant with `delta` added to the value. Seasonal and density
    /// modifiers combine into the zone's base adjustment this way.
    pub fn with_added(&self, delta: Decimal) -> Adjustment {
        match self {
            Adjustment::Percentage(v) => Adjustment::Percentage(*v + delta),
            Adjustment::Fixed(v) => Adjustment::Fixed(*v + delta),
            Adjustment::Multiplier(v) => Adjustment::Multiplier(*v + delta),
        }
    }

    /// Neutral adjustment used when no zone matches.
    pub fn neutral() -> Adjustment {
        Adjustment::Percentage(Decimal::ZERO)
    }
}

/// Inclusive month range; `start_month > end_month` wraps the calendar year
/// (e.g. 11..=2 covers Nov, Dec, Jan, Feb).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalAdjustment {
    pub start_month: u32,
    pub end_month: u32,
    /// Added to the zone's base adjustment value when in season
    pub value: Decimal,
}

impl SeasonalAdjustment {
    pub fn contains_month(&self, month: u32) -> bool {
        if self.start_month <= self.end_month {
            (self.start_month..=self.end_month).contains(&month)
        } else {
            month >= self.start_month || month <= self.end_month
        }
    }
}

/// Route-density settings rewarding well-served areas and penalizing
/// sparse ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDensitySettings {
    pub enabled: bool,
    /// Jobs per route considered fully dense; 0 means always dense
    pub target_density: f64,
    pub current_density: f64,
    /// Subtracted from the adjustment value when at or above target
    pub density_bonus: Decimal,
    /// Scaled by `1 - current/target` and added when below target
    pub sparse_penalty: Decimal,
}

/// How a zone decides whether a customer location belongs to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ZoneStrategy {
    Radius { center: GeoPoint, radius_km: f64 },
    DriveTime { origin: GeoPoint, max_minutes: f64 },
    Polygon { ring: Vec<GeoPoint> },
    Zipcode { codes: Vec<String> },
    City { names: Vec<String> },
}

/// A geographic/criteria-based area carrying a price adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub strategy: ZoneStrategy,
    pub adjustment: Adjustment,
    #[serde(default)]
    pub seasonal_adjustments: Vec<SeasonalAdjustment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<RouteDensitySettings>,
    /// Higher priority wins; ties broken by creation order
    pub priority: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// One requested service in a calculation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceItem {
    #[schema(example = "lawn_treatment")]
    pub service_type: String,
    /// Serviced area in square feet
    pub area_sqft: Decimal,
    /// Per-1,000-sqft rate overriding the origin's base rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_override: Option<Decimal>,
    /// Service-specific adjustment, composed before the zone adjustment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment_override: Option<Adjustment>,
}

/// Pricing detail for a single service item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PerServicePrice {
    pub service_type: String,
    pub area_sqft: Decimal,
    pub base_price: Decimal,
    pub adjusted_price: Decimal,
}

/// Drive-time portion of a calculation result, with confidence metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DriveTimeSummary {
    pub minutes: f64,
    pub distance_km: f64,
    pub from_cache: bool,
    /// True when the value is a geometric estimate, not a provider route
    pub estimated: bool,
}

/// Matched-zone portion of a calculation result.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchedZoneSummary {
    pub zone_id: Uuid,
    pub zone_name: String,
    pub adjustment: Adjustment,
    /// Why this zone (or no zone) was selected
    pub reason: String,
}

/// Write-once output of one geopricing calculation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalculationResult {
    pub id: Uuid,
    pub business_id: Uuid,
    pub origin_id: Uuid,
    pub customer_location: Location,
    pub drive_time: DriveTimeSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_zone: Option<MatchedZoneSummary>,
    pub zone_reason: String,
    /// Origin base rate per 1,000 sqft
    pub base_rate: Decimal,
    pub per_service_pricing: Vec<PerServicePrice>,
    /// Sum of adjusted per-service prices before the minimum-charge floor
    pub adjusted_total: Decimal,
    pub final_price: Decimal,
    pub currency: String,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
