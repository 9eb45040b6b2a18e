//! Store abstractions consumed by the engine. Persistence schemas are out of
//! scope; the engine only needs these capabilities, so backing stores are
//! swappable behind traits.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{CalculationResult, ShopOrigin, Zone};

/// Active zones for a business, sorted descending by priority with ties
/// broken by creation order.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn active_zones(&self, business_id: Uuid) -> Result<Vec<Zone>, ServiceError>;
}

/// Active shop origins for a business.
#[async_trait]
pub trait ShopOriginStore: Send + Sync {
    async fn active_origins(&self, business_id: Uuid) -> Result<Vec<ShopOrigin>, ServiceError>;
}

/// Optional persistence for finished calculations.
#[async_trait]
pub trait CalculationStore: Send + Sync {
    async fn save(&self, result: &CalculationResult) -> Result<(), ServiceError>;
    async fn find(&self, id: Uuid) -> Result<Option<CalculationResult>, ServiceError>;
}

#[derive(Default)]
pub struct InMemoryZoneStore {
    zones: DashMap<Uuid, Vec<Zone>>,
}

impl InMemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, zone: Zone) {
        self.zones.entry(zone.business_id).or_default().push(zone);
    }
}

#[async_trait]
impl ZoneStore for InMemoryZoneStore {
    async fn active_zones(&self, business_id: Uuid) -> Result<Vec<Zone>, ServiceError> {
        let mut zones: Vec<Zone> = self
            .zones
            .get(&business_id)
            .map(|z| z.iter().filter(|z| z.active).cloned().collect())
            .unwrap_or_default();
        zones.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(zones)
    }
}

#[derive(Default)]
pub struct InMemoryShopOriginStore {
    origins: DashMap<Uuid, Vec<ShopOrigin>>,
}

impl InMemoryShopOriginStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, origin: ShopOrigin) {
        self.origins
            .entry(origin.business_id)
            .or_default()
            .push(origin);
    }
}

#[async_trait]
impl ShopOriginStore for InMemoryShopOriginStore {
    async fn active_origins(&self, business_id: Uuid) -> Result<Vec<ShopOrigin>, ServiceError> {
        Ok(self
            .origins
            .get(&business_id)
            .map(|o| o.iter().filter(|o| o.active).cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryCalculationStore {
    results: DashMap<Uuid, CalculationResult>,
}

impl InMemoryCalculationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[async_trait]
impl CalculationStore for InMemoryCalculationStore {
    async fn save(&self, result: &CalculationResult) -> Result<(), ServiceError> {
        self.results.insert(result.id, result.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<CalculationResult>, ServiceError> {
        Ok(self.results.get(&id).map(|r| r.clone()))
    }
}

/// Convenience alias for the store bundle the orchestrator consumes.
pub type SharedZoneStore = Arc<dyn ZoneStore>;
pub type SharedShopOriginStore = Arc<dyn ShopOriginStore>;
pub type SharedCalculationStore = Arc<dyn CalculationStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::models::{Adjustment, ZoneStrategy};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn zone(business_id: Uuid, priority: i32, age_secs: i64, active: bool) -> Zone {
        Zone {
            id: Uuid::new_v4(),
            business_id,
            name: format!("zone-p{}", priority),
            strategy: ZoneStrategy::Radius {
                center: GeoPoint::new(0.0, 0.0),
                radius_km: 5.0,
            },
            adjustment: Adjustment::Percentage(dec!(0)),
            seasonal_adjustments: vec![],
            density: None,
            priority,
            active,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn zones_sorted_by_priority_then_creation() {
        let store = InMemoryZoneStore::new();
        let biz = Uuid::new_v4();
        store.insert(zone(biz, 5, 100, true));
        store.insert(zone(biz, 10, 10, true));
        store.insert(zone(biz, 10, 50, true)); // older, same priority
        store.insert(zone(biz, 7, 1, false)); // inactive, excluded

        let zones = store.active_zones(biz).await.unwrap();
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].priority, 10);
        assert!(zones[0].created_at < zones[1].created_at);
        assert_eq!(zones[2].priority, 5);
    }

    #[tokio::test]
    async fn unknown_business_has_no_zones() {
        let store = InMemoryZoneStore::new();
        assert!(store.active_zones(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
