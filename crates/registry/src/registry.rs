//! The location registry: topology plus manual flags.

use std::collections::HashMap;
use std::sync::RwLock;

use depot_core::{DomainError, DomainResult, LocationId, ZoneId};

use crate::location::{Location, LocationStatus, derive_status};
use crate::zone::Zone;

/// Read-side view of current occupancy, implemented by the inventory ledger.
///
/// Keeps the registry a leaf component: it never reads stock itself, callers
/// hand it the projection to derive status from.
pub trait OccupancyView {
    /// Total units currently at the location, across products and lots.
    fn occupied_at(&self, location: &LocationId) -> i64;
}

#[derive(Debug, Clone)]
struct LocationState {
    location: Location,
    reserved: bool,
    blocked: bool,
}

/// Owns the set of storage locations, their zone, capacity and manual flags.
///
/// No side effects beyond its own state; it does not move stock.
#[derive(Debug, Default)]
pub struct LocationRegistry {
    zones: RwLock<HashMap<ZoneId, Zone>>,
    locations: RwLock<HashMap<LocationId, LocationState>>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_zone(&self, zone: Zone) -> DomainResult<()> {
        let mut zones = self.zones_mut()?;
        if zones.contains_key(&zone.id) {
            return Err(DomainError::conflict(format!(
                "zone {} already registered",
                zone.id
            )));
        }
        zones.insert(zone.id.clone(), zone);
        Ok(())
    }

    pub fn register_location(&self, location: Location) -> DomainResult<()> {
        {
            let zones = self.zones()?;
            if !zones.contains_key(&location.zone_id) {
                return Err(DomainError::unknown_reference(
                    "zone",
                    location.zone_id.to_string(),
                ));
            }
        }
        let mut locations = self.locations_mut()?;
        if locations.contains_key(&location.id) {
            return Err(DomainError::conflict(format!(
                "location {} already registered",
                location.id
            )));
        }
        locations.insert(
            location.id.clone(),
            LocationState {
                location,
                reserved: false,
                blocked: false,
            },
        );
        Ok(())
    }

    /// Reserve an empty location ahead of a planned putaway.
    ///
    /// The only way status flips to `Reserved`. Fails unless the derived
    /// status is `Empty`; check-and-set is atomic under the write lock.
    pub fn reserve(&self, id: &LocationId, stock: &dyn OccupancyView) -> DomainResult<()> {
        let mut locations = self.locations_mut()?;
        let state = locations.get_mut(id).ok_or(DomainError::NotFound)?;

        let status = derive_status(state.blocked, state.reserved, stock.occupied_at(id));
        if status != LocationStatus::Empty {
            return Err(DomainError::LocationUnavailable {
                location: id.to_string(),
                status: status.to_string(),
            });
        }
        state.reserved = true;
        tracing::debug!(location = %id, "location reserved");
        Ok(())
    }

    /// Release a manual reservation. A no-op if the location is not reserved.
    pub fn release(&self, id: &LocationId) -> DomainResult<()> {
        let mut locations = self.locations_mut()?;
        let state = locations.get_mut(id).ok_or(DomainError::NotFound)?;
        state.reserved = false;
        Ok(())
    }

    /// Manually block a location (highest status precedence).
    pub fn block(&self, id: &LocationId) -> DomainResult<()> {
        let mut locations = self.locations_mut()?;
        let state = locations.get_mut(id).ok_or(DomainError::NotFound)?;
        state.blocked = true;
        tracing::debug!(location = %id, "location blocked");
        Ok(())
    }

    pub fn unblock(&self, id: &LocationId) -> DomainResult<()> {
        let mut locations = self.locations_mut()?;
        let state = locations.get_mut(id).ok_or(DomainError::NotFound)?;
        state.blocked = false;
        Ok(())
    }

    /// Derived status of a location (never stored).
    pub fn status(&self, id: &LocationId, stock: &dyn OccupancyView) -> DomainResult<LocationStatus> {
        let locations = self.locations()?;
        let state = locations.get(id).ok_or(DomainError::NotFound)?;
        Ok(derive_status(
            state.blocked,
            state.reserved,
            stock.occupied_at(id),
        ))
    }

    /// Units the location can still take: `capacity - occupied`, floored at 0.
    pub fn capacity_remaining(
        &self,
        id: &LocationId,
        stock: &dyn OccupancyView,
    ) -> DomainResult<i64> {
        let locations = self.locations()?;
        let state = locations.get(id).ok_or(DomainError::NotFound)?;
        Ok((state.location.capacity - stock.occupied_at(id)).max(0))
    }

    pub fn location(&self, id: &LocationId) -> DomainResult<Location> {
        let locations = self.locations()?;
        locations
            .get(id)
            .map(|s| s.location.clone())
            .ok_or(DomainError::NotFound)
    }

    pub fn is_blocked(&self, id: &LocationId) -> DomainResult<bool> {
        let locations = self.locations()?;
        locations
            .get(id)
            .map(|s| s.blocked)
            .ok_or(DomainError::NotFound)
    }

    pub fn zone_of(&self, id: &LocationId) -> DomainResult<ZoneId> {
        let locations = self.locations()?;
        locations
            .get(id)
            .map(|s| s.location.zone_id.clone())
            .ok_or(DomainError::NotFound)
    }

    pub fn zone(&self, id: &ZoneId) -> DomainResult<Zone> {
        let zones = self.zones()?;
        zones.get(id).cloned().ok_or(DomainError::NotFound)
    }

    pub fn locations_in_zone(&self, zone_id: &ZoneId) -> DomainResult<Vec<LocationId>> {
        let locations = self.locations()?;
        let mut ids: Vec<LocationId> = locations
            .values()
            .filter(|s| &s.location.zone_id == zone_id)
            .map(|s| s.location.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn zones(&self) -> DomainResult<std::sync::RwLockReadGuard<'_, HashMap<ZoneId, Zone>>> {
        self.zones
            .read()
            .map_err(|_| DomainError::conflict("registry lock poisoned"))
    }

    fn zones_mut(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<ZoneId, Zone>>> {
        self.zones
            .write()
            .map_err(|_| DomainError::conflict("registry lock poisoned"))
    }

    fn locations(
        &self,
    ) -> DomainResult<std::sync::RwLockReadGuard<'_, HashMap<LocationId, LocationState>>> {
        self.locations
            .read()
            .map_err(|_| DomainError::conflict("registry lock poisoned"))
    }

    fn locations_mut(
        &self,
    ) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<LocationId, LocationState>>> {
        self.locations
            .write()
            .map_err(|_| DomainError::conflict("registry lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationType;
    use crate::zone::{StorageClass, TemperatureBand, Zone};

    struct FixedStock(i64);

    impl OccupancyView for FixedStock {
        fn occupied_at(&self, _location: &LocationId) -> i64 {
            self.0
        }
    }

    fn registry_with_location(capacity: i64) -> (LocationRegistry, LocationId) {
        let registry = LocationRegistry::new();
        let zone_id = ZoneId::new("A").unwrap();
        registry
            .register_zone(
                Zone::new(
                    zone_id.clone(),
                    "Ambient A",
                    StorageClass::Dry,
                    TemperatureBand::new(10, 25).unwrap(),
                    10_000,
                )
                .unwrap(),
            )
            .unwrap();
        let id = LocationId::new("A-01-01").unwrap();
        registry
            .register_location(
                Location::new(id.clone(), zone_id, LocationType::Pallet, capacity, None).unwrap(),
            )
            .unwrap();
        (registry, id)
    }

    #[test]
    fn reserve_requires_empty_status() {
        let (registry, id) = registry_with_location(1000);

        registry.reserve(&id, &FixedStock(0)).unwrap();
        let err = registry.reserve(&id, &FixedStock(0)).unwrap_err();
        assert!(matches!(err, DomainError::LocationUnavailable { .. }));

        registry.release(&id).unwrap();
        registry.reserve(&id, &FixedStock(0)).unwrap();
    }

    #[test]
    fn occupied_location_cannot_be_reserved() {
        let (registry, id) = registry_with_location(1000);
        let err = registry.reserve(&id, &FixedStock(5)).unwrap_err();
        match err {
            DomainError::LocationUnavailable { status, .. } => assert_eq!(status, "occupied"),
            other => panic!("expected LocationUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn blocked_takes_precedence_over_reserved_and_occupied() {
        let (registry, id) = registry_with_location(1000);
        registry.block(&id).unwrap();
        assert_eq!(
            registry.status(&id, &FixedStock(50)).unwrap(),
            LocationStatus::Blocked
        );
        registry.unblock(&id).unwrap();
        assert_eq!(
            registry.status(&id, &FixedStock(50)).unwrap(),
            LocationStatus::Occupied
        );
    }

    #[test]
    fn capacity_remaining_never_goes_negative() {
        let (registry, id) = registry_with_location(100);
        assert_eq!(registry.capacity_remaining(&id, &FixedStock(40)).unwrap(), 60);
        assert_eq!(registry.capacity_remaining(&id, &FixedStock(150)).unwrap(), 0);
    }

    #[test]
    fn location_registration_requires_known_zone() {
        let registry = LocationRegistry::new();
        let err = registry
            .register_location(
                Location::new(
                    LocationId::new("X-01-01").unwrap(),
                    ZoneId::new("X").unwrap(),
                    LocationType::Shelf,
                    10,
                    None,
                )
                .unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::UnknownReference { .. }));
    }
}
