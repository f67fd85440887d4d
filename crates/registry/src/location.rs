use serde::{Deserialize, Serialize};

use depot_core::{DomainError, DomainResult, LocationId, ZoneId};

/// Kind of addressable storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Pallet,
    Shelf,
    Bulk,
}

/// Derived status of a location.
///
/// Precedence: `Blocked` (manual) > `Reserved` (manual) > `Occupied`
/// (quantity > 0) > `Empty`. Never stored authoritatively; always recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    Empty,
    Occupied,
    Reserved,
    Blocked,
}

impl core::fmt::Display for LocationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            LocationStatus::Empty => "empty",
            LocationStatus::Occupied => "occupied",
            LocationStatus::Reserved => "reserved",
            LocationStatus::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// An addressable storage slot within a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub zone_id: ZoneId,
    pub kind: LocationType,
    /// Unit-count capacity of the slot.
    pub capacity: i64,
    /// Rated weight limit. Carried as master data; enforcement needs
    /// per-unit product weights, which are optional upstream.
    pub max_weight_kg: Option<u32>,
}

impl Location {
    pub fn new(
        id: LocationId,
        zone_id: ZoneId,
        kind: LocationType,
        capacity: i64,
        max_weight_kg: Option<u32>,
    ) -> DomainResult<Self> {
        if capacity <= 0 {
            return Err(DomainError::validation(format!(
                "location capacity must be positive, got {capacity}"
            )));
        }
        Ok(Self {
            id,
            zone_id,
            kind,
            capacity,
            max_weight_kg,
        })
    }
}

/// Compute the derived status from quantity and manual flags.
pub(crate) fn derive_status(blocked: bool, reserved: bool, quantity: i64) -> LocationStatus {
    if blocked {
        LocationStatus::Blocked
    } else if reserved {
        LocationStatus::Reserved
    } else if quantity > 0 {
        LocationStatus::Occupied
    } else {
        LocationStatus::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_precedence_blocked_over_everything() {
        assert_eq!(derive_status(true, true, 10), LocationStatus::Blocked);
        assert_eq!(derive_status(false, true, 10), LocationStatus::Reserved);
        assert_eq!(derive_status(false, false, 10), LocationStatus::Occupied);
        assert_eq!(derive_status(false, false, 0), LocationStatus::Empty);
    }
}
