use serde::{Deserialize, Serialize};

use depot_core::{DomainError, DomainResult, ZoneId};

/// Physical/thermal storage class of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    Chilled,
    Frozen,
    Dry,
    Dock,
}

/// Temperature band a zone is held at, in whole degrees Celsius.
///
/// Immutable after zone registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureBand {
    pub min_c: i16,
    pub max_c: i16,
}

impl TemperatureBand {
    pub fn new(min_c: i16, max_c: i16) -> DomainResult<Self> {
        if min_c > max_c {
            return Err(DomainError::validation(format!(
                "temperature band inverted: min {min_c} > max {max_c}"
            )));
        }
        Ok(Self { min_c, max_c })
    }
}

/// A physically/thermally distinct warehouse area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub storage_class: StorageClass,
    pub temperature_band: TemperatureBand,
    /// Unit-count capacity across all locations in the zone.
    pub capacity: i64,
}

impl Zone {
    pub fn new(
        id: ZoneId,
        name: impl Into<String>,
        storage_class: StorageClass,
        temperature_band: TemperatureBand,
        capacity: i64,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("zone name cannot be empty"));
        }
        if capacity <= 0 {
            return Err(DomainError::validation(format!(
                "zone capacity must be positive, got {capacity}"
            )));
        }
        Ok(Self {
            id,
            name,
            storage_class,
            temperature_band,
            capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_temperature_band_is_rejected() {
        let err = TemperatureBand::new(4, -18).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn zone_requires_positive_capacity() {
        let band = TemperatureBand::new(-20, -18).unwrap();
        let err = Zone::new(
            ZoneId::new("F").unwrap(),
            "Frozen",
            StorageClass::Frozen,
            band,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
