//! `depot-registry` — storage zones and locations.
//!
//! The registry owns static storage topology (zones, locations, capacities)
//! and the manual `reserved`/`blocked` flags. It holds no stock: a location's
//! status is a pure derivation over current quantity (supplied through
//! [`OccupancyView`]) and the manual flags, so stored status can never drift
//! from actual stock.

pub mod location;
pub mod registry;
pub mod zone;

pub use location::{Location, LocationStatus, LocationType};
pub use registry::{LocationRegistry, OccupancyView};
pub use zone::{StorageClass, TemperatureBand, Zone};
