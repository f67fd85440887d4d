//! Domain events and their distribution seam.
//!
//! The warehouse core emits alert events (`StockBelowThreshold`, `TaskOverdue`,
//! `OrderShort`) as plain data records; delivery and notification formatting
//! belong to the alerting subsystem, which consumes them through `EventBus`.

pub mod alert;
pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use alert::AlertEvent;
pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
