//! `depot-picking` — pick tasks, planning and scheduling.
//!
//! Decomposes an outbound order into ordered, location-specific pick tasks,
//! assigns them to workers and tracks partial completion. Every picked unit
//! flows through the ledger as a `pick` movement into the order's staging
//! pseudo-location.

pub mod planner;
pub mod scheduler;
pub mod task;

pub use planner::{LinePlan, PlannedPick};
pub use scheduler::{PickScheduler, PlanReport, ShortLine};
pub use task::{PickTask, PickTaskStatus};
