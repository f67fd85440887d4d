//! `depot-outbound` — shipping orders.
//!
//! An outbound order's status is driven by the aggregate state of its pick
//! tasks, summarized as [`PickProgress`] by the scheduler. Only the explicit
//! dispatch event reaches `Shipped`; task completion alone never does.

pub mod manager;
pub mod order;

pub use manager::OutboundManager;
pub use order::{OutboundLine, OutboundOrder, OutboundStatus, PickProgress};
