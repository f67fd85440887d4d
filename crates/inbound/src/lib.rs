//! `depot-inbound` — receiving orders and their reconciliation into the ledger.

pub mod manager;
pub mod order;

pub use manager::{InboundManager, ReceiveLine};
pub use order::{InboundLine, InboundOrder, InboundStatus};
