//! `depot-core` — domain foundation for the warehouse core.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers and the shared error model.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{
    ClientId, InboundOrderId, LocationId, LotId, MovementId, OutboundOrderId, PickTaskId,
    ProductId, SupplierId, WorkerId, ZoneId,
};
