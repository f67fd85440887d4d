//! `depot-coordinator` — the fulfillment orchestrator.
//!
//! Wires the registry, ledger, order managers and pick scheduler into one
//! process-scoped component, resolves master-data references before any
//! mutation, retries contended ledger writes, and emits alert events.

pub mod coordinator;

pub use coordinator::FulfillmentCoordinator;
