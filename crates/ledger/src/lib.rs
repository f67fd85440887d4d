//! `depot-ledger` — the append-only movement ledger.
//!
//! The single source of truth for "how much of product P sits at location L".
//! Stock quantities are never edited: they are the signed sum of movements for
//! a (location, product, lot) triple, cached as a derived projection. All
//! mutation goes through [`InventoryLedger::record`], which serializes per
//! triple, so the rest of the system never touches balances directly.

pub mod ledger;
pub mod lot;
pub mod movement;

pub use ledger::{HistoryQuery, InventoryLedger, MovementPage, StockCandidate};
pub use lot::LotDetails;
pub use movement::{Movement, MovementDraft, MovementKind, StockRef, TripleKey};
