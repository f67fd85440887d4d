//! `depot-masterdata` — product, supplier and client reference data.
//!
//! Every order entry point resolves its references here first, so an
//! unknown product or party is rejected before any stock moves.

pub mod directory;

pub use directory::{
    ClientRecord, InMemoryDirectory, MasterDataDirectory, ProductRecord, SupplierRecord,
};
