use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use depot_core::{ClientId, DomainError, DomainResult, ProductId, SupplierId};

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub unit_weight_kg: Option<f64>,
    /// Total on-hand at or below this raises a reorder alert.
    pub reorder_threshold: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRecord {
    pub id: SupplierId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
}

/// Lookup surface for reference data. Misses are `UnknownReference`, which
/// callers treat as fail-fast on order entry.
pub trait MasterDataDirectory: Send + Sync {
    fn lookup_product(&self, id: &ProductId) -> DomainResult<ProductRecord>;
    fn lookup_supplier(&self, id: &SupplierId) -> DomainResult<SupplierRecord>;
    fn lookup_client(&self, id: &ClientId) -> DomainResult<ClientRecord>;
}

/// In-memory directory, loaded up front.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    products: RwLock<HashMap<ProductId, ProductRecord>>,
    suppliers: RwLock<HashMap<SupplierId, SupplierRecord>>,
    clients: RwLock<HashMap<ClientId, ClientRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_product(&self, record: ProductRecord) -> DomainResult<()> {
        let mut products = write(&self.products, "products")?;
        products.insert(record.id, record);
        Ok(())
    }

    pub fn upsert_supplier(&self, record: SupplierRecord) -> DomainResult<()> {
        let mut suppliers = write(&self.suppliers, "suppliers")?;
        suppliers.insert(record.id, record);
        Ok(())
    }

    pub fn upsert_client(&self, record: ClientRecord) -> DomainResult<()> {
        let mut clients = write(&self.clients, "clients")?;
        clients.insert(record.id, record);
        Ok(())
    }
}

impl MasterDataDirectory for InMemoryDirectory {
    fn lookup_product(&self, id: &ProductId) -> DomainResult<ProductRecord> {
        read(&self.products, "products")?
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::unknown_reference("product", id.to_string()))
    }

    fn lookup_supplier(&self, id: &SupplierId) -> DomainResult<SupplierRecord> {
        read(&self.suppliers, "suppliers")?
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::unknown_reference("supplier", id.to_string()))
    }

    fn lookup_client(&self, id: &ClientId) -> DomainResult<ClientRecord> {
        read(&self.clients, "clients")?
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::unknown_reference("client", id.to_string()))
    }
}

fn read<'a, K, V>(
    lock: &'a RwLock<HashMap<K, V>>,
    what: &str,
) -> DomainResult<std::sync::RwLockReadGuard<'a, HashMap<K, V>>> {
    lock.read()
        .map_err(|_| DomainError::conflict(format!("{what} store poisoned")))
}

fn write<'a, K, V>(
    lock: &'a RwLock<HashMap<K, V>>,
    what: &str,
) -> DomainResult<std::sync::RwLockWriteGuard<'a, HashMap<K, V>>> {
    lock.write()
        .map_err(|_| DomainError::conflict(format!("{what} store poisoned")))
}
