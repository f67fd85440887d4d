//! Outbound order store and explicit lifecycle transitions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use depot_core::{ClientId, DomainError, DomainResult, OutboundOrderId, ProductId};
use depot_ledger::InventoryLedger;

use crate::order::{OutboundOrder, OutboundStatus, PickProgress};

/// Models shipping orders, their required quantities and completion criteria.
#[derive(Debug)]
pub struct OutboundManager {
    ledger: Arc<InventoryLedger>,
    orders: RwLock<HashMap<OutboundOrderId, OutboundOrder>>,
}

impl OutboundManager {
    pub fn new(ledger: Arc<InventoryLedger>) -> Self {
        Self {
            ledger,
            orders: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_order(
        &self,
        client_id: ClientId,
        required_date: DateTime<Utc>,
        lines: Vec<(ProductId, i64)>,
    ) -> DomainResult<OutboundOrderId> {
        let id = OutboundOrderId::new();
        let order = OutboundOrder::new(id, client_id, required_date, lines)?;
        let mut orders = self.orders_mut()?;
        orders.insert(id, order);
        tracing::debug!(order = %id, "outbound order created");
        Ok(id)
    }

    pub fn order(&self, id: &OutboundOrderId) -> DomainResult<OutboundOrder> {
        let orders = self.orders_ref()?;
        orders.get(id).cloned().ok_or(DomainError::NotFound)
    }

    pub fn status(
        &self,
        id: &OutboundOrderId,
        progress: &PickProgress,
    ) -> DomainResult<OutboundStatus> {
        Ok(self.order(id)?.status(progress))
    }

    /// Explicit dispatch event from the shipping dock.
    pub fn mark_shipped(
        &self,
        id: &OutboundOrderId,
        progress: &PickProgress,
    ) -> DomainResult<()> {
        let mut orders = self.orders_mut()?;
        let order = orders.get_mut(id).ok_or(DomainError::NotFound)?;
        order.mark_shipped(progress)?;
        tracing::debug!(order = %id, "outbound order shipped");
        Ok(())
    }

    /// Cancel from `Pending`/`Picking`. Packed orders must drain staging
    /// through reversal transfers first (see `cancel_after_reversal`).
    pub fn cancel(&self, id: &OutboundOrderId, progress: &PickProgress) -> DomainResult<()> {
        let mut orders = self.orders_mut()?;
        let order = orders.get_mut(id).ok_or(DomainError::NotFound)?;
        order.cancel(progress)?;
        tracing::debug!(order = %id, "outbound order cancelled");
        Ok(())
    }

    /// Cancel a packed order once its staging pseudo-location is empty.
    ///
    /// The reversal movements themselves are recorded by the coordinator;
    /// this transition only verifies the staging balance has drained so the
    /// cancellation stays a deliberate, auditable action.
    pub fn cancel_after_reversal(&self, id: &OutboundOrderId) -> DomainResult<()> {
        let staged = self.ledger.staging_stock(id);
        if !staged.is_empty() {
            let held: i64 = staged.iter().map(|(_, _, qty)| qty).sum();
            return Err(DomainError::conflict(format!(
                "order {id} still holds {held} staged units; reverse them before cancelling"
            )));
        }
        let mut orders = self.orders_mut()?;
        let order = orders.get_mut(id).ok_or(DomainError::NotFound)?;
        order.cancel_after_reversal()?;
        tracing::debug!(order = %id, "outbound order cancelled after reversal");
        Ok(())
    }

    /// Flag a line that planning could not fully cover.
    pub fn mark_line_short(
        &self,
        id: &OutboundOrderId,
        product_id: &ProductId,
    ) -> DomainResult<()> {
        let mut orders = self.orders_mut()?;
        let order = orders.get_mut(id).ok_or(DomainError::NotFound)?;
        order.mark_line_short(product_id);
        Ok(())
    }

    fn orders_ref(
        &self,
    ) -> DomainResult<std::sync::RwLockReadGuard<'_, HashMap<OutboundOrderId, OutboundOrder>>> {
        self.orders
            .read()
            .map_err(|_| DomainError::conflict("outbound orders poisoned"))
    }

    fn orders_mut(
        &self,
    ) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<OutboundOrderId, OutboundOrder>>> {
        self.orders
            .write()
            .map_err(|_| DomainError::conflict("outbound orders poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{LocationId, LotId, ZoneId};
    use depot_ledger::MovementDraft;
    use depot_registry::{
        Location, LocationRegistry, LocationType, StorageClass, TemperatureBand, Zone,
    };
    use uuid::Uuid;

    fn manager_with_ledger() -> (OutboundManager, Arc<InventoryLedger>, LocationId) {
        let registry = Arc::new(LocationRegistry::new());
        let zone_id = ZoneId::new("A").unwrap();
        registry
            .register_zone(
                Zone::new(
                    zone_id.clone(),
                    "Ambient A",
                    StorageClass::Dry,
                    TemperatureBand::new(10, 25).unwrap(),
                    100_000,
                )
                .unwrap(),
            )
            .unwrap();
        let location = LocationId::new("A-01-01").unwrap();
        registry
            .register_location(
                Location::new(location.clone(), zone_id, LocationType::Pallet, 1000, None).unwrap(),
            )
            .unwrap();
        let ledger = Arc::new(InventoryLedger::new(registry));
        (OutboundManager::new(Arc::clone(&ledger)), ledger, location)
    }

    #[test]
    fn cancel_after_reversal_requires_empty_staging() {
        let (manager, ledger, location) = manager_with_ledger();
        let product = ProductId::new();
        let lot = LotId::new("L1").unwrap();
        let order_id = manager
            .create_order(ClientId::new(), Utc::now(), vec![(product, 10)])
            .unwrap();

        ledger
            .record(MovementDraft::receipt(
                Uuid::now_v7(),
                location.clone(),
                product,
                lot.clone(),
                10,
                "w1",
            ))
            .unwrap();
        ledger
            .record(MovementDraft::pick(
                Uuid::now_v7(),
                location.clone(),
                order_id,
                product,
                lot.clone(),
                10,
                "w1",
            ))
            .unwrap();

        let err = manager.cancel_after_reversal(&order_id).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        ledger
            .record(MovementDraft::transfer(
                Uuid::now_v7(),
                depot_ledger::StockRef::Staging(order_id),
                depot_ledger::StockRef::Location(location),
                product,
                lot,
                10,
                "supervisor",
            ))
            .unwrap();
        manager.cancel_after_reversal(&order_id).unwrap();
        assert_eq!(
            manager
                .status(&order_id, &PickProgress::default())
                .unwrap(),
            OutboundStatus::Cancelled
        );
    }
}
