//! Receiving workflow: validate against the registry, move stock through the
//! ledger, then reconcile the order line.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use depot_core::{
    DomainError, DomainResult, InboundOrderId, LocationId, LotId, MovementId, ProductId,
    SupplierId,
};
use depot_ledger::{InventoryLedger, LotDetails, MovementDraft};
use depot_registry::LocationRegistry;

use crate::order::{InboundOrder, InboundStatus};

/// One receipt against an inbound order line.
#[derive(Debug, Clone)]
pub struct ReceiveLine {
    pub order_id: InboundOrderId,
    pub line_no: u32,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub lot_expires_at: Option<DateTime<Utc>>,
    pub quantity: i64,
    pub actor: String,
    pub idempotency_key: Uuid,
}

/// Models receiving orders and their reconciliation into the ledger.
#[derive(Debug)]
pub struct InboundManager {
    registry: Arc<LocationRegistry>,
    ledger: Arc<InventoryLedger>,
    orders: RwLock<HashMap<InboundOrderId, InboundOrder>>,
}

impl InboundManager {
    pub fn new(registry: Arc<LocationRegistry>, ledger: Arc<InventoryLedger>) -> Self {
        Self {
            registry,
            ledger,
            orders: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_order(
        &self,
        supplier_id: SupplierId,
        expected_date: DateTime<Utc>,
        lines: Vec<(ProductId, i64)>,
    ) -> DomainResult<InboundOrderId> {
        let id = InboundOrderId::new();
        let order = InboundOrder::new(id, supplier_id, expected_date, lines)?;
        let mut orders = self.orders_mut()?;
        orders.insert(id, order);
        tracing::debug!(order = %id, "inbound order created");
        Ok(id)
    }

    /// Receive a quantity against one order line.
    ///
    /// Checks the destination is not blocked, records the receipt through the
    /// ledger (the only stock mutation), then reconciles the line. The line
    /// update is deliberately outside the ledger's serialization unit: each
    /// line's write is independent per the concurrency model, and the order's
    /// derived status simply reflects the lines actually applied.
    pub fn receive_line(&self, receive: ReceiveLine) -> DomainResult<MovementId> {
        let product_id = {
            let orders = self.orders_ref()?;
            let order = orders.get(&receive.order_id).ok_or(DomainError::NotFound)?;
            order.check_receivable(receive.line_no)?
        };

        if self.registry.is_blocked(&receive.location_id)? {
            return Err(DomainError::LocationUnavailable {
                location: receive.location_id.to_string(),
                status: "blocked".to_string(),
            });
        }

        let movement_id = self.ledger.record(MovementDraft::receipt(
            receive.idempotency_key,
            receive.location_id.clone(),
            product_id,
            receive.lot_id.clone(),
            receive.quantity,
            receive.actor.clone(),
        ))?;

        self.ledger.register_lot(LotDetails {
            lot_id: receive.lot_id.clone(),
            product_id,
            expires_at: receive.lot_expires_at,
        })?;

        let mut orders = self.orders_mut()?;
        let order = orders
            .get_mut(&receive.order_id)
            .ok_or(DomainError::NotFound)?;
        order.apply_receipt(receive.line_no, receive.quantity)?;
        tracing::debug!(
            order = %receive.order_id,
            line = receive.line_no,
            quantity = receive.quantity,
            status = ?order.status(),
            "inbound line received"
        );
        Ok(movement_id)
    }

    pub fn order(&self, id: &InboundOrderId) -> DomainResult<InboundOrder> {
        let orders = self.orders_ref()?;
        orders.get(id).cloned().ok_or(DomainError::NotFound)
    }

    pub fn status(&self, id: &InboundOrderId) -> DomainResult<InboundStatus> {
        Ok(self.order(id)?.status())
    }

    fn orders_ref(
        &self,
    ) -> DomainResult<std::sync::RwLockReadGuard<'_, HashMap<InboundOrderId, InboundOrder>>> {
        self.orders
            .read()
            .map_err(|_| DomainError::conflict("inbound orders poisoned"))
    }

    fn orders_mut(
        &self,
    ) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<InboundOrderId, InboundOrder>>> {
        self.orders
            .write()
            .map_err(|_| DomainError::conflict("inbound orders poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_registry::{Location, LocationType, StorageClass, TemperatureBand, Zone};
    use depot_core::ZoneId;

    fn setup() -> (Arc<LocationRegistry>, Arc<InventoryLedger>, InboundManager, LocationId) {
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
        let ledger = Arc::new(InventoryLedger::new(Arc::clone(&registry)));
        let manager = InboundManager::new(Arc::clone(&registry), Arc::clone(&ledger));
        (registry, ledger, manager, location)
    }

    fn receive(
        order_id: InboundOrderId,
        line_no: u32,
        location: &LocationId,
        quantity: i64,
    ) -> ReceiveLine {
        ReceiveLine {
            order_id,
            line_no,
            location_id: location.clone(),
            lot_id: LotId::new("L1").unwrap(),
            lot_expires_at: None,
            quantity,
            actor: "dock-1".to_string(),
            idempotency_key: Uuid::now_v7(),
        }
    }

    #[test]
    fn receipt_lands_in_ledger_and_reconciles_the_line() {
        let (_registry, ledger, manager, location) = setup();
        let product = ProductId::new();
        let order_id = manager
            .create_order(SupplierId::new(), Utc::now(), vec![(product, 50)])
            .unwrap();

        manager
            .receive_line(receive(order_id, 1, &location, 30))
            .unwrap();
        assert_eq!(manager.status(&order_id).unwrap(), InboundStatus::InProgress);
        assert_eq!(
            ledger.balance_at(&location, &product, &LotId::new("L1").unwrap()),
            30
        );

        manager
            .receive_line(receive(order_id, 1, &location, 20))
            .unwrap();
        assert_eq!(manager.status(&order_id).unwrap(), InboundStatus::Completed);
    }

    #[test]
    fn blocked_location_refuses_receipts() {
        let (registry, ledger, manager, location) = setup();
        let product = ProductId::new();
        let order_id = manager
            .create_order(SupplierId::new(), Utc::now(), vec![(product, 10)])
            .unwrap();

        registry.block(&location).unwrap();
        let err = manager
            .receive_line(receive(order_id, 1, &location, 10))
            .unwrap_err();
        assert!(matches!(err, DomainError::LocationUnavailable { .. }));
        // Nothing moved.
        assert_eq!(
            ledger.balance_at(&location, &product, &LotId::new("L1").unwrap()),
            0
        );
    }

    #[test]
    fn completed_order_rejects_further_receipts() {
        let (_registry, _ledger, manager, location) = setup();
        let product = ProductId::new();
        let order_id = manager
            .create_order(SupplierId::new(), Utc::now(), vec![(product, 10)])
            .unwrap();

        manager
            .receive_line(receive(order_id, 1, &location, 10))
            .unwrap();
        let err = manager
            .receive_line(receive(order_id, 1, &location, 1))
            .unwrap_err();
        assert!(matches!(err, DomainError::OrderClosed(_)));
    }

    #[test]
    fn lot_expiry_is_registered_with_the_receipt() {
        let (_registry, ledger, manager, location) = setup();
        let product = ProductId::new();
        let order_id = manager
            .create_order(SupplierId::new(), Utc::now(), vec![(product, 10)])
            .unwrap();

        let expires = Utc::now() + chrono::Duration::days(14);
        let mut line = receive(order_id, 1, &location, 10);
        line.lot_expires_at = Some(expires);
        manager.receive_line(line).unwrap();

        assert_eq!(ledger.lot_expiry(&LotId::new("L1").unwrap()), Some(expires));
    }
}
