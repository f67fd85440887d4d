use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use depot_core::{
    ClientId, DomainError, DomainResult, InboundOrderId, LocationId, LotId, MovementId,
    OutboundOrderId, PickTaskId, ProductId, SupplierId, WorkerId,
};
use depot_events::alert::{OrderShort, StockBelowThreshold, TaskOverdue};
use depot_events::{AlertEvent, EventBus};
use depot_inbound::{InboundManager, InboundOrder, InboundStatus, ReceiveLine};
use depot_ledger::{
    HistoryQuery, InventoryLedger, MovementDraft, MovementPage, StockRef,
};
use depot_masterdata::MasterDataDirectory;
use depot_outbound::{OutboundManager, OutboundOrder, OutboundStatus};
use depot_picking::{PickScheduler, PickTask, PickTaskStatus, PlanReport};
use depot_registry::{LocationRegistry, LocationStatus};

const CONTENTION_RETRIES: u32 = 3;
const CONTENTION_BACKOFF: Duration = Duration::from_millis(5);

/// The fulfillment core's single public surface.
///
/// Owns the registry, ledger, order managers and pick scheduler as
/// process-scoped shared state, and an alert bus for the alerting
/// subsystem. Every mutation resolves its master-data references first,
/// so an unknown product, supplier or client fails before any stock moves.
pub struct FulfillmentCoordinator<B: EventBus<AlertEvent>> {
    registry: Arc<LocationRegistry>,
    ledger: Arc<InventoryLedger>,
    inbound: Arc<InboundManager>,
    outbound: Arc<OutboundManager>,
    scheduler: Arc<PickScheduler>,
    directory: Arc<dyn MasterDataDirectory>,
    alerts: B,
}

impl<B: EventBus<AlertEvent>> FulfillmentCoordinator<B> {
    pub fn new(
        registry: Arc<LocationRegistry>,
        directory: Arc<dyn MasterDataDirectory>,
        alerts: B,
    ) -> Self {
        let ledger = Arc::new(InventoryLedger::new(Arc::clone(&registry)));
        let inbound = Arc::new(InboundManager::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
        ));
        let outbound = Arc::new(OutboundManager::new(Arc::clone(&ledger)));
        let scheduler = Arc::new(PickScheduler::new(
            Arc::clone(&ledger),
            Arc::clone(&registry),
            Arc::clone(&outbound),
        ));
        Self {
            registry,
            ledger,
            inbound,
            outbound,
            scheduler,
            directory,
            alerts,
        }
    }

    /// Storage topology, for registration and manual blocking.
    pub fn registry(&self) -> &Arc<LocationRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger> {
        &self.ledger
    }

    // ---- inbound -----------------------------------------------------

    pub fn create_inbound_order(
        &self,
        supplier_id: SupplierId,
        expected_date: DateTime<Utc>,
        lines: Vec<(ProductId, i64)>,
    ) -> DomainResult<InboundOrderId> {
        self.directory.lookup_supplier(&supplier_id)?;
        for (product_id, _) in &lines {
            self.directory.lookup_product(product_id)?;
        }
        self.inbound.create_order(supplier_id, expected_date, lines)
    }

    /// Receive stock against an inbound order line.
    pub fn receive(&self, receive: ReceiveLine) -> DomainResult<MovementId> {
        with_contention_retry("receive", || self.inbound.receive_line(receive.clone()))
    }

    // ---- outbound ----------------------------------------------------

    pub fn create_outbound_order(
        &self,
        client_id: ClientId,
        required_date: DateTime<Utc>,
        lines: Vec<(ProductId, i64)>,
    ) -> DomainResult<OutboundOrderId> {
        self.directory.lookup_client(&client_id)?;
        for (product_id, _) in &lines {
            self.directory.lookup_product(product_id)?;
        }
        self.outbound.create_order(client_id, required_date, lines)
    }

    /// Plan pick tasks for an order, raising `OrderShort` for any line the
    /// available stock could not cover.
    pub fn plan(&self, order_id: &OutboundOrderId) -> DomainResult<PlanReport> {
        let report = self.scheduler.plan_tasks(order_id)?;
        for short in &report.shorts {
            self.emit(AlertEvent::OrderShort(OrderShort {
                order_id: *order_id,
                product_id: short.product_id,
                required: short.required,
                planned: short.planned,
                occurred_at: Utc::now(),
            }));
        }
        Ok(report)
    }

    pub fn assign(&self, task_id: &PickTaskId, worker: WorkerId) -> DomainResult<()> {
        self.scheduler.assign(task_id, worker)
    }

    pub fn unassign(&self, task_id: &PickTaskId) -> DomainResult<()> {
        self.scheduler.unassign(task_id)
    }

    /// Record a pick against a task.
    ///
    /// Contention retries reuse the caller's idempotency key, so a retry
    /// that lands after a slow first attempt replays instead of
    /// double-moving stock.
    pub fn pick(
        &self,
        task_id: &PickTaskId,
        quantity: i64,
        actor: &str,
        idempotency_key: Uuid,
    ) -> DomainResult<MovementId> {
        let movement_id = with_contention_retry("pick", || {
            self.scheduler
                .record_pick(task_id, quantity, actor, idempotency_key)
        })?;
        let task = self.scheduler.task(task_id)?;
        self.check_reorder_threshold(&task.product_id);
        Ok(movement_id)
    }

    /// Close a task, short if under the requested quantity.
    pub fn complete_task(&self, task_id: &PickTaskId) -> DomainResult<()> {
        self.scheduler.complete_task(task_id)
    }

    /// Explicit dispatch event from the shipping dock.
    pub fn ship(&self, order_id: &OutboundOrderId) -> DomainResult<()> {
        let progress = self.scheduler.progress(order_id)?;
        self.outbound.mark_shipped(order_id, &progress)
    }

    /// Cancel an order that has not been packed.
    ///
    /// Pending tasks are cancelled and any already-staged stock is
    /// transferred back to its pick sources, so cancellation never strands
    /// stock in the staging pseudo-location.
    pub fn cancel(&self, order_id: &OutboundOrderId, actor: &str) -> DomainResult<()> {
        let progress = self.scheduler.progress(order_id)?;
        self.outbound.cancel(order_id, &progress)?;
        for task in self.scheduler.tasks_for_order(order_id)? {
            if task.status == PickTaskStatus::Pending {
                self.scheduler.cancel_task(&task.id)?;
            }
        }
        self.reverse_staged(order_id, actor)
    }

    /// Cancel a packed order: reverse every staged pick back to its source
    /// location, then cancel. The reversals are ordinary transfer movements,
    /// so the retraction stays auditable in the ledger.
    pub fn cancel_packed(&self, order_id: &OutboundOrderId, actor: &str) -> DomainResult<()> {
        self.reverse_staged(order_id, actor)?;
        self.outbound.cancel_after_reversal(order_id)
    }

    // ---- stock maintenance -------------------------------------------

    /// Move stock between two storage locations.
    pub fn transfer_stock(
        &self,
        idempotency_key: Uuid,
        source: LocationId,
        destination: LocationId,
        product_id: ProductId,
        lot_id: LotId,
        quantity: i64,
        actor: &str,
    ) -> DomainResult<MovementId> {
        if self.registry.is_blocked(&destination)? {
            return Err(DomainError::LocationUnavailable {
                location: destination.to_string(),
                status: LocationStatus::Blocked.to_string(),
            });
        }
        with_contention_retry("transfer", || {
            self.ledger.record(MovementDraft::transfer(
                idempotency_key,
                StockRef::Location(source.clone()),
                StockRef::Location(destination.clone()),
                product_id,
                lot_id.clone(),
                quantity,
                actor,
            ))
        })
    }

    /// Signed manual correction. Negative deltas can trip the reorder alert.
    pub fn adjust_stock(
        &self,
        idempotency_key: Uuid,
        location: LocationId,
        product_id: ProductId,
        lot_id: LotId,
        delta: i64,
        actor: &str,
        reason: &str,
    ) -> DomainResult<MovementId> {
        let movement_id = with_contention_retry("adjustment", || {
            self.ledger.record(MovementDraft::adjustment(
                idempotency_key,
                location.clone(),
                product_id,
                lot_id.clone(),
                delta,
                actor,
                reason,
            ))
        })?;
        if delta < 0 {
            self.check_reorder_threshold(&product_id);
        }
        Ok(movement_id)
    }

    /// Emit `TaskOverdue` for every open task past its order's required
    /// date. Intended to run periodically.
    pub fn scan_overdue(&self, now: DateTime<Utc>) -> DomainResult<Vec<PickTask>> {
        let overdue = self.scheduler.overdue_tasks(now)?;
        for task in &overdue {
            let required_date = self.outbound.order(&task.order_id)?.required_date();
            self.emit(AlertEvent::TaskOverdue(TaskOverdue {
                task_id: task.id,
                order_id: task.order_id,
                assignee: task.assignee,
                required_date,
                occurred_at: now,
            }));
        }
        Ok(overdue)
    }

    // ---- reads -------------------------------------------------------

    pub fn location_status(&self, id: &LocationId) -> DomainResult<LocationStatus> {
        self.registry.status(id, self.ledger.as_ref())
    }

    pub fn capacity_remaining(&self, id: &LocationId) -> DomainResult<i64> {
        self.registry.capacity_remaining(id, self.ledger.as_ref())
    }

    pub fn balance_at(&self, location: &LocationId, product_id: &ProductId, lot_id: &LotId) -> i64 {
        self.ledger.balance_at(location, product_id, lot_id)
    }

    pub fn product_total(&self, product_id: &ProductId) -> i64 {
        self.ledger.product_total(product_id)
    }

    pub fn history(&self, query: &HistoryQuery) -> DomainResult<MovementPage> {
        self.ledger.history(query)
    }

    pub fn inbound_order(&self, id: &InboundOrderId) -> DomainResult<InboundOrder> {
        self.inbound.order(id)
    }

    pub fn inbound_status(&self, id: &InboundOrderId) -> DomainResult<InboundStatus> {
        self.inbound.status(id)
    }

    pub fn outbound_order(&self, id: &OutboundOrderId) -> DomainResult<OutboundOrder> {
        self.outbound.order(id)
    }

    pub fn outbound_status(&self, id: &OutboundOrderId) -> DomainResult<OutboundStatus> {
        let progress = self.scheduler.progress(id)?;
        self.outbound.status(id, &progress)
    }

    pub fn task(&self, id: &PickTaskId) -> DomainResult<PickTask> {
        self.scheduler.task(id)
    }

    pub fn tasks_for_order(&self, order_id: &OutboundOrderId) -> DomainResult<Vec<PickTask>> {
        self.scheduler.tasks_for_order(order_id)
    }

    // ---- internals ---------------------------------------------------

    /// Transfer staged stock back to the locations it was picked from.
    ///
    /// Walks the order's pick movements newest-first, capping each reversal
    /// at what is still staged, so a partially-failed earlier attempt can be
    /// re-run without over-returning.
    fn reverse_staged(&self, order_id: &OutboundOrderId, actor: &str) -> DomainResult<()> {
        let mut staged: HashMap<(ProductId, LotId), i64> = self
            .ledger
            .staging_stock(order_id)
            .into_iter()
            .map(|(product, lot, qty)| ((product, lot), qty))
            .collect();
        if staged.is_empty() {
            return Ok(());
        }

        let mut picks = self.ledger.picks_for_order(order_id)?;
        picks.reverse();
        for pick in picks {
            let Some(StockRef::Location(source)) = pick.source else {
                continue;
            };
            let Some(remaining) = staged.get_mut(&(pick.product_id, pick.lot_id.clone())) else {
                continue;
            };
            let quantity = pick.quantity.min(*remaining);
            if quantity == 0 {
                continue;
            }
            let key = Uuid::now_v7();
            with_contention_retry("staging reversal", || {
                self.ledger.record(MovementDraft::transfer(
                    key,
                    StockRef::Staging(*order_id),
                    StockRef::Location(source.clone()),
                    pick.product_id,
                    pick.lot_id.clone(),
                    quantity,
                    actor,
                ))
            })?;
            *remaining -= quantity;
        }
        tracing::debug!(order = %order_id, "staged stock reversed");
        Ok(())
    }

    fn check_reorder_threshold(&self, product_id: &ProductId) {
        let Ok(record) = self.directory.lookup_product(product_id) else {
            return;
        };
        let Some(threshold) = record.reorder_threshold else {
            return;
        };
        let balance = self.ledger.product_total(product_id);
        if balance <= threshold {
            self.emit(AlertEvent::StockBelowThreshold(StockBelowThreshold {
                product_id: *product_id,
                balance,
                threshold,
                occurred_at: Utc::now(),
            }));
        }
    }

    /// Alert delivery is best-effort; a dead bus never fails a business call.
    fn emit(&self, alert: AlertEvent) {
        if let Err(err) = self.alerts.publish(alert) {
            tracing::warn!(?err, "alert publish failed");
        }
    }
}

/// Run an operation, retrying lock-contention failures with doubling
/// backoff. Only `LockTimeout` is retried; every retried call reuses its
/// idempotency key, so retries can never double-apply.
fn with_contention_retry<T>(
    operation: &'static str,
    mut op: impl FnMut() -> DomainResult<T>,
) -> DomainResult<T> {
    let mut backoff = CONTENTION_BACKOFF;
    let mut attempt = 0;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < CONTENTION_RETRIES => {
                attempt += 1;
                tracing::warn!(%err, attempt, operation, "contended write; retrying");
                thread::sleep(backoff);
                backoff *= 2;
            }
            other => return other,
        }
    }
}
