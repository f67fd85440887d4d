use serde::{Deserialize, Serialize};

use depot_core::{
    DomainError, DomainResult, LocationId, LotId, OutboundOrderId, PickTaskId, ProductId, WorkerId,
};

/// Pick task status.
///
/// Transitions are monotonic: `pending → in_progress → completed`, or
/// `pending → cancelled`. `in_progress → pending` (unassign) is allowed only
/// while nothing has been picked; partial work is never discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickTaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// A unit of work directing a worker to remove a quantity of a product from
/// a specific location for an outbound order.
///
/// `picked_qty` only ever reflects ledger-accepted picks. While a pick is in
/// flight (reserved but not yet recorded) the quantity sits in
/// `inflight_qty`, which keeps concurrent picks on one task from jointly
/// exceeding the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickTask {
    pub id: PickTaskId,
    pub order_id: OutboundOrderId,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub lot_id: LotId,
    pub requested_qty: i64,
    pub picked_qty: i64,
    #[serde(skip)]
    inflight_qty: i64,
    pub status: PickTaskStatus,
    pub assignee: Option<WorkerId>,
    /// Position in the order's walk sequence (zone-grouped).
    pub sequence: u32,
}

impl PickTask {
    pub fn new(
        id: PickTaskId,
        order_id: OutboundOrderId,
        location_id: LocationId,
        product_id: ProductId,
        lot_id: LotId,
        requested_qty: i64,
        sequence: u32,
    ) -> Self {
        Self {
            id,
            order_id,
            location_id,
            product_id,
            lot_id,
            requested_qty,
            picked_qty: 0,
            inflight_qty: 0,
            status: PickTaskStatus::Pending,
            assignee: None,
            sequence,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, PickTaskStatus::Pending | PickTaskStatus::InProgress)
    }

    /// Hand the task to a worker and start it.
    pub fn assign(&mut self, worker: WorkerId) -> DomainResult<()> {
        match self.status {
            PickTaskStatus::Pending => {
                self.assignee = Some(worker);
                self.status = PickTaskStatus::InProgress;
                Ok(())
            }
            status => Err(DomainError::conflict(format!(
                "task {} cannot be assigned from {status:?}",
                self.id
            ))),
        }
    }

    /// Return an untouched task to the pool.
    pub fn unassign(&mut self) -> DomainResult<()> {
        if self.status != PickTaskStatus::InProgress {
            return Err(DomainError::conflict(format!(
                "task {} is not in progress",
                self.id
            )));
        }
        if self.picked_qty > 0 || self.inflight_qty > 0 {
            return Err(DomainError::conflict(format!(
                "task {} has picked quantity; partial work is never discarded",
                self.id
            )));
        }
        self.assignee = None;
        self.status = PickTaskStatus::Pending;
        Ok(())
    }

    /// Reserve a quantity ahead of the ledger write.
    ///
    /// The over-pick check comes first so a pick against an already-satisfied
    /// task reports `OverPick` rather than a generic state error.
    pub fn reserve_pick(&mut self, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation(format!(
                "pick quantity must be positive, got {quantity}"
            )));
        }
        let committed_or_inflight = self.picked_qty + self.inflight_qty;
        if committed_or_inflight + quantity > self.requested_qty {
            return Err(DomainError::OverPick {
                task: self.id.to_string(),
                requested: self.requested_qty,
                picked: committed_or_inflight,
                attempted: quantity,
            });
        }
        if self.status != PickTaskStatus::InProgress {
            return Err(DomainError::conflict(format!(
                "task {} is not in progress",
                self.id
            )));
        }
        self.inflight_qty += quantity;
        Ok(())
    }

    /// The ledger accepted the pick: commit it. Auto-completes when the
    /// requested quantity is fully picked.
    pub fn commit_pick(&mut self, quantity: i64) {
        self.inflight_qty -= quantity;
        self.picked_qty += quantity;
        if self.picked_qty == self.requested_qty {
            self.status = PickTaskStatus::Completed;
        }
    }

    /// The ledger rejected the pick: drop the reservation.
    pub fn abort_pick(&mut self, quantity: i64) {
        self.inflight_qty -= quantity;
    }

    /// Explicitly close the task, possibly short of the requested quantity.
    pub fn complete(&mut self) -> DomainResult<()> {
        if self.status != PickTaskStatus::InProgress {
            return Err(DomainError::conflict(format!(
                "task {} is not in progress",
                self.id
            )));
        }
        if self.inflight_qty > 0 {
            return Err(DomainError::conflict(format!(
                "task {} has a pick in flight",
                self.id
            )));
        }
        self.status = PickTaskStatus::Completed;
        Ok(())
    }

    /// Tasks can be cancelled only while `pending`.
    pub fn cancel(&mut self) -> DomainResult<()> {
        match self.status {
            PickTaskStatus::Pending => {
                self.status = PickTaskStatus::Cancelled;
                Ok(())
            }
            status => Err(DomainError::conflict(format!(
                "task {} cannot be cancelled from {status:?}",
                self.id
            ))),
        }
    }
}
