//! Pick task scheduling: plan, assign, record picks, complete.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use depot_core::{
    DomainError, DomainResult, MovementId, OutboundOrderId, PickTaskId, ProductId, WorkerId,
};
use depot_ledger::{InventoryLedger, MovementDraft};
use depot_outbound::{OutboundManager, PickProgress};
use depot_registry::LocationRegistry;

use crate::planner::{self, PlannedPick};
use crate::task::{PickTask, PickTaskStatus};

/// A line planning could not fully cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortLine {
    pub product_id: ProductId,
    pub required: i64,
    pub planned: i64,
}

/// Outcome of planning one order: the generated tasks and any short lines.
#[derive(Debug, Clone)]
pub struct PlanReport {
    pub order_id: OutboundOrderId,
    pub tasks: Vec<PickTask>,
    pub shorts: Vec<ShortLine>,
}

/// Decomposes outbound orders into ordered pick tasks and tracks their
/// execution. Each accepted pick is a `pick` movement in the ledger; the
/// task's `picked_qty` and the order's staging balance move in lockstep.
#[derive(Debug)]
pub struct PickScheduler {
    ledger: Arc<InventoryLedger>,
    registry: Arc<LocationRegistry>,
    outbound: Arc<OutboundManager>,
    tasks: RwLock<HashMap<PickTaskId, PickTask>>,
    by_order: RwLock<HashMap<OutboundOrderId, Vec<PickTaskId>>>,
}

impl PickScheduler {
    pub fn new(
        ledger: Arc<InventoryLedger>,
        registry: Arc<LocationRegistry>,
        outbound: Arc<OutboundManager>,
    ) -> Self {
        Self {
            ledger,
            registry,
            outbound,
            tasks: RwLock::new(HashMap::new()),
            by_order: RwLock::new(HashMap::new()),
        }
    }

    /// Plan pick tasks for an order.
    ///
    /// One task per planned (location, lot) withdrawal, sequenced zone by
    /// zone so a picker walks each zone once. Blocked locations are never
    /// picked from. Lines the stock on hand cannot cover are planned for
    /// what is available and reported in `shorts` rather than failing the
    /// order. Planning an order twice is a conflict.
    pub fn plan_tasks(&self, order_id: &OutboundOrderId) -> DomainResult<PlanReport> {
        let order = self.outbound.order(order_id)?;
        let progress = self.progress(order_id)?;
        match order.status(&progress) {
            depot_outbound::OutboundStatus::Pending => {}
            status => {
                return Err(DomainError::conflict(format!(
                    "order {order_id} cannot be planned from {status:?}"
                )));
            }
        }
        {
            let by_order = self.by_order_ref()?;
            if by_order.get(order_id).is_some_and(|ids| !ids.is_empty()) {
                return Err(DomainError::conflict(format!(
                    "order {order_id} is already planned"
                )));
            }
        }

        let mut planned: Vec<(u32, PlannedPick)> = Vec::new();
        let mut shorts = Vec::new();
        for line in order.lines() {
            let mut candidates = self.ledger.candidate_stock(&line.product_id);
            candidates.retain(|c| !self.registry.is_blocked(&c.location_id).unwrap_or(true));
            let plan = planner::plan_line(line, candidates, |id| self.registry.zone_of(id))?;
            if plan.shortfall > 0 {
                self.outbound.mark_line_short(order_id, &plan.product_id)?;
                shorts.push(ShortLine {
                    product_id: plan.product_id,
                    required: line.required_qty,
                    planned: line.required_qty - plan.shortfall,
                });
            }
            planned.extend(plan.picks.into_iter().map(|pick| (plan.line_no, pick)));
        }
        planner::sequence_by_zone(&mut planned);

        let tasks: Vec<PickTask> = planned
            .into_iter()
            .enumerate()
            .map(|(idx, (_, pick))| {
                PickTask::new(
                    PickTaskId::new(),
                    *order_id,
                    pick.location_id,
                    pick.product_id,
                    pick.lot_id,
                    pick.quantity,
                    (idx + 1) as u32,
                )
            })
            .collect();

        let mut all = self.tasks_mut()?;
        let mut by_order = self.by_order_mut()?;
        let ids = by_order.entry(*order_id).or_default();
        for task in &tasks {
            ids.push(task.id);
            all.insert(task.id, task.clone());
        }
        tracing::debug!(
            order = %order_id,
            tasks = tasks.len(),
            shorts = shorts.len(),
            "pick tasks planned"
        );
        Ok(PlanReport {
            order_id: *order_id,
            tasks,
            shorts,
        })
    }

    pub fn assign(&self, task_id: &PickTaskId, worker: WorkerId) -> DomainResult<()> {
        let mut tasks = self.tasks_mut()?;
        let task = tasks.get_mut(task_id).ok_or(DomainError::NotFound)?;
        task.assign(worker)?;
        tracing::debug!(task = %task_id, worker = %worker, "pick task assigned");
        Ok(())
    }

    pub fn unassign(&self, task_id: &PickTaskId) -> DomainResult<()> {
        let mut tasks = self.tasks_mut()?;
        let task = tasks.get_mut(task_id).ok_or(DomainError::NotFound)?;
        task.unassign()
    }

    /// Record a (possibly partial) pick against a task.
    ///
    /// The quantity is reserved on the task first, then written to the
    /// ledger as a `pick` movement into the order's staging pseudo-location,
    /// then committed. A ledger rejection (insufficient stock, lock timeout)
    /// releases the reservation, leaving the task untouched. Replaying an
    /// idempotency key returns the original movement without re-counting.
    pub fn record_pick(
        &self,
        task_id: &PickTaskId,
        quantity: i64,
        actor: impl Into<String>,
        idempotency_key: Uuid,
    ) -> DomainResult<MovementId> {
        let (order_id, draft) = {
            let mut tasks = self.tasks_mut()?;
            let task = tasks.get_mut(task_id).ok_or(DomainError::NotFound)?;

            // Replayed key: return the already-recorded movement id.
            if let Some(existing) = self
                .ledger
                .picks_for_order(&task.order_id)?
                .into_iter()
                .find(|m| m.idempotency_key == idempotency_key)
            {
                return Ok(existing.id);
            }

            task.reserve_pick(quantity)?;
            let draft = MovementDraft::pick(
                idempotency_key,
                task.location_id.clone(),
                task.order_id,
                task.product_id,
                task.lot_id.clone(),
                quantity,
                actor,
            );
            (task.order_id, draft)
        };

        // Ledger write happens outside the task lock; per-triple locks in
        // the ledger can wait up to their timeout.
        let recorded = self.ledger.record(draft);

        let mut tasks = self.tasks_mut()?;
        let task = tasks.get_mut(task_id).ok_or(DomainError::NotFound)?;
        match recorded {
            Ok(movement_id) => {
                task.commit_pick(quantity);
                tracing::debug!(
                    task = %task_id,
                    order = %order_id,
                    quantity,
                    "pick recorded"
                );
                Ok(movement_id)
            }
            Err(err) => {
                task.abort_pick(quantity);
                Err(err)
            }
        }
    }

    /// Close a task, short if `picked_qty < requested_qty`.
    pub fn complete_task(&self, task_id: &PickTaskId) -> DomainResult<()> {
        let mut tasks = self.tasks_mut()?;
        let task = tasks.get_mut(task_id).ok_or(DomainError::NotFound)?;
        task.complete()?;
        if task.picked_qty < task.requested_qty {
            tracing::warn!(
                task = %task_id,
                picked = task.picked_qty,
                requested = task.requested_qty,
                "pick task completed short"
            );
        }
        Ok(())
    }

    pub fn cancel_task(&self, task_id: &PickTaskId) -> DomainResult<()> {
        let mut tasks = self.tasks_mut()?;
        let task = tasks.get_mut(task_id).ok_or(DomainError::NotFound)?;
        task.cancel()
    }

    pub fn task(&self, task_id: &PickTaskId) -> DomainResult<PickTask> {
        let tasks = self.tasks_ref()?;
        tasks.get(task_id).cloned().ok_or(DomainError::NotFound)
    }

    /// All tasks for an order in walk-sequence order, cancelled included.
    pub fn tasks_for_order(&self, order_id: &OutboundOrderId) -> DomainResult<Vec<PickTask>> {
        let tasks = self.tasks_ref()?;
        let by_order = self.by_order_ref()?;
        let mut out: Vec<PickTask> = by_order
            .get(order_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tasks.get(id).cloned())
            .collect();
        out.sort_by_key(|t| t.sequence);
        Ok(out)
    }

    /// Aggregate task state for one order, the input to the derived
    /// outbound status. Cancelled tasks do not count toward totals.
    pub fn progress(&self, order_id: &OutboundOrderId) -> DomainResult<PickProgress> {
        let mut progress = PickProgress::default();
        for task in self.tasks_for_order(order_id)? {
            if task.status == PickTaskStatus::Cancelled {
                continue;
            }
            progress.total_tasks += 1;
            match task.status {
                PickTaskStatus::Pending => progress.untouched_tasks += 1,
                PickTaskStatus::Completed => progress.completed_tasks += 1,
                _ => {}
            }
            if task.picked_qty > 0 {
                *progress.picked_by_product.entry(task.product_id).or_insert(0) +=
                    task.picked_qty;
            }
        }
        Ok(progress)
    }

    /// Open tasks whose order's required date has passed.
    pub fn overdue_tasks(&self, now: DateTime<Utc>) -> DomainResult<Vec<PickTask>> {
        let tasks = self.tasks_ref()?;
        let mut due_dates: HashMap<OutboundOrderId, DateTime<Utc>> = HashMap::new();
        let mut overdue = Vec::new();
        for task in tasks.values() {
            if !task.is_open() {
                continue;
            }
            let required = match due_dates.get(&task.order_id) {
                Some(date) => *date,
                None => {
                    let date = self.outbound.order(&task.order_id)?.required_date();
                    due_dates.insert(task.order_id, date);
                    date
                }
            };
            if required < now {
                overdue.push(task.clone());
            }
        }
        overdue.sort_by_key(|t| (t.order_id, t.sequence));
        Ok(overdue)
    }

    fn tasks_ref(
        &self,
    ) -> DomainResult<std::sync::RwLockReadGuard<'_, HashMap<PickTaskId, PickTask>>> {
        self.tasks
            .read()
            .map_err(|_| DomainError::conflict("pick tasks poisoned"))
    }

    fn tasks_mut(
        &self,
    ) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<PickTaskId, PickTask>>> {
        self.tasks
            .write()
            .map_err(|_| DomainError::conflict("pick tasks poisoned"))
    }

    fn by_order_ref(
        &self,
    ) -> DomainResult<std::sync::RwLockReadGuard<'_, HashMap<OutboundOrderId, Vec<PickTaskId>>>>
    {
        self.by_order
            .read()
            .map_err(|_| DomainError::conflict("pick task index poisoned"))
    }

    fn by_order_mut(
        &self,
    ) -> DomainResult<std::sync::RwLockWriteGuard<'_, HashMap<OutboundOrderId, Vec<PickTaskId>>>>
    {
        self.by_order
            .write()
            .map_err(|_| DomainError::conflict("pick task index poisoned"))
    }
}
