use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{ClientId, DomainError, DomainResult, OutboundOrderId, ProductId};

/// Outbound order status lifecycle.
///
/// Derived from pick-task progress except for the two explicit transitions:
/// `Shipped` (dispatch event) and `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundStatus {
    Pending,
    Picking,
    Packed,
    Shipped,
    Cancelled,
}

/// One required line on an outbound order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub required_qty: i64,
    /// Set by planning when available stock could not cover the line.
    pub short: bool,
}

/// Aggregate pick-task state for one order, summarized by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PickProgress {
    pub total_tasks: usize,
    /// Tasks still `pending` (never started).
    pub untouched_tasks: usize,
    pub completed_tasks: usize,
    /// Units picked into staging, per product.
    pub picked_by_product: HashMap<ProductId, i64>,
}

/// An outbound (shipping) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundOrder {
    id: OutboundOrderId,
    client_id: ClientId,
    required_date: DateTime<Utc>,
    lines: Vec<OutboundLine>,
    shipped: bool,
    cancelled: bool,
}

impl OutboundOrder {
    pub fn new(
        id: OutboundOrderId,
        client_id: ClientId,
        required_date: DateTime<Utc>,
        lines: Vec<(ProductId, i64)>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("outbound order requires lines"));
        }
        let lines = lines
            .into_iter()
            .enumerate()
            .map(|(idx, (product_id, required_qty))| {
                if required_qty <= 0 {
                    return Err(DomainError::validation(format!(
                        "required quantity must be positive on line {}, got {required_qty}",
                        idx + 1
                    )));
                }
                Ok(OutboundLine {
                    line_no: (idx + 1) as u32,
                    product_id,
                    required_qty,
                    short: false,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self {
            id,
            client_id,
            required_date,
            lines,
            shipped: false,
            cancelled: false,
        })
    }

    pub fn id(&self) -> OutboundOrderId {
        self.id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn required_date(&self) -> DateTime<Utc> {
        self.required_date
    }

    pub fn lines(&self) -> &[OutboundLine] {
        &self.lines
    }

    /// Derived status given the current pick progress.
    pub fn status(&self, progress: &PickProgress) -> OutboundStatus {
        if self.cancelled {
            return OutboundStatus::Cancelled;
        }
        if self.shipped {
            return OutboundStatus::Shipped;
        }
        if progress.total_tasks == 0 || progress.untouched_tasks == progress.total_tasks {
            return OutboundStatus::Pending;
        }
        if progress.completed_tasks == progress.total_tasks && self.lines_satisfied(progress) {
            return OutboundStatus::Packed;
        }
        OutboundStatus::Picking
    }

    fn lines_satisfied(&self, progress: &PickProgress) -> bool {
        self.lines.iter().all(|line| {
            progress
                .picked_by_product
                .get(&line.product_id)
                .copied()
                .unwrap_or(0)
                >= line.required_qty
        })
    }

    /// Explicit dispatch event. Only reachable from `Packed`.
    pub(crate) fn mark_shipped(&mut self, progress: &PickProgress) -> DomainResult<()> {
        match self.status(progress) {
            OutboundStatus::Packed => {
                self.shipped = true;
                Ok(())
            }
            status => Err(DomainError::conflict(format!(
                "order {} cannot ship from {status:?}",
                self.id
            ))),
        }
    }

    /// Plain cancellation, reachable from `Pending` or `Picking` only.
    /// A packed order must take the reversal path instead.
    pub(crate) fn cancel(&mut self, progress: &PickProgress) -> DomainResult<()> {
        match self.status(progress) {
            OutboundStatus::Pending | OutboundStatus::Picking => {
                self.cancelled = true;
                Ok(())
            }
            OutboundStatus::Packed => Err(DomainError::conflict(format!(
                "order {} is packed; reverse staged stock before cancelling",
                self.id
            ))),
            status => Err(DomainError::conflict(format!(
                "order {} cannot cancel from {status:?}",
                self.id
            ))),
        }
    }

    /// Cancellation after the staged stock has been transferred back.
    pub(crate) fn cancel_after_reversal(&mut self) -> DomainResult<()> {
        if self.shipped {
            return Err(DomainError::conflict(format!(
                "order {} already shipped",
                self.id
            )));
        }
        self.cancelled = true;
        Ok(())
    }

    pub(crate) fn mark_line_short(&mut self, product_id: &ProductId) {
        for line in &mut self.lines {
            if line.product_id == *product_id {
                line.short = true;
            }
        }
    }
}
