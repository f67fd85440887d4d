//! Alert events emitted by the warehouse core.
//!
//! Plain data records for the alerting subsystem. The core decides *when*
//! something is alert-worthy; rendering and delivery happen downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{OutboundOrderId, PickTaskId, ProductId, WorkerId};

use crate::event::Event;

/// A product's total on-hand balance fell to or below its reorder threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBelowThreshold {
    pub product_id: ProductId,
    pub balance: i64,
    pub threshold: i64,
    pub occurred_at: DateTime<Utc>,
}

/// A pick task is still open past its order's required date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOverdue {
    pub task_id: PickTaskId,
    pub order_id: OutboundOrderId,
    pub assignee: Option<WorkerId>,
    pub required_date: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Planning could not cover an order line with available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShort {
    pub order_id: OutboundOrderId,
    pub product_id: ProductId,
    pub required: i64,
    pub planned: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertEvent {
    StockBelowThreshold(StockBelowThreshold),
    TaskOverdue(TaskOverdue),
    OrderShort(OrderShort),
}

impl Event for AlertEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AlertEvent::StockBelowThreshold(_) => "stock.below_threshold",
            AlertEvent::TaskOverdue(_) => "picking.task.overdue",
            AlertEvent::OrderShort(_) => "outbound.order.short",
        }
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AlertEvent::StockBelowThreshold(e) => e.occurred_at,
            AlertEvent::TaskOverdue(e) => e.occurred_at,
            AlertEvent::OrderShort(e) => e.occurred_at,
        }
    }
}
