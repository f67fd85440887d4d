use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{DomainError, DomainResult, InboundOrderId, ProductId, SupplierId};

/// Inbound order status lifecycle.
///
/// Derived from the lines, never stored: `Pending` while nothing has been
/// received, `InProgress` once some lines have, `Completed` when every line
/// has received at least its expected quantity. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundStatus {
    Pending,
    InProgress,
    Completed,
}

/// One expected delivery line on an inbound order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub expected_qty: i64,
    pub received_qty: i64,
    /// Physical deliveries can exceed paperwork; flagged rather than rejected.
    pub over_received: bool,
}

/// An inbound (receiving) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundOrder {
    id: InboundOrderId,
    supplier_id: SupplierId,
    expected_date: DateTime<Utc>,
    lines: Vec<InboundLine>,
}

impl InboundOrder {
    pub fn new(
        id: InboundOrderId,
        supplier_id: SupplierId,
        expected_date: DateTime<Utc>,
        lines: Vec<(ProductId, i64)>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("inbound order requires lines"));
        }
        let lines = lines
            .into_iter()
            .enumerate()
            .map(|(idx, (product_id, expected_qty))| {
                if expected_qty <= 0 {
                    return Err(DomainError::validation(format!(
                        "expected quantity must be positive on line {}, got {expected_qty}",
                        idx + 1
                    )));
                }
                Ok(InboundLine {
                    line_no: (idx + 1) as u32,
                    product_id,
                    expected_qty,
                    received_qty: 0,
                    over_received: false,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self {
            id,
            supplier_id,
            expected_date,
            lines,
        })
    }

    pub fn id(&self) -> InboundOrderId {
        self.id
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn expected_date(&self) -> DateTime<Utc> {
        self.expected_date
    }

    pub fn lines(&self) -> &[InboundLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&InboundLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    /// Status recomputed from the lines after every line event.
    pub fn status(&self) -> InboundStatus {
        if self.lines.iter().all(|l| l.received_qty == 0) {
            InboundStatus::Pending
        } else if self.lines.iter().all(|l| l.received_qty >= l.expected_qty) {
            InboundStatus::Completed
        } else {
            InboundStatus::InProgress
        }
    }

    /// Check that another receipt against a line is acceptable and return the
    /// line's product.
    ///
    /// `Completed` is terminal: no further receipts.
    pub fn check_receivable(&self, line_no: u32) -> DomainResult<ProductId> {
        if self.status() == InboundStatus::Completed {
            return Err(DomainError::order_closed(format!(
                "inbound order {} is completed",
                self.id
            )));
        }
        let line = self
            .line(line_no)
            .ok_or_else(|| DomainError::validation(format!("no line {line_no} on order {}", self.id)))?;
        Ok(line.product_id)
    }

    /// Apply a quantity that the ledger has accepted onto a line.
    pub(crate) fn apply_receipt(&mut self, line_no: u32, quantity: i64) -> DomainResult<()> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.line_no == line_no)
            .ok_or_else(|| DomainError::validation(format!("no line {line_no}")))?;
        line.received_qty += quantity;
        if line.received_qty > line.expected_qty {
            line.over_received = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(lines: Vec<(ProductId, i64)>) -> InboundOrder {
        InboundOrder::new(InboundOrderId::new(), SupplierId::new(), Utc::now(), lines).unwrap()
    }

    #[test]
    fn status_derivation_tracks_received_lines() {
        let p1 = ProductId::new();
        let p2 = ProductId::new();
        let mut o = order(vec![(p1, 10), (p2, 5)]);
        assert_eq!(o.status(), InboundStatus::Pending);

        o.apply_receipt(1, 10).unwrap();
        assert_eq!(o.status(), InboundStatus::InProgress);

        o.apply_receipt(2, 5).unwrap();
        assert_eq!(o.status(), InboundStatus::Completed);
    }

    #[test]
    fn completed_order_accepts_no_further_receipts() {
        let p1 = ProductId::new();
        let mut o = order(vec![(p1, 10)]);
        o.apply_receipt(1, 10).unwrap();

        let err = o.check_receivable(1).unwrap_err();
        assert!(matches!(err, DomainError::OrderClosed(_)));
    }

    #[test]
    fn over_receipt_is_flagged_not_rejected() {
        let p1 = ProductId::new();
        let mut o = order(vec![(p1, 10)]);
        assert_eq!(o.check_receivable(1).unwrap(), p1);
        o.apply_receipt(1, 12).unwrap();

        let line = o.line(1).unwrap();
        assert_eq!(line.received_qty, 12);
        assert!(line.over_received);
        assert_eq!(o.status(), InboundStatus::Completed);
    }

    #[test]
    fn empty_or_nonpositive_lines_are_rejected() {
        assert!(InboundOrder::new(
            InboundOrderId::new(),
            SupplierId::new(),
            Utc::now(),
            vec![]
        )
        .is_err());
        assert!(InboundOrder::new(
            InboundOrderId::new(),
            SupplierId::new(),
            Utc::now(),
            vec![(ProductId::new(), 0)]
        )
        .is_err());
    }
}
