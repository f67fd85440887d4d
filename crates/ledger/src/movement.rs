use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use depot_core::{DomainError, DomainResult, LocationId, LotId, MovementId, OutboundOrderId, ProductId};

/// Type of a ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Receipt,
    Pick,
    Transfer,
    Adjustment,
}

/// A place stock can sit: a real storage location, or the staging
/// pseudo-location holding goods picked for an outbound order but not yet
/// shipped.
///
/// `Ord` matters: per-triple locks are always acquired in key order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockRef {
    Location(LocationId),
    Staging(OutboundOrderId),
}

impl StockRef {
    pub fn as_location(&self) -> Option<&LocationId> {
        match self {
            StockRef::Location(id) => Some(id),
            StockRef::Staging(_) => None,
        }
    }
}

impl core::fmt::Display for StockRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StockRef::Location(id) => write!(f, "{id}"),
            StockRef::Staging(order) => write!(f, "staging:{order}"),
        }
    }
}

/// The serialization unit: one (place, product, lot) stock balance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TripleKey {
    pub place: StockRef,
    pub product_id: ProductId,
    pub lot_id: LotId,
}

impl TripleKey {
    pub fn new(place: StockRef, product_id: ProductId, lot_id: LotId) -> Self {
        Self {
            place,
            product_id,
            lot_id,
        }
    }
}

/// A movement as submitted by a caller (not yet assigned id or sequence).
///
/// `idempotency_key` is caller-generated; replaying the same key with an
/// identical payload returns the original movement id without double-applying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDraft {
    pub idempotency_key: Uuid,
    pub kind: MovementKind,
    pub source: Option<StockRef>,
    pub destination: Option<StockRef>,
    pub product_id: ProductId,
    pub lot_id: LotId,
    /// Units moved. Positive for receipt/pick/transfer; signed for adjustment.
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub actor: String,
    pub reason: Option<String>,
}

impl MovementDraft {
    pub fn receipt(
        idempotency_key: Uuid,
        destination: LocationId,
        product_id: ProductId,
        lot_id: LotId,
        quantity: i64,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key,
            kind: MovementKind::Receipt,
            source: None,
            destination: Some(StockRef::Location(destination)),
            product_id,
            lot_id,
            quantity,
            occurred_at: Utc::now(),
            actor: actor.into(),
            reason: None,
        }
    }

    pub fn pick(
        idempotency_key: Uuid,
        source: LocationId,
        order_id: OutboundOrderId,
        product_id: ProductId,
        lot_id: LotId,
        quantity: i64,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key,
            kind: MovementKind::Pick,
            source: Some(StockRef::Location(source)),
            destination: Some(StockRef::Staging(order_id)),
            product_id,
            lot_id,
            quantity,
            occurred_at: Utc::now(),
            actor: actor.into(),
            reason: None,
        }
    }

    pub fn transfer(
        idempotency_key: Uuid,
        source: StockRef,
        destination: StockRef,
        product_id: ProductId,
        lot_id: LotId,
        quantity: i64,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key,
            kind: MovementKind::Transfer,
            source: Some(source),
            destination: Some(destination),
            product_id,
            lot_id,
            quantity,
            occurred_at: Utc::now(),
            actor: actor.into(),
            reason: None,
        }
    }

    /// Signed correction against a single location.
    pub fn adjustment(
        idempotency_key: Uuid,
        location: LocationId,
        product_id: ProductId,
        lot_id: LotId,
        delta: i64,
        actor: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key,
            kind: MovementKind::Adjustment,
            source: None,
            destination: Some(StockRef::Location(location)),
            product_id,
            lot_id,
            quantity: delta,
            occurred_at: Utc::now(),
            actor: actor.into(),
            reason: Some(reason.into()),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Shape validation: rejected before any lock is taken.
    pub fn validate(&self) -> DomainResult<()> {
        if self.actor.trim().is_empty() {
            return Err(DomainError::validation("movement actor cannot be empty"));
        }
        match self.kind {
            MovementKind::Receipt => {
                if self.source.is_some() {
                    return Err(DomainError::validation("receipt must not have a source"));
                }
                let Some(dest) = &self.destination else {
                    return Err(DomainError::validation("receipt requires a destination"));
                };
                if dest.as_location().is_none() {
                    return Err(DomainError::validation(
                        "receipt destination must be a real location",
                    ));
                }
                self.require_positive_quantity()
            }
            MovementKind::Pick => {
                let Some(source) = &self.source else {
                    return Err(DomainError::validation("pick requires a source"));
                };
                if source.as_location().is_none() {
                    return Err(DomainError::validation(
                        "pick source must be a real location",
                    ));
                }
                match &self.destination {
                    Some(StockRef::Staging(_)) | None => {}
                    Some(StockRef::Location(_)) => {
                        return Err(DomainError::validation(
                            "pick destination must be a staging pseudo-location",
                        ));
                    }
                }
                self.require_positive_quantity()
            }
            MovementKind::Transfer => {
                let (Some(source), Some(dest)) = (&self.source, &self.destination) else {
                    return Err(DomainError::validation(
                        "transfer requires both source and destination",
                    ));
                };
                if source == dest {
                    return Err(DomainError::validation(
                        "transfer source and destination must differ",
                    ));
                }
                self.require_positive_quantity()
            }
            MovementKind::Adjustment => {
                if self.source.is_some() {
                    return Err(DomainError::validation(
                        "adjustment targets its destination only",
                    ));
                }
                if self.destination.is_none() {
                    return Err(DomainError::validation("adjustment requires a destination"));
                }
                if self.quantity == 0 {
                    return Err(DomainError::validation("adjustment delta cannot be zero"));
                }
                if self.reason.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(DomainError::validation("adjustment requires a reason"));
                }
                Ok(())
            }
        }
    }

    /// Triple keys whose balances this movement touches, in lock order.
    pub fn touched_triples(&self) -> Vec<TripleKey> {
        let mut keys: Vec<TripleKey> = self
            .source
            .iter()
            .chain(self.destination.iter())
            .map(|place| TripleKey::new(place.clone(), self.product_id, self.lot_id.clone()))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    fn require_positive_quantity(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        Ok(())
    }
}

/// A recorded movement: an atomic, signed change to stock, permanently kept.
///
/// Append-only: never mutated or deleted. `sequence` is assigned at append
/// time and is strictly monotone across the whole ledger, which makes history
/// reads restartable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub sequence: u64,
    pub kind: MovementKind,
    pub source: Option<StockRef>,
    pub destination: Option<StockRef>,
    pub product_id: ProductId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub actor: String,
    pub reason: Option<String>,
    pub idempotency_key: Uuid,
}

impl Movement {
    /// True when a draft is a byte-for-byte replay of this movement.
    pub fn matches_draft(&self, draft: &MovementDraft) -> bool {
        self.kind == draft.kind
            && self.source == draft.source
            && self.destination == draft.destination
            && self.product_id == draft.product_id
            && self.lot_id == draft.lot_id
            && self.quantity == draft.quantity
            && self.actor == draft.actor
            && self.reason == draft.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (LocationId, ProductId, LotId) {
        (
            LocationId::new("A-01-01").unwrap(),
            ProductId::new(),
            LotId::new("L1").unwrap(),
        )
    }

    #[test]
    fn receipt_shape_is_enforced() {
        let (loc, product, lot) = ids();
        let ok = MovementDraft::receipt(Uuid::now_v7(), loc.clone(), product, lot.clone(), 10, "w1");
        ok.validate().unwrap();

        let mut bad = ok.clone();
        bad.source = Some(StockRef::Location(loc));
        assert!(matches!(bad.validate(), Err(DomainError::Validation(_))));

        let mut zero = ok;
        zero.quantity = 0;
        assert!(matches!(zero.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn pick_destination_must_be_staging() {
        let (loc, product, lot) = ids();
        let mut draft = MovementDraft::pick(
            Uuid::now_v7(),
            loc.clone(),
            OutboundOrderId::new(),
            product,
            lot,
            5,
            "w1",
        );
        draft.validate().unwrap();

        draft.destination = Some(StockRef::Location(loc));
        assert!(matches!(draft.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn transfer_endpoints_must_differ() {
        let (loc, product, lot) = ids();
        let place = StockRef::Location(loc);
        let draft = MovementDraft::transfer(
            Uuid::now_v7(),
            place.clone(),
            place,
            product,
            lot,
            5,
            "w1",
        );
        assert!(matches!(draft.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn adjustment_requires_reason_and_nonzero_delta() {
        let (loc, product, lot) = ids();
        let ok = MovementDraft::adjustment(
            Uuid::now_v7(),
            loc.clone(),
            product,
            lot.clone(),
            -3,
            "supervisor",
            "cycle count",
        );
        ok.validate().unwrap();

        let mut zero = ok.clone();
        zero.quantity = 0;
        assert!(matches!(zero.validate(), Err(DomainError::Validation(_))));

        let mut unreasoned = ok;
        unreasoned.reason = None;
        assert!(matches!(
            unreasoned.validate(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn transfer_touches_both_triples_in_lock_order() {
        let (loc, product, lot) = ids();
        let other = LocationId::new("B-01-01").unwrap();
        let draft = MovementDraft::transfer(
            Uuid::now_v7(),
            StockRef::Location(other),
            StockRef::Location(loc),
            product,
            lot,
            5,
            "w1",
        );
        let keys = draft.touched_triples();
        assert_eq!(keys.len(), 2);
        assert!(keys[0] < keys[1]);
    }
}
