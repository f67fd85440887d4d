//! The inventory ledger: append-only movements, derived balances, per-triple
//! serialization.
//!
//! Validation happens at the same serialization point as the mutation: a
//! movement's triple locks are taken (in key order, bounded wait), invariants
//! are checked against the balances those locks guard, and only then is the
//! movement appended and the projection updated. On any failure nothing is
//! written. Operations on disjoint triples proceed fully in parallel; there
//! is no global warehouse lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use depot_core::{
    DomainError, DomainResult, LocationId, LotId, MovementId, OutboundOrderId, ProductId, ZoneId,
};
use depot_registry::{LocationRegistry, OccupancyView};

use crate::lot::LotDetails;
use crate::movement::{Movement, MovementDraft, MovementKind, StockRef, TripleKey};

/// Candidate stock for the pick planner: one (location, lot) holding of a
/// product, with its lot expiry when tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockCandidate {
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub available: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Filter for ledger history reads.
///
/// `after_sequence` is the restart cursor: pass the `next_after_sequence`
/// from the previous page to continue where it left off.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub location: Option<LocationId>,
    pub product: Option<ProductId>,
    pub since: Option<DateTime<Utc>>,
    pub after_sequence: Option<u64>,
    pub limit: Option<usize>,
}

const DEFAULT_HISTORY_PAGE: usize = 100;

/// One page of a restartable history read.
#[derive(Debug, Clone)]
pub struct MovementPage {
    pub movements: Vec<Movement>,
    /// Cursor for the next page; `None` when the sequence is exhausted.
    pub next_after_sequence: Option<u64>,
}

#[derive(Debug, Default)]
struct LedgerState {
    movements: Vec<Movement>,
    by_id: HashMap<MovementId, usize>,
    balances: HashMap<TripleKey, i64>,
    location_totals: HashMap<LocationId, i64>,
    zone_totals: HashMap<ZoneId, i64>,
    idempotency: HashMap<Uuid, MovementId>,
    lots: HashMap<LotId, LotDetails>,
    next_sequence: u64,
}

/// Append-only record of stock movements plus the derived balance projection.
#[derive(Debug)]
pub struct InventoryLedger {
    registry: Arc<LocationRegistry>,
    state: RwLock<LedgerState>,
    locks: Mutex<HashMap<TripleKey, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
}

impl InventoryLedger {
    pub fn new(registry: Arc<LocationRegistry>) -> Self {
        Self {
            registry,
            state: RwLock::new(LedgerState::default()),
            locks: Mutex::new(HashMap::new()),
            lock_timeout: Duration::from_millis(250),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Record a movement: the only mutation path for stock quantities.
    ///
    /// Validates the draft shape before taking any lock, acquires the
    /// affected triple locks with a bounded wait, re-checks idempotency and
    /// invariants at the serialization point, then appends and updates the
    /// balance projection atomically.
    pub fn record(&self, draft: MovementDraft) -> DomainResult<MovementId> {
        draft.validate()?;

        // Fast path for retried calls: no locks needed for a pure replay.
        if let Some(id) = self.check_idempotent(&draft)? {
            return Ok(id);
        }

        let keys = draft.touched_triples();
        let handles = self.lock_handles(&keys)?;
        let deadline = Instant::now() + self.lock_timeout;
        let mut guards: Vec<MutexGuard<'_, ()>> = Vec::with_capacity(handles.len());
        for (handle, key) in handles.iter().zip(&keys) {
            guards.push(try_lock_until(handle, deadline, key)?);
        }

        let mut state = self.state_mut()?;

        // The key may have landed between the fast path and lock acquisition.
        if let Some(existing) = state.idempotency.get(&draft.idempotency_key) {
            return replay_result(&state, *existing, &draft);
        }

        self.check_source_balance(&state, &draft)?;
        self.check_destination_capacity(&state, &draft)?;

        let movement = Movement {
            id: MovementId::new(),
            sequence: state.next_sequence + 1,
            kind: draft.kind,
            source: draft.source.clone(),
            destination: draft.destination.clone(),
            product_id: draft.product_id,
            lot_id: draft.lot_id.clone(),
            quantity: draft.quantity,
            occurred_at: draft.occurred_at,
            recorded_at: Utc::now(),
            actor: draft.actor.clone(),
            reason: draft.reason.clone(),
            idempotency_key: draft.idempotency_key,
        };

        self.apply_balances(&mut state, &movement)?;

        state.next_sequence = movement.sequence;
        state.idempotency.insert(movement.idempotency_key, movement.id);
        let index = state.movements.len();
        state.by_id.insert(movement.id, index);
        tracing::debug!(
            movement = %movement.id,
            kind = ?movement.kind,
            product = %movement.product_id,
            lot = %movement.lot_id,
            quantity = movement.quantity,
            "movement recorded"
        );
        let id = movement.id;
        state.movements.push(movement);
        Ok(id)
    }

    /// Current balance of one (place, product, lot) triple.
    pub fn balance_of(&self, place: &StockRef, product_id: &ProductId, lot_id: &LotId) -> i64 {
        let key = TripleKey::new(place.clone(), *product_id, lot_id.clone());
        self.state
            .read()
            .ok()
            .and_then(|s| s.balances.get(&key).copied())
            .unwrap_or(0)
    }

    /// Convenience wrapper for real locations.
    pub fn balance_at(&self, location: &LocationId, product_id: &ProductId, lot_id: &LotId) -> i64 {
        self.balance_of(&StockRef::Location(location.clone()), product_id, lot_id)
    }

    /// All (product, lot, quantity) holdings at one real location.
    pub fn stock_at(&self, location: &LocationId) -> Vec<(ProductId, LotId, i64)> {
        self.holdings_of(&StockRef::Location(location.clone()))
    }

    /// Holdings in an outbound order's staging pseudo-location.
    pub fn staging_stock(&self, order_id: &OutboundOrderId) -> Vec<(ProductId, LotId, i64)> {
        self.holdings_of(&StockRef::Staging(*order_id))
    }

    /// Total on-hand units of a product across real locations (staging
    /// excluded: picked goods are already committed to an order).
    pub fn product_total(&self, product_id: &ProductId) -> i64 {
        let Ok(state) = self.state.read() else {
            return 0;
        };
        state
            .balances
            .iter()
            .filter(|(key, _)| {
                key.product_id == *product_id && key.place.as_location().is_some()
            })
            .map(|(_, qty)| *qty)
            .sum()
    }

    /// Candidate (location, lot) holdings of a product for the pick planner,
    /// sorted by (location, lot) for determinism.
    pub fn candidate_stock(&self, product_id: &ProductId) -> Vec<StockCandidate> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut out: Vec<StockCandidate> = state
            .balances
            .iter()
            .filter(|(key, qty)| key.product_id == *product_id && **qty > 0)
            .filter_map(|(key, qty)| {
                key.place.as_location().map(|loc| StockCandidate {
                    location_id: loc.clone(),
                    lot_id: key.lot_id.clone(),
                    available: *qty,
                    expires_at: state.lots.get(&key.lot_id).and_then(|l| l.expires_at),
                })
            })
            .collect();
        out.sort_by(|a, b| {
            (&a.location_id, &a.lot_id).cmp(&(&b.location_id, &b.lot_id))
        });
        out
    }

    /// Restartable history read, paginated on the monotone sequence.
    ///
    /// Finite and lock-free beyond a read guard; never exposes lock state.
    pub fn history(&self, query: &HistoryQuery) -> DomainResult<MovementPage> {
        let state = self.state_ref()?;
        let limit = query.limit.unwrap_or(DEFAULT_HISTORY_PAGE).max(1);
        let after = query.after_sequence.unwrap_or(0);

        let mut movements = Vec::new();
        let mut exhausted = true;
        for movement in state.movements.iter().filter(|m| m.sequence > after) {
            if !history_matches(movement, query) {
                continue;
            }
            if movements.len() == limit {
                exhausted = false;
                break;
            }
            movements.push(movement.clone());
        }

        let next_after_sequence = if exhausted {
            None
        } else {
            movements.last().map(|m| m.sequence)
        };
        Ok(MovementPage {
            movements,
            next_after_sequence,
        })
    }

    /// Pick movements recorded for one outbound order (for reversal audits).
    pub fn picks_for_order(&self, order_id: &OutboundOrderId) -> DomainResult<Vec<Movement>> {
        let state = self.state_ref()?;
        Ok(state
            .movements
            .iter()
            .filter(|m| {
                m.kind == MovementKind::Pick
                    && m.destination == Some(StockRef::Staging(*order_id))
            })
            .cloned()
            .collect())
    }

    pub fn movement(&self, id: &MovementId) -> Option<Movement> {
        let state = self.state.read().ok()?;
        let idx = *state.by_id.get(id)?;
        state.movements.get(idx).cloned()
    }

    /// Upsert lot master data (fed by inbound receipts).
    pub fn register_lot(&self, details: LotDetails) -> DomainResult<()> {
        let mut state = self.state_mut()?;
        if let Some(existing) = state.lots.get(&details.lot_id) {
            if existing.product_id != details.product_id {
                return Err(DomainError::conflict(format!(
                    "lot {} already registered for a different product",
                    details.lot_id
                )));
            }
        }
        state.lots.insert(details.lot_id.clone(), details);
        Ok(())
    }

    pub fn lot_expiry(&self, lot_id: &LotId) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.lots.get(lot_id).and_then(|l| l.expires_at))
    }

    fn holdings_of(&self, place: &StockRef) -> Vec<(ProductId, LotId, i64)> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut out: Vec<(ProductId, LotId, i64)> = state
            .balances
            .iter()
            .filter(|(key, qty)| &key.place == place && **qty > 0)
            .map(|(key, qty)| (key.product_id, key.lot_id.clone(), *qty))
            .collect();
        out.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        out
    }

    fn check_idempotent(&self, draft: &MovementDraft) -> DomainResult<Option<MovementId>> {
        let state = self.state_ref()?;
        match state.idempotency.get(&draft.idempotency_key) {
            Some(existing) => replay_result(&state, *existing, draft).map(Some),
            None => Ok(None),
        }
    }

    /// Withdrawals must not drive a balance negative: the principal error
    /// this engine exists to prevent.
    fn check_source_balance(&self, state: &LedgerState, draft: &MovementDraft) -> DomainResult<()> {
        if let Some(source) = &draft.source {
            let key = TripleKey::new(source.clone(), draft.product_id, draft.lot_id.clone());
            let available = state.balances.get(&key).copied().unwrap_or(0);
            if available < draft.quantity {
                return Err(DomainError::InsufficientStock {
                    location: source.to_string(),
                    product: draft.product_id.to_string(),
                    available,
                    requested: draft.quantity,
                });
            }
        }
        if draft.kind == MovementKind::Adjustment && draft.quantity < 0 {
            let dest = draft.destination.as_ref().ok_or_else(|| {
                DomainError::validation("adjustment requires a destination")
            })?;
            let key = TripleKey::new(dest.clone(), draft.product_id, draft.lot_id.clone());
            let available = state.balances.get(&key).copied().unwrap_or(0);
            if available + draft.quantity < 0 {
                return Err(DomainError::InsufficientStock {
                    location: dest.to_string(),
                    product: draft.product_id.to_string(),
                    available,
                    requested: -draft.quantity,
                });
            }
        }
        Ok(())
    }

    /// Inflow into a real location must fit both the location and its zone.
    /// Staging pseudo-locations are capacity-exempt.
    fn check_destination_capacity(
        &self,
        state: &LedgerState,
        draft: &MovementDraft,
    ) -> DomainResult<()> {
        let inflow = draft.quantity;
        if inflow <= 0 {
            return Ok(());
        }
        let Some(location) = draft.destination.as_ref().and_then(StockRef::as_location) else {
            return Ok(());
        };

        let slot = self.registry.location(location).map_err(|_| {
            DomainError::unknown_reference("location", location.to_string())
        })?;
        let occupied = state.location_totals.get(location).copied().unwrap_or(0);
        if occupied + inflow > slot.capacity {
            return Err(DomainError::CapacityExceeded {
                location: location.to_string(),
                capacity: slot.capacity,
                occupied,
                incoming: inflow,
            });
        }

        let zone = self.registry.zone(&slot.zone_id)?;
        let zone_occupied = state.zone_totals.get(&slot.zone_id).copied().unwrap_or(0);
        // A transfer whose source sits in the same zone leaves zone usage
        // unchanged, so its outflow nets against the inflow.
        let zone_outflow = draft
            .source
            .as_ref()
            .and_then(StockRef::as_location)
            .and_then(|src| self.registry.location(src).ok())
            .filter(|src| src.zone_id == slot.zone_id)
            .map_or(0, |_| inflow);
        if zone_occupied + inflow - zone_outflow > zone.capacity {
            return Err(DomainError::CapacityExceeded {
                location: format!("zone {}", slot.zone_id),
                capacity: zone.capacity,
                occupied: zone_occupied,
                incoming: inflow,
            });
        }
        Ok(())
    }

    fn apply_balances(&self, state: &mut LedgerState, movement: &Movement) -> DomainResult<()> {
        if let Some(source) = &movement.source {
            self.shift(state, source, movement, -movement.quantity)?;
        }
        if let Some(dest) = &movement.destination {
            self.shift(state, dest, movement, movement.quantity)?;
        }
        Ok(())
    }

    fn shift(
        &self,
        state: &mut LedgerState,
        place: &StockRef,
        movement: &Movement,
        delta: i64,
    ) -> DomainResult<()> {
        let key = TripleKey::new(place.clone(), movement.product_id, movement.lot_id.clone());
        let balance = state.balances.entry(key.clone()).or_insert(0);
        *balance += delta;
        // Logical deletion: zeroed records disappear from the projection,
        // the movement history persists.
        if *balance == 0 {
            state.balances.remove(&key);
        }

        if let Some(location) = place.as_location() {
            *state.location_totals.entry(location.clone()).or_insert(0) += delta;
            let zone_id = self.registry.zone_of(location)?;
            *state.zone_totals.entry(zone_id).or_insert(0) += delta;
        }
        Ok(())
    }

    fn lock_handles(&self, keys: &[TripleKey]) -> DomainResult<Vec<Arc<Mutex<()>>>> {
        let mut table = self
            .locks
            .lock()
            .map_err(|_| DomainError::conflict("ledger lock table poisoned"))?;
        Ok(keys
            .iter()
            .map(|key| Arc::clone(table.entry(key.clone()).or_default()))
            .collect())
    }

    fn state_ref(&self) -> DomainResult<std::sync::RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| DomainError::conflict("ledger state poisoned"))
    }

    fn state_mut(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| DomainError::conflict("ledger state poisoned"))
    }
}

impl OccupancyView for InventoryLedger {
    fn occupied_at(&self, location: &LocationId) -> i64 {
        self.state
            .read()
            .ok()
            .and_then(|s| s.location_totals.get(location).copied())
            .unwrap_or(0)
    }
}

fn replay_result(
    state: &LedgerState,
    existing: MovementId,
    draft: &MovementDraft,
) -> DomainResult<MovementId> {
    let matches = state
        .by_id
        .get(&existing)
        .and_then(|idx| state.movements.get(*idx))
        .is_some_and(|m| m.matches_draft(draft));
    if matches {
        Ok(existing)
    } else {
        Err(DomainError::conflict(format!(
            "idempotency key {} reused with a different payload",
            draft.idempotency_key
        )))
    }
}

fn history_matches(movement: &Movement, query: &HistoryQuery) -> bool {
    if let Some(product) = &query.product {
        if movement.product_id != *product {
            return false;
        }
    }
    if let Some(location) = &query.location {
        let hit = movement
            .source
            .as_ref()
            .and_then(StockRef::as_location)
            .is_some_and(|l| l == location)
            || movement
                .destination
                .as_ref()
                .and_then(StockRef::as_location)
                .is_some_and(|l| l == location);
        if !hit {
            return false;
        }
    }
    if let Some(since) = &query.since {
        if movement.recorded_at < *since {
            return false;
        }
    }
    true
}

fn try_lock_until<'a>(
    handle: &'a Mutex<()>,
    deadline: Instant,
    key: &TripleKey,
) -> DomainResult<MutexGuard<'a, ()>> {
    loop {
        match handle.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(std::sync::TryLockError::Poisoned(_)) => {
                return Err(DomainError::conflict("triple lock poisoned"));
            }
            Err(std::sync::TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(DomainError::lock_timeout(format!(
                        "triple ({}, {}, {}) still held at deadline",
                        key.place, key.product_id, key.lot_id
                    )));
                }
                std::thread::sleep(Duration::from_micros(500));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_registry::{Location, LocationType, StorageClass, TemperatureBand, Zone};
    use proptest::prelude::*;

    fn setup(capacity: i64, zone_capacity: i64) -> (Arc<LocationRegistry>, InventoryLedger, LocationId) {
        let registry = Arc::new(LocationRegistry::new());
        let zone_id = ZoneId::new("A").unwrap();
        registry
            .register_zone(
                Zone::new(
                    zone_id.clone(),
                    "Ambient A",
                    StorageClass::Dry,
                    TemperatureBand::new(10, 25).unwrap(),
                    zone_capacity,
                )
                .unwrap(),
            )
            .unwrap();
        let location = LocationId::new("A-01-01").unwrap();
        registry
            .register_location(
                Location::new(
                    location.clone(),
                    zone_id,
                    LocationType::Pallet,
                    capacity,
                    None,
                )
                .unwrap(),
            )
            .unwrap();
        let ledger = InventoryLedger::new(Arc::clone(&registry));
        (registry, ledger, location)
    }

    fn add_location(registry: &LocationRegistry, code: &str, capacity: i64) -> LocationId {
        let id = LocationId::new(code).unwrap();
        registry
            .register_location(
                Location::new(
                    id.clone(),
                    ZoneId::new("A").unwrap(),
                    LocationType::Shelf,
                    capacity,
                    None,
                )
                .unwrap(),
            )
            .unwrap();
        id
    }

    fn lot() -> LotId {
        LotId::new("L1").unwrap()
    }

    #[test]
    fn receipt_updates_balance_and_occupancy() {
        let (_registry, ledger, location) = setup(1000, 10_000);
        let product = ProductId::new();

        ledger
            .record(MovementDraft::receipt(
                Uuid::now_v7(),
                location.clone(),
                product,
                lot(),
                50,
                "w1",
            ))
            .unwrap();

        assert_eq!(ledger.balance_at(&location, &product, &lot()), 50);
        assert_eq!(ledger.occupied_at(&location), 50);
    }

    #[test]
    fn pick_beyond_balance_is_rejected_with_numbers() {
        let (_registry, ledger, location) = setup(1000, 10_000);
        let product = ProductId::new();
        let order = OutboundOrderId::new();

        ledger
            .record(MovementDraft::receipt(
                Uuid::now_v7(),
                location.clone(),
                product,
                lot(),
                4,
                "w1",
            ))
            .unwrap();

        let err = ledger
            .record(MovementDraft::pick(
                Uuid::now_v7(),
                location.clone(),
                order,
                product,
                lot(),
                5,
                "w1",
            ))
            .unwrap_err();
        match err {
            DomainError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 4);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        // No partial write survives the failure.
        assert_eq!(ledger.balance_at(&location, &product, &lot()), 4);
        assert_eq!(ledger.balance_of(&StockRef::Staging(order), &product, &lot()), 0);
    }

    #[test]
    fn location_capacity_is_enforced() {
        let (_registry, ledger, location) = setup(100, 10_000);
        let product = ProductId::new();

        ledger
            .record(MovementDraft::receipt(
                Uuid::now_v7(),
                location.clone(),
                product,
                lot(),
                80,
                "w1",
            ))
            .unwrap();

        let err = ledger
            .record(MovementDraft::receipt(
                Uuid::now_v7(),
                location.clone(),
                product,
                lot(),
                30,
                "w1",
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::CapacityExceeded { .. }));
        assert_eq!(ledger.balance_at(&location, &product, &lot()), 80);
    }

    #[test]
    fn zone_capacity_is_enforced_across_locations() {
        let (registry, ledger, a) = setup(1000, 150);
        let b = add_location(&registry, "A-02-01", 1000);
        let product = ProductId::new();

        ledger
            .record(MovementDraft::receipt(Uuid::now_v7(), a, product, lot(), 100, "w1"))
            .unwrap();
        let err = ledger
            .record(MovementDraft::receipt(Uuid::now_v7(), b, product, lot(), 60, "w1"))
            .unwrap_err();
        match err {
            DomainError::CapacityExceeded { location, .. } => {
                assert!(location.contains("zone"));
            }
            other => panic!("expected zone CapacityExceeded, got {other:?}"),
        }
    }

    #[test]
    fn transfer_within_a_full_zone_is_allowed() {
        let (registry, ledger, a) = setup(1000, 100);
        let b = add_location(&registry, "A-02-01", 1000);
        let product = ProductId::new();

        ledger
            .record(MovementDraft::receipt(Uuid::now_v7(), a.clone(), product, lot(), 100, "w1"))
            .unwrap();
        // Zone A is at capacity, but an intra-zone move keeps its usage flat.
        ledger
            .record(MovementDraft::transfer(
                Uuid::now_v7(),
                StockRef::Location(a.clone()),
                StockRef::Location(b.clone()),
                product,
                lot(),
                10,
                "w1",
            ))
            .unwrap();

        assert_eq!(ledger.balance_at(&a, &product, &lot()), 90);
        assert_eq!(ledger.balance_at(&b, &product, &lot()), 10);

        // Inflow from outside the zone still counts in full.
        let err = ledger
            .record(MovementDraft::receipt(Uuid::now_v7(), b, product, lot(), 1, "w1"))
            .unwrap_err();
        assert!(matches!(err, DomainError::CapacityExceeded { .. }));
    }

    #[test]
    fn held_triple_lock_times_out_with_lock_timeout() {
        let (_registry, ledger, location) = setup(1000, 10_000);
        let ledger = ledger.with_lock_timeout(Duration::from_millis(5));
        let product = ProductId::new();

        let key = TripleKey::new(StockRef::Location(location.clone()), product, lot());
        let handles = ledger.lock_handles(std::slice::from_ref(&key)).unwrap();
        let _held = handles[0].lock().unwrap();

        let err = ledger
            .record(MovementDraft::receipt(
                Uuid::now_v7(),
                location.clone(),
                product,
                lot(),
                10,
                "w1",
            ))
            .unwrap_err();
        assert!(err.is_retryable(), "expected LockTimeout, got {err:?}");

        drop(_held);
        ledger
            .record(MovementDraft::receipt(Uuid::now_v7(), location.clone(), product, lot(), 10, "w1"))
            .unwrap();
        assert_eq!(ledger.balance_at(&location, &product, &lot()), 10);
    }

    #[test]
    fn idempotent_replay_returns_original_movement_id() {
        let (_registry, ledger, location) = setup(1000, 10_000);
        let product = ProductId::new();
        let key = Uuid::now_v7();

        let draft = MovementDraft::receipt(key, location.clone(), product, lot(), 50, "w1");
        let first = ledger.record(draft.clone()).unwrap();
        let second = ledger.record(draft).unwrap();

        assert_eq!(first, second);
        // Applied exactly once.
        assert_eq!(ledger.balance_at(&location, &product, &lot()), 50);

        let page = ledger.history(&HistoryQuery::default()).unwrap();
        assert_eq!(page.movements.len(), 1);
    }

    #[test]
    fn idempotency_key_reuse_with_new_payload_is_a_conflict() {
        let (_registry, ledger, location) = setup(1000, 10_000);
        let product = ProductId::new();
        let key = Uuid::now_v7();

        ledger
            .record(MovementDraft::receipt(key, location.clone(), product, lot(), 50, "w1"))
            .unwrap();
        let err = ledger
            .record(MovementDraft::receipt(key, location, product, lot(), 60, "w1"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn transfer_moves_stock_between_triples() {
        let (registry, ledger, a) = setup(1000, 10_000);
        let b = add_location(&registry, "A-02-01", 1000);
        let product = ProductId::new();

        ledger
            .record(MovementDraft::receipt(Uuid::now_v7(), a.clone(), product, lot(), 40, "w1"))
            .unwrap();
        ledger
            .record(MovementDraft::transfer(
                Uuid::now_v7(),
                StockRef::Location(a.clone()),
                StockRef::Location(b.clone()),
                product,
                lot(),
                15,
                "w1",
            ))
            .unwrap();

        assert_eq!(ledger.balance_at(&a, &product, &lot()), 25);
        assert_eq!(ledger.balance_at(&b, &product, &lot()), 15);
        assert_eq!(ledger.occupied_at(&a), 25);
        assert_eq!(ledger.occupied_at(&b), 15);
    }

    #[test]
    fn negative_adjustment_cannot_underflow() {
        let (_registry, ledger, location) = setup(1000, 10_000);
        let product = ProductId::new();

        ledger
            .record(MovementDraft::receipt(Uuid::now_v7(), location.clone(), product, lot(), 10, "w1"))
            .unwrap();
        let err = ledger
            .record(MovementDraft::adjustment(
                Uuid::now_v7(),
                location.clone(),
                product,
                lot(),
                -12,
                "supervisor",
                "cycle count",
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        assert_eq!(ledger.balance_at(&location, &product, &lot()), 10);
    }

    #[test]
    fn history_pages_are_restartable() {
        let (_registry, ledger, location) = setup(100_000, 1_000_000);
        let product = ProductId::new();
        for _ in 0..7 {
            ledger
                .record(MovementDraft::receipt(
                    Uuid::now_v7(),
                    location.clone(),
                    product,
                    lot(),
                    1,
                    "w1",
                ))
                .unwrap();
        }

        let mut query = HistoryQuery {
            limit: Some(3),
            ..HistoryQuery::default()
        };
        let mut seen = Vec::new();
        loop {
            let page = ledger.history(&query).unwrap();
            seen.extend(page.movements.iter().map(|m| m.sequence));
            match page.next_after_sequence {
                Some(cursor) => query.after_sequence = Some(cursor),
                None => break,
            }
        }
        assert_eq!(seen, (1..=7).collect::<Vec<u64>>());
    }

    #[test]
    fn concurrent_picks_cannot_drive_a_balance_negative() {
        let (registry, _ledger, location) = setup(1000, 10_000);
        let ledger = Arc::new(InventoryLedger::new(registry).with_lock_timeout(Duration::from_secs(2)));
        let product = ProductId::new();
        let order = OutboundOrderId::new();

        ledger
            .record(MovementDraft::receipt(Uuid::now_v7(), location.clone(), product, lot(), 100, "w1"))
            .unwrap();

        let mut handles = Vec::new();
        for worker in 0..8 {
            let ledger = Arc::clone(&ledger);
            let location = location.clone();
            handles.push(std::thread::spawn(move || {
                let mut succeeded = 0i64;
                for _ in 0..10 {
                    let draft = MovementDraft::pick(
                        Uuid::now_v7(),
                        location.clone(),
                        order,
                        product,
                        LotId::new("L1").unwrap(),
                        5,
                        format!("w{worker}"),
                    );
                    match ledger.record(draft) {
                        Ok(_) => succeeded += 5,
                        Err(DomainError::InsufficientStock { .. }) => {}
                        Err(other) => panic!("unexpected error: {other:?}"),
                    }
                }
                succeeded
            }));
        }
        let picked: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(picked, 100);
        assert_eq!(ledger.balance_at(&location, &product, &lot()), 0);
        assert_eq!(
            ledger.balance_of(&StockRef::Staging(order), &product, &lot()),
            100
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: the cached balance of every triple equals the signed sum
        /// of all recorded movements for that triple, whatever interleaving of
        /// accepted and rejected operations got there.
        #[test]
        fn balances_equal_signed_movement_sums(
            ops in prop::collection::vec((0u8..4, 1i64..60), 1..40)
        ) {
            let (_registry, ledger, location) = setup(5_000, 50_000);
            let product = ProductId::new();
            let order = OutboundOrderId::new();
            let lot = LotId::new("L1").unwrap();

            for (kind, qty) in ops {
                let draft = match kind {
                    0 => MovementDraft::receipt(
                        Uuid::now_v7(), location.clone(), product, lot.clone(), qty, "w1",
                    ),
                    1 => MovementDraft::pick(
                        Uuid::now_v7(), location.clone(), order, product, lot.clone(), qty, "w1",
                    ),
                    2 => MovementDraft::adjustment(
                        Uuid::now_v7(), location.clone(), product, lot.clone(), qty, "sup", "count up",
                    ),
                    _ => MovementDraft::adjustment(
                        Uuid::now_v7(), location.clone(), product, lot.clone(), -qty, "sup", "count down",
                    ),
                };
                // Rejections are fine; they must simply leave no trace.
                let _ = ledger.record(draft);
            }

            let page = ledger.history(&HistoryQuery { limit: Some(10_000), ..HistoryQuery::default() }).unwrap();
            let mut expected_at_location = 0i64;
            let mut expected_in_staging = 0i64;
            for m in &page.movements {
                if m.source.as_ref().and_then(StockRef::as_location).is_some() {
                    expected_at_location -= m.quantity;
                }
                match &m.destination {
                    Some(StockRef::Location(_)) => expected_at_location += m.quantity,
                    Some(StockRef::Staging(_)) => expected_in_staging += m.quantity,
                    None => {}
                }
            }

            prop_assert_eq!(ledger.balance_at(&location, &product, &lot), expected_at_location);
            prop_assert_eq!(
                ledger.balance_of(&StockRef::Staging(order), &product, &lot),
                expected_in_staging
            );
            prop_assert!(expected_at_location >= 0);
        }
    }
}
