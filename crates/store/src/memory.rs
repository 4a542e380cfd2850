use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    ExpiredQuery, NewReservation, Order, OrderId, Reservation, ReservationId, ReservationStatus,
    Result, Stock, StockLevel, StoreError,
    store::{
        CreateOutcome, OrderStore, OrderTransition, ReservationStore, ReservationTransition,
        TransitionOutcome, validate_new_reservation,
    },
};

#[derive(Default)]
struct State {
    reservations: HashMap<ReservationId, Reservation>,
    /// Latest reservation created under each (order, idempotency key).
    idempotency: HashMap<(OrderId, String), ReservationId>,
    /// The held or committed reservation of each order.
    active: HashMap<OrderId, ReservationId>,
    stocks: HashMap<String, Stock>,
    orders: HashMap<OrderId, Order>,
}

impl State {
    /// Validates every stock change before applying any, so a failure
    /// leaves the counters untouched.
    fn settle(
        &mut self,
        reservation: &Reservation,
        target: ReservationStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut updates = Vec::new();
        for (sku, quantity) in reservation.quantities_by_sku() {
            let stock = self
                .stocks
                .get(&sku)
                .ok_or_else(|| StoreError::StockInvariant {
                    sku: sku.clone(),
                    on_hand: 0,
                    reserved: 0,
                })?;
            updates.push(stock.settle(target, quantity, at)?);
        }
        for stock in updates {
            self.stocks.insert(stock.sku.clone(), stock);
        }
        Ok(())
    }

    fn apply(
        &mut self,
        id: &ReservationId,
        target: ReservationStatus,
        actor_id: Option<&str>,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let current = self
            .reservations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ReservationNotFound(id.clone()))?;
        if !current.status.can_transition_to(target) {
            return Err(StoreError::InvalidReservationTransition {
                reservation_id: id.clone(),
                from: current.status,
                to: target,
            });
        }

        self.settle(&current, target, at)?;

        let mut updated = current;
        updated.apply_transition(target, actor_id, reason, at);
        if target.is_released() {
            self.active.remove(&updated.order_ref);
        }
        self.reservations.insert(id.clone(), updated.clone());
        Ok(updated)
    }
}

/// In-memory reservation and order store.
///
/// All state sits behind a single lock, so every operation is atomic with
/// respect to every other. Provides the same semantics as the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current counters for a sku.
    pub async fn stock(&self, sku: &str) -> Option<Stock> {
        self.state.read().await.stocks.get(sku).cloned()
    }

    /// Returns the total number of reservations stored.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    /// Clears all reservations, stock and orders.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn create_reservation(&self, reservation: NewReservation) -> Result<CreateOutcome> {
        validate_new_reservation(&reservation)?;

        let mut state = self.state.write().await;

        if let Some(key) = &reservation.idempotency_key {
            let replay = state
                .idempotency
                .get(&(reservation.order_ref.clone(), key.clone()))
                .and_then(|id| state.reservations.get(id))
                .filter(|existing| {
                    existing.line_signature()
                        == crate::reservation::line_signature(&reservation.lines)
                });
            if let Some(existing) = replay {
                return Ok(CreateOutcome::Replayed(existing.clone()));
            }
        }

        // Every counter change is staged first and written only after all
        // checks pass, so a failed create leaves the store untouched.
        let mut staged: HashMap<String, Stock> = HashMap::new();
        let mut superseded = None;

        if let Some(active_id) = state.active.get(&reservation.order_ref).cloned() {
            let stale = state
                .reservations
                .get(&active_id)
                .filter(|active| {
                    active.status == ReservationStatus::Held
                        && active.is_expired_at(reservation.created_at)
                })
                .cloned();
            let Some(mut stale) = stale else {
                return Err(StoreError::ActiveReservationExists {
                    order_id: reservation.order_ref.clone(),
                    reservation_id: active_id,
                });
            };
            for (sku, quantity) in stale.quantities_by_sku() {
                let stock = state.stocks.get(&sku).ok_or_else(|| StoreError::StockInvariant {
                    sku: sku.clone(),
                    on_hand: 0,
                    reserved: 0,
                })?;
                let settled =
                    stock.settle(ReservationStatus::Expired, quantity, reservation.created_at)?;
                staged.insert(sku, settled);
            }
            stale.apply_transition(
                ReservationStatus::Expired,
                None,
                Some("superseded"),
                reservation.created_at,
            );
            superseded = Some(stale);
        }

        for (sku, quantity) in crate::reservation::quantities_by_sku(&reservation.lines) {
            let stock = staged
                .get(&sku)
                .or_else(|| state.stocks.get(&sku))
                .ok_or_else(|| StoreError::InsufficientStock {
                    sku: sku.clone(),
                    requested: quantity,
                    available: 0,
                })?;
            let held = stock.hold(quantity, reservation.created_at)?;
            staged.insert(sku, held);
        }

        state.stocks.extend(staged);
        if let Some(stale) = superseded {
            tracing::debug!(
                reservation_id = %stale.id,
                order_id = %stale.order_ref,
                "expired stale reservation before re-reserve"
            );
            state.active.remove(&stale.order_ref);
            state.reservations.insert(stale.id.clone(), stale);
        }

        let created = reservation.into_reservation();
        if let Some(key) = &created.idempotency_key {
            state
                .idempotency
                .insert((created.order_ref.clone(), key.clone()), created.id.clone());
        }
        state
            .active
            .insert(created.order_ref.clone(), created.id.clone());
        state
            .reservations
            .insert(created.id.clone(), created.clone());

        Ok(CreateOutcome::Created(created))
    }

    async fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        Ok(self.state.read().await.reservations.get(id).cloned())
    }

    async fn transition_reservation(
        &self,
        transition: ReservationTransition,
    ) -> Result<TransitionOutcome> {
        let mut state = self.state.write().await;

        let current = state
            .reservations
            .get(&transition.id)
            .ok_or_else(|| StoreError::ReservationNotFound(transition.id.clone()))?;
        if current.status != transition.expected {
            return Ok(TransitionOutcome::Unchanged(current.clone()));
        }

        let updated = state.apply(
            &transition.id,
            transition.target,
            transition.actor_id.as_deref(),
            transition.reason.as_deref(),
            transition.at,
        )?;
        Ok(TransitionOutcome::Applied(updated))
    }

    async fn scan_expired(&self, query: ExpiredQuery) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut expired: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Held && r.is_expired_at(query.now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.id.cmp(&b.id)));
        expired.truncate(query.limit);
        Ok(expired)
    }

    async fn get_stock(&self, sku: &str) -> Result<Option<Stock>> {
        Ok(self.stock(sku).await)
    }

    async fn put_stock(&self, level: StockLevel) -> Result<Stock> {
        let mut state = self.state.write().await;
        let existing = state.stocks.get(&level.sku);
        let stock = Stock {
            sku: level.sku.clone(),
            product_ref: level
                .product_ref
                .or_else(|| existing.and_then(|s| s.product_ref.clone())),
            on_hand: level.on_hand,
            reserved: existing.map_or(0, |s| s.reserved),
            safety_stock: level.safety_stock,
            updated_at: level.at,
        };
        if !stock.satisfies_invariant() {
            return Err(StoreError::StockInvariant {
                sku: stock.sku,
                on_hand: stock.on_hand,
                reserved: stock.reserved,
            });
        }
        state.stocks.insert(level.sku, stock.clone());
        Ok(stock)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(id).cloned())
    }

    async fn insert_order(&self, order: Order) -> Result<Order> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn transition_status(&self, transition: OrderTransition) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&transition.order_id)
            .ok_or_else(|| StoreError::OrderNotFound(transition.order_id.clone()))?;

        if let Some(expected) = transition.expected
            && order.status != expected
        {
            return Err(StoreError::OrderStatusConflict {
                order_id: transition.order_id,
                expected,
                actual: order.status,
            });
        }
        if !order.status.can_transition_to(transition.target) {
            return Err(StoreError::InvalidOrderTransition {
                order_id: transition.order_id,
                from: order.status,
                to: transition.target,
            });
        }

        order.status = transition.target;
        order.merge_metadata(&transition.metadata_patch);
        if transition.target == crate::OrderStatus::Paid {
            order.paid_at = Some(transition.at);
        }
        order.updated_at = transition.at;
        Ok(order.clone())
    }
}
