use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    ExpiredQuery, Metadata, NewReservation, Order, OrderId, OrderStatus, Reservation,
    ReservationId, ReservationStatus, Result, Stock, StockLevel, StoreError,
};

/// Result of [`ReservationStore::create_reservation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new reservation was written and its stock is now held.
    Created(Reservation),
    /// An earlier reservation with the same idempotency key and lines was
    /// found; nothing changed.
    Replayed(Reservation),
}

impl CreateOutcome {
    pub fn reservation(&self) -> &Reservation {
        match self {
            CreateOutcome::Created(r) | CreateOutcome::Replayed(r) => r,
        }
    }

    pub fn into_reservation(self) -> Reservation {
        match self {
            CreateOutcome::Created(r) | CreateOutcome::Replayed(r) => r,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, CreateOutcome::Replayed(_))
    }
}

/// A guarded reservation status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationTransition {
    pub id: ReservationId,
    /// The change only applies if the stored status still equals this.
    pub expected: ReservationStatus,
    pub target: ReservationStatus,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl ReservationTransition {
    /// A transition out of `Held`.
    pub fn from_held(id: ReservationId, target: ReservationStatus, at: DateTime<Utc>) -> Self {
        Self {
            id,
            expected: ReservationStatus::Held,
            target,
            actor_id: None,
            reason: None,
            at,
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Result of [`ReservationStore::transition_reservation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition happened; carries the updated record.
    Applied(Reservation),
    /// The stored status no longer matched `expected`; carries the record
    /// as currently stored. Stock was not touched.
    Unchanged(Reservation),
}

impl TransitionOutcome {
    pub fn reservation(&self) -> &Reservation {
        match self {
            TransitionOutcome::Applied(r) | TransitionOutcome::Unchanged(r) => r,
        }
    }

    pub fn into_reservation(self) -> Reservation {
        match self {
            TransitionOutcome::Applied(r) | TransitionOutcome::Unchanged(r) => r,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// A guarded order status change.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTransition {
    pub order_id: OrderId,
    /// When set, the change fails with `OrderStatusConflict` unless the
    /// stored status equals this.
    pub expected: Option<OrderStatus>,
    pub target: OrderStatus,
    pub metadata_patch: Metadata,
    pub at: DateTime<Utc>,
}

impl OrderTransition {
    pub fn new(order_id: OrderId, target: OrderStatus, at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            expected: None,
            target,
            metadata_patch: Metadata::new(),
            at,
        }
    }

    pub fn expecting(mut self, status: OrderStatus) -> Self {
        self.expected = Some(status);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<crate::MetadataValue>) -> Self {
        self.metadata_patch.insert(key.into(), value.into());
        self
    }
}

/// Persistence for reservations and the stock counters they hold.
///
/// Every method is atomic: reservation status and stock counters change
/// together or not at all. Implementations must be thread-safe.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Creates a held reservation and increments `reserved` for each sku.
    ///
    /// In one critical section, in this order:
    /// 1. an earlier reservation of the same order with the same
    ///    idempotency key and the same lines is returned as `Replayed`;
    /// 2. a held reservation of the same order whose expiry has passed is
    ///    expired and its stock returned;
    /// 3. any other held or committed reservation of the order fails with
    ///    `ActiveReservationExists`;
    /// 4. every sku must have enough available stock, otherwise
    ///    `InsufficientStock` and nothing changes.
    async fn create_reservation(&self, reservation: NewReservation) -> Result<CreateOutcome>;

    /// Fetches a reservation by ID.
    async fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>>;

    /// Moves a reservation out of `Held` and adjusts stock accordingly.
    ///
    /// Committed: `on_hand` and `reserved` both drop by the quantity.
    /// Released or expired: `reserved` drops by the quantity.
    ///
    /// Returns `Unchanged` without side effects if the stored status is not
    /// `transition.expected`, and `InvalidReservationTransition` if the edge
    /// is not part of the state machine.
    async fn transition_reservation(
        &self,
        transition: ReservationTransition,
    ) -> Result<TransitionOutcome>;

    /// Lists held reservations with `expires_at <= query.now`.
    async fn scan_expired(&self, query: ExpiredQuery) -> Result<Vec<Reservation>>;

    /// Fetches the stock counters for a sku.
    async fn get_stock(&self, sku: &str) -> Result<Option<Stock>>;

    /// Sets `on_hand` and `safety_stock` for a sku, creating it if needed.
    ///
    /// Fails with `StockInvariant` if `on_hand` would drop below what is
    /// currently reserved.
    async fn put_stock(&self, level: StockLevel) -> Result<Stock>;
}

/// Persistence for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fetches an order by ID.
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Inserts a new order. Fails with `DuplicateOrder` if the ID is taken.
    async fn insert_order(&self, order: Order) -> Result<Order>;

    /// Applies a guarded status change and merges the metadata patch.
    ///
    /// Sets `paid_at` when the target is `Paid`.
    async fn transition_status(&self, transition: OrderTransition) -> Result<Order>;
}

#[async_trait]
impl<T: ReservationStore + ?Sized> ReservationStore for Arc<T> {
    async fn create_reservation(&self, reservation: NewReservation) -> Result<CreateOutcome> {
        (**self).create_reservation(reservation).await
    }

    async fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        (**self).get_reservation(id).await
    }

    async fn transition_reservation(
        &self,
        transition: ReservationTransition,
    ) -> Result<TransitionOutcome> {
        (**self).transition_reservation(transition).await
    }

    async fn scan_expired(&self, query: ExpiredQuery) -> Result<Vec<Reservation>> {
        (**self).scan_expired(query).await
    }

    async fn get_stock(&self, sku: &str) -> Result<Option<Stock>> {
        (**self).get_stock(sku).await
    }

    async fn put_stock(&self, level: StockLevel) -> Result<Stock> {
        (**self).put_stock(level).await
    }
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        (**self).get_order(id).await
    }

    async fn insert_order(&self, order: Order) -> Result<Order> {
        (**self).insert_order(order).await
    }

    async fn transition_status(&self, transition: OrderTransition) -> Result<Order> {
        (**self).transition_status(transition).await
    }
}

/// Extension trait providing convenience methods for reservation stores.
#[async_trait]
pub trait ReservationStoreExt: ReservationStore {
    /// Fetches a reservation, turning absence into `ReservationNotFound`.
    async fn require_reservation(&self, id: &ReservationId) -> Result<Reservation> {
        self.get_reservation(id)
            .await?
            .ok_or_else(|| StoreError::ReservationNotFound(id.clone()))
    }

    /// Checks if a reservation exists.
    async fn reservation_exists(&self, id: &ReservationId) -> Result<bool> {
        Ok(self.get_reservation(id).await?.is_some())
    }
}

impl<T: ReservationStore + ?Sized> ReservationStoreExt for T {}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Fetches an order, turning absence into `OrderNotFound`.
    async fn require_order(&self, id: &OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or_else(|| StoreError::OrderNotFound(id.clone()))
    }
}

impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

/// Structural checks applied by every store before writing a reservation.
pub fn validate_new_reservation(reservation: &NewReservation) -> Result<()> {
    if reservation.id.is_blank() {
        return Err(StoreError::InvalidReservation(
            "reservation id is required".to_string(),
        ));
    }
    if reservation.order_ref.is_blank() {
        return Err(StoreError::InvalidReservation(
            "order reference is required".to_string(),
        ));
    }
    if reservation.lines.is_empty() {
        return Err(StoreError::InvalidReservation(
            "reservation must contain at least one line".to_string(),
        ));
    }
    if let Some(line) = reservation.lines.iter().find(|l| l.quantity == 0) {
        return Err(StoreError::InvalidReservation(format!(
            "quantity for sku {} must be positive",
            line.sku
        )));
    }
    if reservation.expires_at <= reservation.created_at {
        return Err(StoreError::InvalidReservation(
            "expiry must be after creation".to_string(),
        ));
    }
    Ok(())
}
