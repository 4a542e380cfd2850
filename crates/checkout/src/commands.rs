use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId};
use store::{OrderStatus, Reservation, ReservationStatus};

/// Marks an order paid once its stock reservation is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCheckout {
    pub order_ref: OrderId,
    /// Falls back to the order's linked reservation when absent.
    pub reservation_id: Option<ReservationId>,
    pub actor_id: Option<String>,
    pub payment_intent_id: Option<String>,
}

impl CommitCheckout {
    pub fn new(order_ref: impl Into<OrderId>) -> Self {
        Self {
            order_ref: order_ref.into(),
            reservation_id: None,
            actor_id: None,
            payment_intent_id: None,
        }
    }

    pub fn reservation(mut self, reservation_id: impl Into<ReservationId>) -> Self {
        let id = reservation_id.into();
        self.reservation_id = (!id.is_blank()).then_some(id);
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = non_blank(actor_id.into());
        self
    }

    pub fn payment_intent(mut self, payment_intent_id: impl Into<String>) -> Self {
        self.payment_intent_id = non_blank(payment_intent_id.into());
        self
    }
}

/// Result of a checkout commit, including idempotent replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    pub order_ref: OrderId,
    pub order_status: OrderStatus,
    pub reservation_id: Option<ReservationId>,
    pub reservation_status: Option<ReservationStatus>,
    pub paid_at: Option<DateTime<Utc>>,
    pub promotion_code: Option<String>,
    /// Set when nothing changed because the order was already paid.
    pub message: Option<String>,
}

impl CommitResponse {
    pub fn is_replay(&self) -> bool {
        self.message.is_some()
    }
}

/// Releases the stock held for a checkout that will not be paid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseCheckout {
    pub reservation_id: Option<ReservationId>,
    pub order_ref: Option<OrderId>,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
}

impl ReleaseCheckout {
    pub fn for_reservation(reservation_id: impl Into<ReservationId>) -> Self {
        let id = reservation_id.into();
        Self {
            reservation_id: (!id.is_blank()).then_some(id),
            ..Self::default()
        }
    }

    pub fn for_order(order_ref: impl Into<OrderId>) -> Self {
        let id = order_ref.into();
        Self {
            order_ref: (!id.is_blank()).then_some(id),
            ..Self::default()
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = non_blank(actor_id.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = non_blank(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseResponse {
    pub reservation: Reservation,
    /// Present when the order was read to resolve the reservation.
    pub promotion_code: Option<String>,
    pub message: Option<String>,
}

pub(crate) fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
