//! Checkout error types.

use common::{ErrorKind, OrderId, ReservationId};
use domain::{Cancelled, InventoryError};
use store::{OrderStatus, StoreError};
use thiserror::Error;

/// Errors that can occur during checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No reservation was given and the order does not link one.
    #[error("Order {0} has no linked reservation")]
    ReservationMissing(OrderId),

    /// The order is neither awaiting payment nor already paid.
    #[error("Order {order_id} is in {status} state, expected pending_payment")]
    InvalidOrderStatus {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// The reservation cannot be settled from its current state.
    #[error("Reservation {reservation_id} is in an invalid state: {detail}")]
    InvalidReservationState {
        reservation_id: ReservationId,
        detail: String,
    },

    /// The order moved under us and did not end up paid.
    #[error("Order {order_id} changed concurrently: {detail}")]
    OrderConflict { order_id: OrderId, detail: String },

    /// The caller's cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// Inventory service error.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Classifies the error into the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::InvalidInput(_) => ErrorKind::InvalidInput,
            CheckoutError::OrderNotFound(_) => ErrorKind::NotFound,
            CheckoutError::ReservationMissing(_)
            | CheckoutError::InvalidOrderStatus { .. }
            | CheckoutError::InvalidReservationState { .. }
            | CheckoutError::OrderConflict { .. } => ErrorKind::Conflict,
            CheckoutError::Cancelled => ErrorKind::Cancelled,
            CheckoutError::Inventory(e) => e.kind(),
            CheckoutError::Store(e) => e.kind(),
        }
    }

    /// Stable snake_case code for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::InvalidInput(_) => "invalid_request",
            CheckoutError::OrderNotFound(_) => "order_not_found",
            CheckoutError::ReservationMissing(_) => "reservation_missing",
            CheckoutError::InvalidOrderStatus { .. } => "invalid_order_status",
            CheckoutError::InvalidReservationState { .. } => "invalid_reservation_state",
            CheckoutError::OrderConflict { .. } => "order_conflict",
            CheckoutError::Cancelled => "cancelled",
            CheckoutError::Inventory(e) => e.code(),
            CheckoutError::Store(e) if e.kind() == ErrorKind::ServiceUnavailable => {
                "store_unavailable"
            }
            CheckoutError::Store(_) => "order_store_error",
        }
    }
}

impl From<Cancelled> for CheckoutError {
    fn from(_: Cancelled) -> Self {
        CheckoutError::Cancelled
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
