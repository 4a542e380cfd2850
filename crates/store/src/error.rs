use common::{ErrorKind, OrderId, ReservationId};
use thiserror::Error;

use crate::{OrderStatus, ReservationStatus};

/// Errors that can occur when interacting with the reservation or order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A reservation record failed structural validation.
    #[error("Invalid reservation: {0}")]
    InvalidReservation(String),

    /// Reserving would drive available stock below zero.
    #[error("Insufficient stock for sku {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: u64,
        available: i64,
    },

    /// The order already holds a live (held or committed) reservation.
    #[error("Order {order_id} already has active reservation {reservation_id}")]
    ActiveReservationExists {
        order_id: OrderId,
        reservation_id: ReservationId,
    },

    /// The requested reservation status change is not an edge of the state machine.
    #[error("Invalid reservation transition for {reservation_id}: {from} -> {to}")]
    InvalidReservationTransition {
        reservation_id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    },

    /// The requested order status change is not an edge of the order lifecycle.
    #[error("Invalid order transition for {order_id}: {from} -> {to}")]
    InvalidOrderTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The expected-status guard of an order transition fired.
    #[error("Order status conflict for {order_id}: expected {expected}, found {actual}")]
    OrderStatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// An order with this ID already exists.
    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// Stock counters would leave `on_hand >= reserved >= 0`.
    #[error("Stock invariant violated for sku {sku}: on_hand {on_hand}, reserved {reserved}")]
    StockInvariant {
        sku: String,
        on_hand: i64,
        reserved: i64,
    },

    /// A persisted value could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Classifies the error into the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ReservationNotFound(_) | StoreError::OrderNotFound(_) => {
                ErrorKind::NotFound
            }
            StoreError::InvalidReservation(_) => ErrorKind::InvalidInput,
            StoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            StoreError::ActiveReservationExists { .. }
            | StoreError::InvalidReservationTransition { .. }
            | StoreError::InvalidOrderTransition { .. }
            | StoreError::StockInvariant { .. } => ErrorKind::InvalidState,
            StoreError::OrderStatusConflict { .. } | StoreError::DuplicateOrder(_) => {
                ErrorKind::Conflict
            }
            StoreError::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
            ) => ErrorKind::ServiceUnavailable,
            StoreError::Corrupt(_)
            | StoreError::Database(_)
            | StoreError::Migration(_)
            | StoreError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_taxonomy() {
        assert_eq!(
            StoreError::ReservationNotFound(ReservationId::new("r1")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            StoreError::InsufficientStock {
                sku: "SKU-1".into(),
                requested: 3,
                available: 1,
            }
            .kind(),
            ErrorKind::InsufficientStock
        );
        assert_eq!(
            StoreError::OrderStatusConflict {
                order_id: OrderId::new("o1"),
                expected: OrderStatus::PendingPayment,
                actual: OrderStatus::Paid,
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            StoreError::Database(sqlx::Error::PoolTimedOut).kind(),
            ErrorKind::ServiceUnavailable
        );
    }
}
