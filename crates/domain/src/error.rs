//! Reservation lifecycle error types.

use common::{ErrorKind, OrderId, ReservationId};
use store::{ReservationStatus, StoreError};
use thiserror::Error;

use crate::cancel::Cancelled;

/// Errors that can occur during reservation lifecycle operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The request is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reserving would drive available stock negative.
    #[error("Insufficient stock for sku {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: u64,
        available: i64,
    },

    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    NotFound(ReservationId),

    /// The reservation's current status does not permit the operation.
    #[error("Invalid state: cannot {action} reservation {reservation_id} in {status} state")]
    InvalidState {
        reservation_id: ReservationId,
        status: ReservationStatus,
        action: &'static str,
    },

    /// The order already holds a live reservation.
    #[error("Order {order_id} already holds active reservation {reservation_id}")]
    ActiveReservation {
        order_id: OrderId,
        reservation_id: ReservationId,
    },

    /// The caller's cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// An error occurred in the reservation store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl InventoryError {
    /// Classifies the error into the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::InvalidInput(_) => ErrorKind::InvalidInput,
            InventoryError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            InventoryError::NotFound(_) => ErrorKind::NotFound,
            InventoryError::InvalidState { .. } | InventoryError::ActiveReservation { .. } => {
                ErrorKind::InvalidState
            }
            InventoryError::Cancelled => ErrorKind::Cancelled,
            InventoryError::Store(e) => e.kind(),
        }
    }

    pub fn is_invalid_state(&self) -> bool {
        self.kind() == ErrorKind::InvalidState
    }

    /// Stable snake_case code for wire responses and failure metrics.
    pub fn code(&self) -> &'static str {
        match self {
            InventoryError::InvalidInput(_) => "invalid_request",
            InventoryError::InsufficientStock { .. } => "insufficient_stock",
            InventoryError::NotFound(_) => "reservation_not_found",
            InventoryError::InvalidState { .. } | InventoryError::ActiveReservation { .. } => {
                "invalid_state"
            }
            InventoryError::Cancelled => "cancelled",
            InventoryError::Store(e) if e.kind() == ErrorKind::ServiceUnavailable => {
                "store_unavailable"
            }
            InventoryError::Store(_) => "reservation_error",
        }
    }
}

impl From<Cancelled> for InventoryError {
    fn from(_: Cancelled) -> Self {
        InventoryError::Cancelled
    }
}

impl From<StoreError> for InventoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidReservation(message) => InventoryError::InvalidInput(message),
            StoreError::InsufficientStock {
                sku,
                requested,
                available,
            } => InventoryError::InsufficientStock {
                sku,
                requested,
                available,
            },
            StoreError::ReservationNotFound(id) => InventoryError::NotFound(id),
            StoreError::ActiveReservationExists {
                order_id,
                reservation_id,
            } => InventoryError::ActiveReservation {
                order_id,
                reservation_id,
            },
            StoreError::InvalidReservationTransition {
                reservation_id,
                from,
                to,
            } => InventoryError::InvalidState {
                reservation_id,
                status: from,
                action: match to {
                    ReservationStatus::Committed => "commit",
                    ReservationStatus::Released => "release",
                    ReservationStatus::Expired => "expire",
                    ReservationStatus::Held => "hold",
                },
            },
            other => InventoryError::Store(other),
        }
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_translated() {
        let err: InventoryError = StoreError::InsufficientStock {
            sku: "SKU-1".into(),
            requested: 2,
            available: 1,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        let err: InventoryError = StoreError::InvalidReservationTransition {
            reservation_id: ReservationId::new("res_1"),
            from: ReservationStatus::Committed,
            to: ReservationStatus::Released,
        }
        .into();
        assert!(err.is_invalid_state());
        assert!(err.to_string().contains("cannot release"));

        let err: InventoryError = StoreError::Corrupt("bad status".into()).into();
        assert!(matches!(err, InventoryError::Store(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.code(), "reservation_error");
    }

    #[test]
    fn cancelled_is_retryable() {
        let err: InventoryError = Cancelled.into();
        assert!(err.kind().is_retryable());
    }
}
