//! Commands accepted by the reservation lifecycle engine.

use chrono::Duration;
use common::{OrderId, ReservationId};
use store::ReservationLine;

use crate::error::{InventoryError, Result};

/// Reason recorded on reservations created by checkout.
pub const DEFAULT_RESERVE_REASON: &str = "internal_checkout";

/// Command to hold stock for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveStocks {
    pub order_ref: OrderId,
    pub user_ref: String,
    pub lines: Vec<ReservationLine>,
    pub ttl: Duration,
    pub reason: String,
    pub idempotency_key: Option<String>,
}

impl ReserveStocks {
    pub fn new(
        order_ref: impl Into<OrderId>,
        user_ref: impl Into<String>,
        lines: Vec<ReservationLine>,
        ttl: Duration,
    ) -> Self {
        Self {
            order_ref: order_ref.into(),
            user_ref: user_ref.into(),
            lines,
            ttl,
            reason: DEFAULT_RESERVE_REASON.to_string(),
            idempotency_key: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Sets the idempotency key. Blank keys are ignored.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.idempotency_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    /// Checks required fields, line contents and TTL.
    pub fn validate(&self) -> Result<()> {
        if self.order_ref.is_blank() {
            return Err(invalid("orderRef is required"));
        }
        if self.user_ref.trim().is_empty() {
            return Err(invalid("userRef is required"));
        }
        if self.lines.is_empty() {
            return Err(invalid("lines must contain at least one entry"));
        }
        for (i, line) in self.lines.iter().enumerate() {
            if line.sku.trim().is_empty() {
                return Err(invalid(format!("lines[{i}].sku is required")));
            }
            if line.product_ref.trim().is_empty() {
                return Err(invalid(format!("lines[{i}].productRef is required")));
            }
            if line.quantity == 0 {
                return Err(invalid(format!("lines[{i}].quantity must be positive")));
            }
        }
        if self.ttl <= Duration::zero() {
            return Err(invalid("ttl must be positive"));
        }
        Ok(())
    }
}

/// Command to turn a held reservation into a permanent stock deduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReservation {
    pub reservation_id: ReservationId,
    pub order_ref: OrderId,
    pub actor_id: Option<String>,
}

impl CommitReservation {
    pub fn new(reservation_id: impl Into<ReservationId>, order_ref: impl Into<OrderId>) -> Self {
        Self {
            reservation_id: reservation_id.into(),
            order_ref: order_ref.into(),
            actor_id: None,
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = non_blank(actor_id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.reservation_id.is_blank() {
            return Err(invalid("reservationId is required"));
        }
        if self.order_ref.is_blank() {
            return Err(invalid("orderRef is required"));
        }
        Ok(())
    }
}

/// Command to hand a held reservation's stock back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReservation {
    pub reservation_id: ReservationId,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
}

impl ReleaseReservation {
    pub fn new(reservation_id: impl Into<ReservationId>) -> Self {
        Self {
            reservation_id: reservation_id.into(),
            actor_id: None,
            reason: None,
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

    pub fn validate(&self) -> Result<()> {
        if self.reservation_id.is_blank() {
            return Err(invalid("reservationId is required"));
        }
        Ok(())
    }
}

/// Command to sweep held reservations whose expiry has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseExpiredReservations {
    /// Zero means the engine's default cap.
    pub limit: usize,
    pub actor_id: String,
    pub reason: String,
}

impl ReleaseExpiredReservations {
    pub fn new(limit: usize, actor_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            limit,
            actor_id: actor_id.into(),
            reason: reason.into(),
        }
    }
}

fn invalid(message: impl Into<String>) -> InventoryError {
    InventoryError::InvalidInput(message.into())
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserve(lines: Vec<ReservationLine>) -> ReserveStocks {
        ReserveStocks::new("ord_1", "user_1", lines, Duration::minutes(15))
    }

    fn message(err: InventoryError) -> String {
        match err {
            InventoryError::InvalidInput(message) => message,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn valid_reserve_passes() {
        let cmd = reserve(vec![ReservationLine::new("prod_1", "SKU-1", 2)]);
        assert!(cmd.validate().is_ok());
        assert_eq!(cmd.reason, DEFAULT_RESERVE_REASON);
    }

    #[test]
    fn empty_lines_rejected() {
        let err = reserve(vec![]).validate().unwrap_err();
        assert_eq!(message(err), "lines must contain at least one entry");
    }

    #[test]
    fn line_errors_name_the_index() {
        let cmd = reserve(vec![
            ReservationLine::new("prod_1", "SKU-1", 1),
            ReservationLine::new("prod_2", "", 1),
        ]);
        assert_eq!(message(cmd.validate().unwrap_err()), "lines[1].sku is required");

        let cmd = reserve(vec![ReservationLine::new("", "SKU-1", 1)]);
        assert_eq!(
            message(cmd.validate().unwrap_err()),
            "lines[0].productRef is required"
        );

        let cmd = reserve(vec![ReservationLine::new("prod_1", "SKU-1", 0)]);
        assert_eq!(
            message(cmd.validate().unwrap_err()),
            "lines[0].quantity must be positive"
        );
    }

    #[test]
    fn missing_user_and_ttl_rejected() {
        let mut cmd = reserve(vec![ReservationLine::new("prod_1", "SKU-1", 1)]);
        cmd.user_ref = "  ".into();
        assert_eq!(message(cmd.validate().unwrap_err()), "userRef is required");

        let mut cmd = reserve(vec![ReservationLine::new("prod_1", "SKU-1", 1)]);
        cmd.ttl = Duration::zero();
        assert_eq!(message(cmd.validate().unwrap_err()), "ttl must be positive");
    }

    #[test]
    fn blank_idempotency_key_is_ignored() {
        let cmd = reserve(vec![]).idempotency_key("   ");
        assert_eq!(cmd.idempotency_key, None);
        let cmd = reserve(vec![]).idempotency_key("key-1");
        assert_eq!(cmd.idempotency_key.as_deref(), Some("key-1"));
    }

    #[test]
    fn blank_actor_and_reason_are_dropped() {
        let cmd = ReleaseReservation::new("res_1").actor(" ").reason(" checkout ");
        assert_eq!(cmd.actor_id, None);
        assert_eq!(cmd.reason.as_deref(), Some("checkout"));
    }
}
