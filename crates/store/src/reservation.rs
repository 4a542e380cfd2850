use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ReservationId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a reservation.
///
/// `Held` is the only live-and-pending status. Every transition leaves
/// `Held`; the other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Held,
    Committed,
    Released,
    Expired,
}

impl ReservationStatus {
    /// Returns true if `target` is a legal next status.
    pub fn can_transition_to(&self, target: ReservationStatus) -> bool {
        matches!(
            (self, target),
            (
                ReservationStatus::Held,
                ReservationStatus::Committed | ReservationStatus::Released | ReservationStatus::Expired
            )
        )
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Held)
    }

    /// Held and committed reservations count against the one-per-order rule.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Held | ReservationStatus::Committed)
    }

    /// Released and expired reservations have handed their stock back.
    pub fn is_released(&self) -> bool {
        matches!(self, ReservationStatus::Released | ReservationStatus::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "held",
            ReservationStatus::Committed => "committed",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for ReservationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(ReservationStatus::Held),
            "committed" => Ok(ReservationStatus::Committed),
            "released" => Ok(ReservationStatus::Released),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// One sku and quantity within a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationLine {
    pub product_ref: String,
    pub sku: String,
    pub quantity: u32,
}

impl ReservationLine {
    pub fn new(product_ref: impl Into<String>, sku: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_ref: product_ref.into(),
            sku: sku.into(),
            quantity,
        }
    }
}

/// Sums quantities per sku. Duplicate skus within one request add up.
pub fn quantities_by_sku(lines: &[ReservationLine]) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for line in lines {
        *totals.entry(line.sku.clone()).or_insert(0u64) += u64::from(line.quantity);
    }
    totals
}

/// Order-independent fingerprint of a set of lines, used to decide whether
/// an idempotent retry asks for the same thing.
pub fn line_signature(lines: &[ReservationLine]) -> Vec<(String, u32)> {
    let mut signature: Vec<(String, u32)> = lines
        .iter()
        .map(|line| (line.sku.clone(), line.quantity))
        .collect();
    signature.sort();
    signature
}

/// A reservation about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub id: ReservationId,
    pub order_ref: OrderId,
    pub user_ref: String,
    pub lines: Vec<ReservationLine>,
    pub reason: String,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewReservation {
    /// Materializes the record as it looks right after creation.
    pub fn into_reservation(self) -> Reservation {
        Reservation {
            id: self.id,
            order_ref: self.order_ref,
            user_ref: self.user_ref,
            status: ReservationStatus::Held,
            lines: self.lines,
            reason: self.reason,
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
            expires_at: self.expires_at,
            updated_at: self.created_at,
            committed_at: None,
            released_at: None,
            last_actor_id: None,
            release_reason: None,
        }
    }
}

/// A persisted reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub order_ref: OrderId,
    pub user_ref: String,
    pub status: ReservationStatus,
    pub lines: Vec<ReservationLine>,
    pub reason: String,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub last_actor_id: Option<String>,
    pub release_reason: Option<String>,
}

impl Reservation {
    /// Time between creation and expiry.
    pub fn ttl(&self) -> Duration {
        self.expires_at - self.created_at
    }

    /// True once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Distinct skus in sorted order.
    pub fn skus(&self) -> Vec<String> {
        quantities_by_sku(&self.lines).into_keys().collect()
    }

    pub fn quantities_by_sku(&self) -> BTreeMap<String, u64> {
        quantities_by_sku(&self.lines)
    }

    pub fn line_signature(&self) -> Vec<(String, u32)> {
        line_signature(&self.lines)
    }

    /// Records a status change on the in-memory copy.
    ///
    /// Stock counters are not touched here; stores adjust them in the same
    /// critical section.
    pub fn apply_transition(
        &mut self,
        target: ReservationStatus,
        actor_id: Option<&str>,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) {
        self.status = target;
        self.updated_at = at;
        self.last_actor_id = actor_id.map(str::to_string);
        match target {
            ReservationStatus::Committed => self.committed_at = Some(at),
            ReservationStatus::Released | ReservationStatus::Expired => {
                self.released_at = Some(at);
                self.release_reason = reason.map(str::to_string);
            }
            ReservationStatus::Held => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_held_can_transition() {
        use ReservationStatus::*;
        assert!(Held.can_transition_to(Committed));
        assert!(Held.can_transition_to(Released));
        assert!(Held.can_transition_to(Expired));
        assert!(!Held.can_transition_to(Held));

        for terminal in [Committed, Released, Expired] {
            assert!(terminal.is_terminal());
            for target in [Held, Committed, Released, Expired] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ReservationStatus::Held,
            ReservationStatus::Committed,
            ReservationStatus::Released,
            ReservationStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), status);
        }
        assert!("pending".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn duplicate_skus_are_summed() {
        let lines = vec![
            ReservationLine::new("p1", "SKU-1", 2),
            ReservationLine::new("p2", "SKU-2", 1),
            ReservationLine::new("p1", "SKU-1", 3),
        ];
        let totals = quantities_by_sku(&lines);
        assert_eq!(totals.get("SKU-1"), Some(&5));
        assert_eq!(totals.get("SKU-2"), Some(&1));
    }

    #[test]
    fn signature_ignores_line_order() {
        let a = vec![
            ReservationLine::new("p1", "SKU-1", 2),
            ReservationLine::new("p2", "SKU-2", 1),
        ];
        let b = vec![
            ReservationLine::new("p2", "SKU-2", 1),
            ReservationLine::new("p1", "SKU-1", 2),
        ];
        assert_eq!(line_signature(&a), line_signature(&b));

        let c = vec![ReservationLine::new("p1", "SKU-1", 3)];
        assert_ne!(line_signature(&a), line_signature(&c));
    }

    #[test]
    fn apply_transition_stamps_release_fields() {
        let now = Utc::now();
        let mut reservation = NewReservation {
            id: ReservationId::new("res_1"),
            order_ref: OrderId::new("ord_1"),
            user_ref: "user_1".into(),
            lines: vec![ReservationLine::new("p1", "SKU-1", 1)],
            reason: "internal_checkout".into(),
            idempotency_key: None,
            created_at: now,
            expires_at: now + Duration::minutes(15),
        }
        .into_reservation();

        let later = now + Duration::minutes(20);
        reservation.apply_transition(
            ReservationStatus::Expired,
            Some("system:maintenance"),
            Some("expired_maintenance_cleanup"),
            later,
        );

        assert_eq!(reservation.status, ReservationStatus::Expired);
        assert_eq!(reservation.released_at, Some(later));
        assert_eq!(reservation.committed_at, None);
        assert_eq!(reservation.last_actor_id.as_deref(), Some("system:maintenance"));
        assert_eq!(
            reservation.release_reason.as_deref(),
            Some("expired_maintenance_cleanup")
        );
        assert_eq!(reservation.ttl(), Duration::minutes(15));
    }
}
