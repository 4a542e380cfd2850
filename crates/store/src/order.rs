use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId};
use serde::{Deserialize, Serialize};

use crate::reservation::ParseStatusError;

/// Metadata key under which an order remembers its reservation.
pub const RESERVATION_ID_KEY: &str = "reservationId";

/// Metadata key under which a paid order records its payment intent.
pub const PAYMENT_INTENT_ID_KEY: &str = "paymentIntentId";

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    InProduction,
    ReadyToShip,
    Shipped,
    Delivered,
    Completed,
    Canceled,
}

impl OrderStatus {
    /// Returns true if the lifecycle permits moving to `target`.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (PendingPayment, Paid | Canceled)
                | (Paid, InProduction | Canceled)
                | (InProduction, ReadyToShip)
                | (ReadyToShip, Shipped)
                | (Shipped, Delivered)
                | (Delivered, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::InProduction => "in_production",
            OrderStatus::ReadyToShip => "ready_to_ship",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(OrderStatus::PendingPayment),
            "paid" => Ok(OrderStatus::Paid),
            "in_production" => Ok(OrderStatus::InProduction),
            "ready_to_ship" => Ok(OrderStatus::ReadyToShip),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "completed" => Ok(OrderStatus::Completed),
            "canceled" => Ok(OrderStatus::Canceled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A metadata value. Only scalars and nested maps are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Number(n.into())
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Promotion applied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub code: String,
}

/// An order as seen by the checkout flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_ref: Option<String>,
    pub status: OrderStatus,
    pub metadata: Metadata,
    pub promotion: Option<Promotion>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: impl Into<OrderId>, status: OrderStatus, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            user_ref: None,
            status,
            metadata: Metadata::new(),
            promotion: None,
            paid_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn with_user(mut self, user_ref: impl Into<String>) -> Self {
        self.user_ref = Some(user_ref.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_reservation(self, reservation_id: &ReservationId) -> Self {
        self.with_metadata(RESERVATION_ID_KEY, reservation_id.as_str())
    }

    pub fn with_promotion(mut self, code: impl Into<String>) -> Self {
        self.promotion = Some(Promotion { code: code.into() });
        self
    }

    /// Trimmed, non-empty string metadata value.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(MetadataValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The reservation recorded in `metadata.reservationId`, if any.
    pub fn reservation_id(&self) -> Option<ReservationId> {
        self.metadata_str(RESERVATION_ID_KEY).map(ReservationId::from)
    }

    pub fn promotion_code(&self) -> Option<&str> {
        self.promotion.as_ref().map(|p| p.code.as_str())
    }

    /// Merges `patch` into the metadata; patched keys win.
    pub fn merge_metadata(&mut self, patch: &Metadata) {
        for (key, value) in patch {
            self.metadata.insert(key.clone(), value.clone());
        }
    }
}
