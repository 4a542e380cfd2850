use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ReservationStatus, Result, StoreError};

/// Per-sku stock counters.
///
/// `on_hand >= reserved >= 0` holds after every committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub sku: String,
    pub product_ref: Option<String>,
    pub on_hand: i64,
    pub reserved: i64,
    pub safety_stock: i64,
    pub updated_at: DateTime<Utc>,
}

impl Stock {
    /// Units that can still be reserved.
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    /// Headroom above the safety threshold. Negative means the sku is
    /// running below its safety stock.
    pub fn safety_delta(&self) -> i64 {
        self.available() - self.safety_stock
    }

    pub fn satisfies_invariant(&self) -> bool {
        self.reserved >= 0 && self.on_hand >= self.reserved
    }

    /// Counters after holding `quantity` more units.
    pub fn hold(&self, quantity: u64, at: DateTime<Utc>) -> Result<Stock> {
        let requested = units(quantity);
        if self.available() < requested {
            return Err(StoreError::InsufficientStock {
                sku: self.sku.clone(),
                requested: quantity,
                available: self.available(),
            });
        }
        Ok(Stock {
            reserved: self.reserved + requested,
            updated_at: at,
            ..self.clone()
        })
    }

    /// Counters after a held reservation of `quantity` units leaves `Held`
    /// for `target`.
    pub fn settle(
        &self,
        target: ReservationStatus,
        quantity: u64,
        at: DateTime<Utc>,
    ) -> Result<Stock> {
        let units = units(quantity);
        let on_hand = match target {
            ReservationStatus::Committed => self.on_hand - units,
            _ => self.on_hand,
        };
        let settled = Stock {
            on_hand,
            reserved: self.reserved - units,
            updated_at: at,
            ..self.clone()
        };
        if !settled.satisfies_invariant() {
            return Err(StoreError::StockInvariant {
                sku: settled.sku,
                on_hand: settled.on_hand,
                reserved: settled.reserved,
            });
        }
        Ok(settled)
    }
}

fn units(quantity: u64) -> i64 {
    i64::try_from(quantity).unwrap_or(i64::MAX)
}

/// Administrative stock level update. `reserved` is never written directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub sku: String,
    pub product_ref: Option<String>,
    pub on_hand: i64,
    pub safety_stock: i64,
    pub at: DateTime<Utc>,
}

impl StockLevel {
    pub fn new(sku: impl Into<String>, on_hand: i64, at: DateTime<Utc>) -> Self {
        Self {
            sku: sku.into(),
            product_ref: None,
            on_hand,
            safety_stock: 0,
            at,
        }
    }

    pub fn product_ref(mut self, product_ref: impl Into<String>) -> Self {
        self.product_ref = Some(product_ref.into());
        self
    }

    pub fn safety_stock(mut self, safety_stock: i64) -> Self {
        self.safety_stock = safety_stock;
        self
    }
}
