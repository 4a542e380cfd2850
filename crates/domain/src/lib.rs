//! Reservation lifecycle engine.
//!
//! This crate provides:
//! - Commands for reserving, committing, releasing and expiring stock holds
//! - The `InventoryService` trait the checkout flow depends on
//! - `ReservationEngine`, which enforces the reservation state machine on
//!   top of a `store::ReservationStore`

pub mod cancel;
pub mod commands;
pub mod engine;
pub mod error;
pub mod result;
pub mod service;

pub use cancel::{Cancelled, with_cancel};
pub use commands::{
    CommitReservation, DEFAULT_RESERVE_REASON, ReleaseExpiredReservations, ReleaseReservation,
    ReserveStocks,
};
pub use engine::{EngineConfig, ReservationEngine};
pub use error::{InventoryError, Result};
pub use result::ReleaseExpiredResult;
pub use service::InventoryService;
