//! Storage layer for stock reservations and orders.
//!
//! Two collaborator contracts live here: [`ReservationStore`], which owns
//! reservation records together with the per-sku stock counters they hold,
//! and [`OrderStore`], which owns orders and their guarded status
//! transitions. Both come with an in-memory and a PostgreSQL implementation.

pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod query;
pub mod reservation;
pub mod stock;
pub mod store;

pub use common::{OrderId, ReservationId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use order::{
    Metadata, MetadataValue, Order, OrderStatus, PAYMENT_INTENT_ID_KEY, Promotion,
    RESERVATION_ID_KEY,
};
pub use postgres::PostgresStore;
pub use query::ExpiredQuery;
pub use reservation::{
    NewReservation, ParseStatusError, Reservation, ReservationLine, ReservationStatus,
};
pub use stock::{Stock, StockLevel};
pub use store::{
    CreateOutcome, OrderStore, OrderStoreExt, OrderTransition, ReservationStore,
    ReservationStoreExt, ReservationTransition, TransitionOutcome, validate_new_reservation,
};
