//! Shared building blocks for the checkout reservation workspace.

pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ErrorKind;
pub use types::{OrderId, ReservationId};
