//! Checkout flows that span the reservation engine and the order store.
//!
//! - [`CheckoutCoordinator`] pairs a reservation commit with the order's
//!   `PendingPayment -> Paid` transition, and releases checkout holds.
//! - [`ExpirySweeper`] drains expired holds in bounded batches;
//!   [`scheduler::spawn_sweeper`] drives it on a timer.
//! - [`telemetry`] holds the metrics sinks the HTTP layer reports into.

pub mod commands;
pub mod coordinator;
pub mod error;
pub mod release;
pub mod scheduler;
pub mod sweeper;
pub mod telemetry;

pub use commands::{CommitCheckout, CommitResponse, ReleaseCheckout, ReleaseResponse};
pub use coordinator::CheckoutCoordinator;
pub use error::{CheckoutError, Result};
pub use scheduler::spawn_sweeper;
pub use sweeper::{CleanupRequest, ExpirySweeper, SweeperConfig};
pub use telemetry::{
    CleanupMetrics, CleanupRun, NoopMetrics, PrometheusMetrics, RecordingMetrics, ReservationMetrics,
};
