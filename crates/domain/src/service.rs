use std::sync::Arc;

use async_trait::async_trait;
use common::ReservationId;
use store::Reservation;
use tokio_util::sync::CancellationToken;

use crate::{
    CommitReservation, ReleaseExpiredReservations, ReleaseExpiredResult, ReleaseReservation,
    ReserveStocks, error::Result,
};

/// The reservation lifecycle as seen by its callers.
///
/// Every operation takes the caller's cancellation token; a store call
/// still in flight when it fires fails with `InventoryError::Cancelled`.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Holds stock for an order, or replays an earlier identical request.
    async fn reserve_stocks(
        &self,
        cmd: ReserveStocks,
        cancel: &CancellationToken,
    ) -> Result<Reservation>;

    /// Commits a held reservation. Committing twice for the same order is a
    /// no-op that returns the committed reservation.
    async fn commit_reservation(
        &self,
        cmd: CommitReservation,
        cancel: &CancellationToken,
    ) -> Result<Reservation>;

    /// Releases a held reservation. Already released or expired
    /// reservations are returned unchanged.
    async fn release_reservation(
        &self,
        cmd: ReleaseReservation,
        cancel: &CancellationToken,
    ) -> Result<Reservation>;

    /// Fetches a reservation.
    async fn get_reservation(
        &self,
        id: &ReservationId,
        cancel: &CancellationToken,
    ) -> Result<Reservation>;

    /// Expires up to `cmd.limit` held reservations whose expiry has passed.
    ///
    /// Per-reservation failures are reported in the result; only a failed
    /// scan is returned as an error.
    async fn release_expired_reservations(
        &self,
        cmd: ReleaseExpiredReservations,
        cancel: &CancellationToken,
    ) -> Result<ReleaseExpiredResult>;
}

#[async_trait]
impl<T: InventoryService + ?Sized> InventoryService for Arc<T> {
    async fn reserve_stocks(
        &self,
        cmd: ReserveStocks,
        cancel: &CancellationToken,
    ) -> Result<Reservation> {
        (**self).reserve_stocks(cmd, cancel).await
    }

    async fn commit_reservation(
        &self,
        cmd: CommitReservation,
        cancel: &CancellationToken,
    ) -> Result<Reservation> {
        (**self).commit_reservation(cmd, cancel).await
    }

    async fn release_reservation(
        &self,
        cmd: ReleaseReservation,
        cancel: &CancellationToken,
    ) -> Result<Reservation> {
        (**self).release_reservation(cmd, cancel).await
    }

    async fn get_reservation(
        &self,
        id: &ReservationId,
        cancel: &CancellationToken,
    ) -> Result<Reservation> {
        (**self).get_reservation(id, cancel).await
    }

    async fn release_expired_reservations(
        &self,
        cmd: ReleaseExpiredReservations,
        cancel: &CancellationToken,
    ) -> Result<ReleaseExpiredResult> {
        (**self).release_expired_reservations(cmd, cancel).await
    }
}
