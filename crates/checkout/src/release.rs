//! Releasing a checkout hold that will not be paid.

use common::Clock;
use domain::{InventoryService, ReleaseReservation};
use store::OrderStore;
use tokio_util::sync::CancellationToken;

use crate::commands::{ReleaseCheckout, ReleaseResponse};
use crate::coordinator::CheckoutCoordinator;
use crate::error::{CheckoutError, Result};

pub const DEFAULT_RELEASE_REASON: &str = "checkout_release";
pub const DEFAULT_RELEASE_ACTOR: &str = "system:checkout";

const ALREADY_RELEASED: &str = "reservation already released";

impl<I, O, C> CheckoutCoordinator<I, O, C>
where
    I: InventoryService,
    O: OrderStore,
    C: Clock,
{
    /// Releases the reservation named directly or linked from the order.
    ///
    /// Releasing an already released or expired reservation returns it
    /// unchanged. A committed reservation cannot be released.
    #[tracing::instrument(
        skip(self, cmd, cancel),
        fields(reservation_id = ?cmd.reservation_id, order_id = ?cmd.order_ref)
    )]
    pub async fn release_checkout(
        &self,
        cmd: ReleaseCheckout,
        cancel: &CancellationToken,
    ) -> Result<ReleaseResponse> {
        let order = match &cmd.order_ref {
            Some(order_ref) if !order_ref.is_blank() => {
                Some(self.load_order(order_ref, cancel).await?)
            }
            _ => None,
        };

        let reservation_id = match (&cmd.reservation_id, &order) {
            (Some(id), _) if !id.is_blank() => id.clone(),
            (_, Some(order)) => order
                .reservation_id()
                .ok_or_else(|| CheckoutError::ReservationMissing(order.id.clone()))?,
            _ => {
                return Err(CheckoutError::InvalidInput(
                    "reservationId or orderId is required".into(),
                ));
            }
        };
        let promotion_code = order
            .as_ref()
            .and_then(|o| o.promotion_code())
            .map(str::to_string);

        let release = ReleaseReservation::new(reservation_id.clone())
            .actor(cmd.actor_id.as_deref().unwrap_or(DEFAULT_RELEASE_ACTOR))
            .reason(cmd.reason.as_deref().unwrap_or(DEFAULT_RELEASE_REASON));

        let err = match self.inventory.release_reservation(release, cancel).await {
            Ok(reservation) => {
                tracing::info!(
                    %reservation_id,
                    status = %reservation.status,
                    "checkout reservation released"
                );
                return Ok(ReleaseResponse {
                    reservation,
                    promotion_code,
                    message: None,
                });
            }
            Err(e) if e.is_invalid_state() => e,
            Err(e) => return Err(e.into()),
        };

        let current = self.inventory.get_reservation(&reservation_id, cancel).await?;
        if current.status.is_released() {
            return Ok(ReleaseResponse {
                reservation: current,
                promotion_code,
                message: Some(ALREADY_RELEASED.to_string()),
            });
        }
        Err(CheckoutError::InvalidReservationState {
            reservation_id,
            detail: format!("{err}; reservation is {}", current.status),
        })
    }
}
