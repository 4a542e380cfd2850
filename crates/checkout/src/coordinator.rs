//! Checkout coordinator pairing reservation commits with order payment.

use common::{Clock, ErrorKind, OrderId, ReservationId, SystemClock};
use domain::{CommitReservation, InventoryService, with_cancel};
use store::{
    Order, OrderStatus, OrderStore, OrderTransition, PAYMENT_INTENT_ID_KEY, RESERVATION_ID_KEY,
    Reservation, ReservationStatus,
};
use tokio_util::sync::CancellationToken;

use crate::commands::{CommitCheckout, CommitResponse};
use crate::error::{CheckoutError, Result};

pub(crate) const SOURCE_KEY: &str = "source";
pub(crate) const ACTOR_ID_KEY: &str = "actorId";
pub(crate) const PROMOTION_CODE_KEY: &str = "promotionCode";
pub(crate) const COMMIT_SOURCE: &str = "internal_checkout_commit";

const ALREADY_PAID: &str = "order already marked as paid";
const ALREADY_TRANSITIONED: &str = "order already transitioned";

/// Drives checkout across the inventory service and the order store.
///
/// There is no transaction spanning both. The reservation is always committed
/// before the order is moved to `Paid`, so a paid order implies a committed
/// reservation. A retry after a crash between the two steps reconciles on
/// the reservation's observed state.
pub struct CheckoutCoordinator<I, O, C = SystemClock> {
    pub(crate) inventory: I,
    pub(crate) orders: O,
    pub(crate) clock: C,
}

impl<I, O> CheckoutCoordinator<I, O, SystemClock>
where
    I: InventoryService,
    O: OrderStore,
{
    /// Creates a coordinator reading the system clock.
    pub fn new(inventory: I, orders: O) -> Self {
        Self::with_clock(inventory, orders, SystemClock)
    }
}

impl<I, O, C> CheckoutCoordinator<I, O, C>
where
    I: InventoryService,
    O: OrderStore,
    C: Clock,
{
    pub fn with_clock(inventory: I, orders: O, clock: C) -> Self {
        Self {
            inventory,
            orders,
            clock,
        }
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    /// Commits the order's reservation and marks the order paid.
    ///
    /// Replays on an already paid order return a response with `message` set
    /// and do not touch the reservation.
    #[tracing::instrument(skip(self, cmd, cancel), fields(order_id = %cmd.order_ref))]
    pub async fn commit_checkout(
        &self,
        cmd: CommitCheckout,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        let started = std::time::Instant::now();
        let result = self.commit_inner(cmd, cancel).await;

        let outcome = match &result {
            Ok(response) if response.is_replay() => "replayed",
            Ok(_) => "committed",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!("checkout_commits_total", "outcome" => outcome).increment(1);
        metrics::histogram!("checkout_commit_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        result
    }

    async fn commit_inner(
        &self,
        cmd: CommitCheckout,
        cancel: &CancellationToken,
    ) -> Result<CommitResponse> {
        if cmd.order_ref.is_blank() {
            return Err(CheckoutError::InvalidInput("orderId is required".into()));
        }

        // 1. Load the order
        let order = self.load_order(&cmd.order_ref, cancel).await?;

        // 2. Resolve the reservation
        let reservation_id = cmd
            .reservation_id
            .clone()
            .filter(|id| !id.is_blank())
            .or_else(|| order.reservation_id())
            .ok_or_else(|| CheckoutError::ReservationMissing(order.id.clone()))?;

        // 3. Replay on an already paid order
        if order.status == OrderStatus::Paid {
            let reservation = match self.inventory.get_reservation(&reservation_id, cancel).await {
                Ok(reservation) => Some(reservation),
                Err(e) => {
                    tracing::debug!(%reservation_id, error = %e, "lookup failed on paid order");
                    None
                }
            };
            return Ok(response(
                &order,
                &reservation_id,
                reservation.as_ref(),
                Some(ALREADY_PAID),
            ));
        }

        // 4. Gate on the order state
        if order.status != OrderStatus::PendingPayment {
            return Err(CheckoutError::InvalidOrderStatus {
                order_id: order.id.clone(),
                status: order.status,
            });
        }

        // 5. Commit the reservation
        let reservation = self.commit_reservation(&cmd, &reservation_id, cancel).await?;

        // 6. Move the order to Paid
        let mut transition =
            OrderTransition::new(order.id.clone(), OrderStatus::Paid, self.clock.now())
                .expecting(OrderStatus::PendingPayment)
                .metadata(SOURCE_KEY, COMMIT_SOURCE)
                .metadata(RESERVATION_ID_KEY, reservation_id.as_str());
        if let Some(actor_id) = &cmd.actor_id {
            transition = transition.metadata(ACTOR_ID_KEY, actor_id.as_str());
        }
        if let Some(payment_intent_id) = &cmd.payment_intent_id {
            transition = transition.metadata(PAYMENT_INTENT_ID_KEY, payment_intent_id.as_str());
        }
        if let Some(code) = order.promotion_code() {
            transition = transition.metadata(PROMOTION_CODE_KEY, code);
        }

        let paid = match with_cancel(cancel, self.orders.transition_status(transition)).await? {
            Ok(order) => order,
            Err(e) if matches!(e.kind(), ErrorKind::Conflict | ErrorKind::InvalidState) => {
                let current = self.load_order(&order.id, cancel).await?;
                if current.status == OrderStatus::Paid {
                    tracing::info!(order_id = %current.id, "order paid concurrently");
                    return Ok(response(
                        &current,
                        &reservation_id,
                        Some(&reservation),
                        Some(ALREADY_TRANSITIONED),
                    ));
                }
                return Err(CheckoutError::OrderConflict {
                    order_id: current.id,
                    detail: format!("{e}; order is now {}", current.status),
                });
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            order_id = %paid.id,
            %reservation_id,
            actor_id = cmd.actor_id.as_deref().unwrap_or_default(),
            "checkout committed"
        );
        Ok(response(&paid, &reservation_id, Some(&reservation), None))
    }

    /// Commits the reservation, reconciling when it is already committed.
    async fn commit_reservation(
        &self,
        cmd: &CommitCheckout,
        reservation_id: &ReservationId,
        cancel: &CancellationToken,
    ) -> Result<Reservation> {
        let mut commit = CommitReservation::new(reservation_id.clone(), cmd.order_ref.clone());
        if let Some(actor_id) = &cmd.actor_id {
            commit = commit.actor(actor_id.as_str());
        }

        let err = match self.inventory.commit_reservation(commit, cancel).await {
            Ok(reservation) => return Ok(reservation),
            Err(e) if e.is_invalid_state() => e,
            Err(e) => return Err(e.into()),
        };

        match self.inventory.get_reservation(reservation_id, cancel).await {
            Ok(current) if current.status == ReservationStatus::Committed => {
                tracing::warn!(%reservation_id, "reservation already committed, reconciling");
                Ok(current)
            }
            Ok(current) => Err(CheckoutError::InvalidReservationState {
                reservation_id: reservation_id.clone(),
                detail: format!("{err}; reservation is {}", current.status),
            }),
            Err(lookup) => {
                tracing::warn!(%reservation_id, error = %lookup, "reservation re-read failed");
                Err(CheckoutError::InvalidReservationState {
                    reservation_id: reservation_id.clone(),
                    detail: err.to_string(),
                })
            }
        }
    }

    pub(crate) async fn load_order(
        &self,
        order_id: &OrderId,
        cancel: &CancellationToken,
    ) -> Result<Order> {
        with_cancel(cancel, self.orders.get_order(order_id))
            .await??
            .ok_or_else(|| CheckoutError::OrderNotFound(order_id.clone()))
    }
}

fn response(
    order: &Order,
    reservation_id: &ReservationId,
    reservation: Option<&Reservation>,
    message: Option<&str>,
) -> CommitResponse {
    CommitResponse {
        order_ref: order.id.clone(),
        order_status: order.status,
        reservation_id: Some(reservation_id.clone()),
        reservation_status: reservation.map(|r| r.status),
        paid_at: order.paid_at,
        promotion_code: order.promotion_code().map(str::to_string),
        message: message.map(str::to_string),
    }
}
