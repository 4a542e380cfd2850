//! Reservation lifecycle engine backed by a [`ReservationStore`].

use async_trait::async_trait;
use common::{Clock, ReservationId, SystemClock};
use store::{
    CreateOutcome, ExpiredQuery, NewReservation, Reservation, ReservationStatus, ReservationStore,
    ReservationTransition, StoreError, TransitionOutcome,
};
use tokio_util::sync::CancellationToken;

use crate::{
    CommitReservation, InventoryService, ReleaseExpiredReservations, ReleaseExpiredResult,
    ReleaseReservation, ReserveStocks,
    cancel::{Cancelled, with_cancel},
    error::{InventoryError, Result},
};

/// Bounds applied to expiry sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Used when a sweep asks for limit 0.
    pub default_sweep_limit: usize,
    /// Larger requested limits are clamped to this.
    pub max_sweep_limit: usize,
}

impl EngineConfig {
    pub const DEFAULT_SWEEP_LIMIT: usize = 100;
    pub const MAX_SWEEP_LIMIT: usize = 500;

    /// Replaces zero fields with the defaults.
    pub fn normalized(self) -> Self {
        let max_sweep_limit = if self.max_sweep_limit == 0 {
            Self::MAX_SWEEP_LIMIT
        } else {
            self.max_sweep_limit
        };
        let default_sweep_limit = if self.default_sweep_limit == 0 {
            Self::DEFAULT_SWEEP_LIMIT
        } else {
            self.default_sweep_limit
        };
        Self {
            default_sweep_limit: default_sweep_limit.min(max_sweep_limit),
            max_sweep_limit,
        }
    }

    /// The number of candidates a sweep asking for `requested` may scan.
    pub fn effective_limit(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_sweep_limit
        } else {
            requested.min(self.max_sweep_limit)
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_sweep_limit: Self::DEFAULT_SWEEP_LIMIT,
            max_sweep_limit: Self::MAX_SWEEP_LIMIT,
        }
    }
}

/// Enforces the reservation state machine on top of a store.
///
/// The engine holds no locks of its own; every state change is a single
/// guarded store transition, so concurrent callers race inside the store
/// and at most one of them wins.
pub struct ReservationEngine<S, C = SystemClock> {
    store: S,
    clock: C,
    config: EngineConfig,
}

impl<S: ReservationStore> ReservationEngine<S> {
    /// Creates an engine using the wall clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: ReservationStore, C: Clock> ReservationEngine<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config.normalized();
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    async fn load(&self, id: &ReservationId, cancel: &CancellationToken) -> Result<Reservation> {
        with_cancel(cancel, self.store.get_reservation(id))
            .await??
            .ok_or_else(|| InventoryError::NotFound(id.clone()))
    }

    async fn transition(
        &self,
        transition: ReservationTransition,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome> {
        Ok(with_cancel(cancel, self.store.transition_reservation(transition)).await??)
    }
}

#[async_trait]
impl<S, C> InventoryService for ReservationEngine<S, C>
where
    S: ReservationStore,
    C: Clock,
{
    #[tracing::instrument(skip(self, cmd, cancel), fields(order_id = %cmd.order_ref))]
    async fn reserve_stocks(
        &self,
        cmd: ReserveStocks,
        cancel: &CancellationToken,
    ) -> Result<Reservation> {
        let now = self.clock.now();
        let expires_at = match cmd.validate().and_then(|()| {
            now.checked_add_signed(cmd.ttl)
                .ok_or_else(|| InventoryError::InvalidInput("ttl is too large".into()))
        }) {
            Ok(expires_at) => expires_at,
            Err(e) => {
                metrics::counter!("inventory_reservations_total", "outcome" => "invalid_input")
                    .increment(1);
                return Err(e);
            }
        };

        let new = NewReservation {
            id: ReservationId::generate(),
            order_ref: cmd.order_ref,
            user_ref: cmd.user_ref.trim().to_string(),
            lines: cmd.lines,
            reason: cmd.reason,
            idempotency_key: cmd.idempotency_key,
            created_at: now,
            expires_at,
        };

        let outcome = match with_cancel(cancel, self.store.create_reservation(new)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let e = InventoryError::from(e);
                metrics::counter!("inventory_reservations_total", "outcome" => e.kind().as_str())
                    .increment(1);
                return Err(e);
            }
            Err(Cancelled) => return Err(InventoryError::Cancelled),
        };

        match outcome {
            CreateOutcome::Created(reservation) => {
                metrics::counter!("inventory_reservations_total", "outcome" => "created")
                    .increment(1);
                tracing::info!(
                    reservation_id = %reservation.id,
                    lines = reservation.lines.len(),
                    expires_at = %reservation.expires_at,
                    "reservation created"
                );
                Ok(reservation)
            }
            CreateOutcome::Replayed(reservation) => {
                metrics::counter!("inventory_reservations_total", "outcome" => "replayed")
                    .increment(1);
                tracing::info!(reservation_id = %reservation.id, "reservation replayed");
                Ok(reservation)
            }
        }
    }

    #[tracing::instrument(skip(self, cmd, cancel), fields(reservation_id = %cmd.reservation_id))]
    async fn commit_reservation(
        &self,
        cmd: CommitReservation,
        cancel: &CancellationToken,
    ) -> Result<Reservation> {
        cmd.validate()?;

        let current = self.load(&cmd.reservation_id, cancel).await?;
        if current.order_ref != cmd.order_ref {
            return Err(InventoryError::InvalidInput(format!(
                "reservation {} does not belong to order {}",
                cmd.reservation_id, cmd.order_ref
            )));
        }

        match current.status {
            ReservationStatus::Committed => return Ok(current),
            ReservationStatus::Released | ReservationStatus::Expired => {
                return Err(InventoryError::InvalidState {
                    reservation_id: current.id,
                    status: current.status,
                    action: "commit",
                });
            }
            ReservationStatus::Held => {}
        }

        let mut transition = ReservationTransition::from_held(
            cmd.reservation_id.clone(),
            ReservationStatus::Committed,
            self.clock.now(),
        );
        transition.actor_id = cmd.actor_id;

        match self.transition(transition, cancel).await? {
            TransitionOutcome::Applied(reservation) => {
                tracing::info!(
                    order_id = %reservation.order_ref,
                    actor_id = reservation.last_actor_id.as_deref().unwrap_or(""),
                    "reservation committed"
                );
                Ok(reservation)
            }
            TransitionOutcome::Unchanged(reservation)
                if reservation.status == ReservationStatus::Committed =>
            {
                Ok(reservation)
            }
            TransitionOutcome::Unchanged(reservation) => Err(InventoryError::InvalidState {
                reservation_id: reservation.id,
                status: reservation.status,
                action: "commit",
            }),
        }
    }

    #[tracing::instrument(skip(self, cmd, cancel), fields(reservation_id = %cmd.reservation_id))]
    async fn release_reservation(
        &self,
        cmd: ReleaseReservation,
        cancel: &CancellationToken,
    ) -> Result<Reservation> {
        cmd.validate()?;

        let current = self.load(&cmd.reservation_id, cancel).await?;
        match current.status {
            ReservationStatus::Released | ReservationStatus::Expired => return Ok(current),
            ReservationStatus::Committed => {
                return Err(InventoryError::InvalidState {
                    reservation_id: current.id,
                    status: current.status,
                    action: "release",
                });
            }
            ReservationStatus::Held => {}
        }

        let mut transition = ReservationTransition::from_held(
            cmd.reservation_id.clone(),
            ReservationStatus::Released,
            self.clock.now(),
        );
        transition.actor_id = cmd.actor_id;
        transition.reason = cmd.reason;

        match self.transition(transition, cancel).await? {
            TransitionOutcome::Applied(reservation) => {
                tracing::info!(
                    order_id = %reservation.order_ref,
                    reason = reservation.release_reason.as_deref().unwrap_or(""),
                    "reservation released"
                );
                Ok(reservation)
            }
            TransitionOutcome::Unchanged(reservation) if reservation.status.is_released() => {
                Ok(reservation)
            }
            TransitionOutcome::Unchanged(reservation) => Err(InventoryError::InvalidState {
                reservation_id: reservation.id,
                status: reservation.status,
                action: "release",
            }),
        }
    }

    async fn get_reservation(
        &self,
        id: &ReservationId,
        cancel: &CancellationToken,
    ) -> Result<Reservation> {
        self.load(id, cancel).await
    }

    #[tracing::instrument(skip(self, cmd, cancel), fields(limit = cmd.limit))]
    async fn release_expired_reservations(
        &self,
        cmd: ReleaseExpiredReservations,
        cancel: &CancellationToken,
    ) -> Result<ReleaseExpiredResult> {
        let limit = self.config.effective_limit(cmd.limit);
        let now = self.clock.now();

        let candidates =
            with_cancel(cancel, self.store.scan_expired(ExpiredQuery::at(now).limit(limit)))
                .await??;

        let mut result = ReleaseExpiredResult::new(candidates.len());
        let mut remaining = candidates.into_iter();

        while let Some(candidate) = remaining.next() {
            let transition = ReservationTransition::from_held(
                candidate.id.clone(),
                ReservationStatus::Expired,
                now,
            )
            .actor(cmd.actor_id.clone())
            .reason(cmd.reason.clone());

            match with_cancel(cancel, self.store.transition_reservation(transition)).await {
                Ok(Ok(TransitionOutcome::Applied(reservation))) => {
                    result.record_released(&reservation);
                }
                Ok(Ok(TransitionOutcome::Unchanged(current))) => {
                    tracing::debug!(
                        reservation_id = %current.id,
                        status = %current.status,
                        "expired reservation already settled"
                    );
                    result.record_already_released(current.id);
                }
                Ok(Err(StoreError::ReservationNotFound(id))) => {
                    result.record_not_found(id);
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        reservation_id = %candidate.id,
                        error = %e,
                        "failed to expire reservation; skipping"
                    );
                    result.record_skipped(candidate.id);
                }
                Err(Cancelled) => {
                    tracing::warn!(
                        reservation_id = %candidate.id,
                        "sweep cancelled; skipping remaining reservations"
                    );
                    result.record_skipped(candidate.id);
                    for rest in remaining.by_ref() {
                        result.record_skipped(rest.id);
                    }
                }
            }
        }

        metrics::counter!("inventory_expired_released_total").increment(result.released_count as u64);
        tracing::info!(
            checked = result.checked_count,
            released = result.released_count,
            already_released = result.already_released_count,
            not_found = result.not_found_count,
            skipped = result.skipped_count,
            "expired reservation sweep finished"
        );

        Ok(result)
    }
}
