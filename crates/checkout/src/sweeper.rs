//! Bounded cleanup of expired holds.

use domain::{InventoryService, ReleaseExpiredReservations, ReleaseExpiredResult};
use tokio_util::sync::CancellationToken;

use crate::commands::non_blank;
use crate::error::{CheckoutError, Result};

pub const DEFAULT_CLEANUP_ACTOR: &str = "system:maintenance";
pub const DEFAULT_CLEANUP_REASON: &str = "expired_maintenance_cleanup";

/// Attribution stamped on reservations the sweeper expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    pub default_actor_id: String,
    pub default_reason: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            default_actor_id: DEFAULT_CLEANUP_ACTOR.to_string(),
            default_reason: DEFAULT_CLEANUP_REASON.to_string(),
        }
    }
}

impl SweeperConfig {
    /// Replaces blank values with the defaults.
    pub fn normalized(self) -> Self {
        Self {
            default_actor_id: non_blank(self.default_actor_id)
                .unwrap_or_else(|| DEFAULT_CLEANUP_ACTOR.to_string()),
            default_reason: non_blank(self.default_reason)
                .unwrap_or_else(|| DEFAULT_CLEANUP_REASON.to_string()),
        }
    }
}

/// One cleanup invocation. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupRequest {
    /// Must not be negative; unset or zero uses the engine's default batch.
    pub limit: Option<i64>,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
}

/// Expires held reservations whose time has run out.
///
/// Concurrent runs with each other and with live commits are safe: every
/// reservation is settled by a conditional transition, so a candidate that
/// another caller reaches first is reported as already released.
pub struct ExpirySweeper<I> {
    inventory: I,
    config: SweeperConfig,
}

impl<I: InventoryService> ExpirySweeper<I> {
    pub fn new(inventory: I) -> Self {
        Self::with_config(inventory, SweeperConfig::default())
    }

    pub fn with_config(inventory: I, config: SweeperConfig) -> Self {
        Self {
            inventory,
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Runs one sweep and returns the engine's result as is.
    #[tracing::instrument(skip(self, request, cancel), fields(limit = ?request.limit))]
    pub async fn cleanup(
        &self,
        request: CleanupRequest,
        cancel: &CancellationToken,
    ) -> Result<ReleaseExpiredResult> {
        let limit = match request.limit {
            None => 0,
            Some(limit) => usize::try_from(limit).map_err(|_| {
                CheckoutError::InvalidInput("limit must be zero or positive".into())
            })?,
        };
        let actor_id = request
            .actor_id
            .and_then(non_blank)
            .unwrap_or_else(|| self.config.default_actor_id.clone());
        let reason = request
            .reason
            .and_then(non_blank)
            .unwrap_or_else(|| self.config.default_reason.clone());

        let result = self
            .inventory
            .release_expired_reservations(
                ReleaseExpiredReservations::new(limit, actor_id, reason),
                cancel,
            )
            .await?;
        Ok(result)
    }
}
