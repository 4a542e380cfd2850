//! Shared application state and its builder.

use std::sync::Arc;

use checkout::{
    CheckoutCoordinator, CleanupMetrics, ExpirySweeper, NoopMetrics, ReservationMetrics,
};
use domain::InventoryService;
use store::OrderStore;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::error::ApiError;

pub type DynInventory = Arc<dyn InventoryService>;
pub type DynOrders = Arc<dyn OrderStore>;
pub type Checkout = CheckoutCoordinator<DynInventory, DynOrders>;
pub type Sweeper = ExpirySweeper<DynInventory>;

/// Shared application state accessible from all handlers.
///
/// Services are optional so a process can run with a partial wiring; a
/// handler whose service is missing answers 503.
pub struct AppState {
    inventory: Option<DynInventory>,
    checkout: Option<Arc<Checkout>>,
    sweeper: Option<Arc<Sweeper>>,
    reservation_metrics: Arc<dyn ReservationMetrics>,
    cleanup_metrics: Arc<dyn CleanupMetrics>,
    config: ServiceConfig,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    pub fn inventory(&self) -> Result<&DynInventory, ApiError> {
        self.inventory
            .as_ref()
            .ok_or(ApiError::ServiceUnavailable("inventory"))
    }

    pub fn checkout(&self) -> Result<&Arc<Checkout>, ApiError> {
        self.checkout
            .as_ref()
            .ok_or(ApiError::ServiceUnavailable("checkout"))
    }

    pub fn sweeper(&self) -> Result<&Arc<Sweeper>, ApiError> {
        self.sweeper
            .as_ref()
            .ok_or(ApiError::ServiceUnavailable("inventory"))
    }

    pub fn reservation_metrics(&self) -> &dyn ReservationMetrics {
        self.reservation_metrics.as_ref()
    }

    pub fn cleanup_metrics(&self) -> &Arc<dyn CleanupMetrics> {
        &self.cleanup_metrics
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Token for one request. Cancelled with the process-wide token.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

/// Assembles an [`AppState`] from whichever services are available.
pub struct AppStateBuilder {
    inventory: Option<DynInventory>,
    orders: Option<DynOrders>,
    reservation_metrics: Arc<dyn ReservationMetrics>,
    cleanup_metrics: Arc<dyn CleanupMetrics>,
    config: ServiceConfig,
    shutdown: CancellationToken,
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self {
            inventory: None,
            orders: None,
            reservation_metrics: Arc::new(NoopMetrics),
            cleanup_metrics: Arc::new(NoopMetrics),
            config: ServiceConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }
}

impl AppStateBuilder {
    pub fn inventory(mut self, inventory: impl InventoryService + 'static) -> Self {
        self.inventory = Some(Arc::new(inventory));
        self
    }

    pub fn orders(mut self, orders: impl OrderStore + 'static) -> Self {
        self.orders = Some(Arc::new(orders));
        self
    }

    /// Uses one sink for both reserve and cleanup metrics.
    pub fn metrics<M>(self, metrics: M) -> Self
    where
        M: ReservationMetrics + CleanupMetrics + Clone + 'static,
    {
        self.reservation_metrics(Arc::new(metrics.clone()))
            .cleanup_metrics(Arc::new(metrics))
    }

    pub fn reservation_metrics(mut self, metrics: Arc<dyn ReservationMetrics>) -> Self {
        self.reservation_metrics = metrics;
        self
    }

    pub fn cleanup_metrics(mut self, metrics: Arc<dyn CleanupMetrics>) -> Self {
        self.cleanup_metrics = metrics;
        self
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> AppState {
        let config = self.config.normalized();
        let checkout = match (&self.inventory, self.orders) {
            (Some(inventory), Some(orders)) => {
                Some(Arc::new(CheckoutCoordinator::new(inventory.clone(), orders)))
            }
            _ => None,
        };
        let sweeper = self.inventory.as_ref().map(|inventory| {
            Arc::new(ExpirySweeper::with_config(inventory.clone(), config.sweeper()))
        });

        AppState {
            inventory: self.inventory,
            checkout,
            sweeper,
            reservation_metrics: self.reservation_metrics,
            cleanup_metrics: self.cleanup_metrics,
            config,
            shutdown: self.shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use store::InMemoryStore;

    use super::*;

    #[test]
    fn missing_services_are_unavailable() {
        let state = AppState::builder().build();
        assert!(matches!(
            state.inventory(),
            Err(ApiError::ServiceUnavailable(_))
        ));
        assert!(state.checkout().is_err());
        assert!(state.sweeper().is_err());
    }

    #[test]
    fn checkout_needs_both_stores() {
        let store = InMemoryStore::new();
        let state = AppState::builder()
            .inventory(domain::ReservationEngine::new(store.clone()))
            .build();
        assert!(state.sweeper().is_ok());
        assert!(state.checkout().is_err());

        let state = AppState::builder()
            .inventory(domain::ReservationEngine::new(store.clone()))
            .orders(store)
            .build();
        assert!(state.checkout().is_ok());
    }

    #[test]
    fn request_tokens_follow_shutdown() {
        let shutdown = CancellationToken::new();
        let state = AppState::builder().shutdown(shutdown.clone()).build();
        let token = state.request_token();
        shutdown.cancel();
        assert!(token.is_cancelled());
    }
}
