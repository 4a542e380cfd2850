//! Periodic expiry sweeps.

use std::sync::Arc;
use std::time::Duration;

use domain::InventoryService;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::sweeper::{CleanupRequest, ExpirySweeper};
use crate::telemetry::CleanupMetrics;

/// Runs a default cleanup every `period` until `shutdown` is cancelled.
///
/// The first sweep happens one period after start. A sweep in flight when
/// `shutdown` fires is cancelled through the same token.
pub fn spawn_sweeper<I>(
    sweeper: Arc<ExpirySweeper<I>>,
    period: Duration,
    metrics: Arc<dyn CleanupMetrics>,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    I: InventoryService + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(period_secs = period.as_secs(), "expiry sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match sweeper.cleanup(CleanupRequest::default(), &shutdown).await {
                Ok(result) => {
                    metrics.record_result(&result);
                    if result.checked_count > 0 {
                        tracing::info!(
                            checked = result.checked_count,
                            released = result.released_count,
                            skipped = result.skipped_count,
                            "scheduled sweep finished"
                        );
                    }
                }
                Err(e) => {
                    metrics.record_failure(e.code());
                    tracing::warn!(error = %e, "scheduled sweep failed");
                }
            }
        }

        tracing::info!("expiry sweeper stopped");
    })
}
