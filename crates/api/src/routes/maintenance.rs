//! Maintenance endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use checkout::{CheckoutError, CleanupRequest};
use common::ReservationId;
use domain::{InventoryError, ReleaseExpiredResult};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::LimitedBody;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupReservationsRequest {
    pub limit: Option<i64>,
    pub reason: String,
    pub actor_id: String,
}

/// Counts and ids of one cleanup run. Id lists are always present, empty
/// or not.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReservationsResponse {
    pub checked_count: usize,
    pub released_count: usize,
    pub already_released_count: usize,
    pub not_found_count: usize,
    pub skipped_count: usize,
    pub reservation_ids: Vec<String>,
    pub already_released_ids: Vec<String>,
    pub not_found_ids: Vec<String>,
    pub skipped_ids: Vec<String>,
    pub skus: Vec<String>,
}

fn ids(ids: Vec<ReservationId>) -> Vec<String> {
    ids.into_iter().map(|id| id.to_string()).collect()
}

impl From<ReleaseExpiredResult> for CleanupReservationsResponse {
    fn from(r: ReleaseExpiredResult) -> Self {
        Self {
            checked_count: r.checked_count,
            released_count: r.released_count,
            already_released_count: r.already_released_count,
            not_found_count: r.not_found_count,
            skipped_count: r.skipped_count,
            reservation_ids: ids(r.reservation_ids),
            already_released_ids: ids(r.already_released_ids),
            not_found_ids: ids(r.not_found_ids),
            skipped_ids: ids(r.skipped_ids),
            skus: r.skus,
        }
    }
}

/// Failure code reported to the cleanup metrics sink.
fn failure_code(err: &CheckoutError) -> &'static str {
    match err {
        CheckoutError::InvalidInput(_)
        | CheckoutError::Inventory(InventoryError::InvalidInput(_)) => "invalid_request",
        CheckoutError::Inventory(InventoryError::NotFound(_)) => "reservation_not_found",
        _ => "inventory_release_failed",
    }
}

/// POST /internal/maintenance/cleanup-reservations: expire overdue holds.
///
/// An empty body runs with the configured defaults.
#[tracing::instrument(skip(state, body))]
pub async fn cleanup_reservations(
    State(state): State<Arc<AppState>>,
    body: Result<LimitedBody, ApiError>,
) -> Result<Json<CleanupReservationsResponse>, ApiError> {
    let sweeper = state.sweeper()?;
    let req: CleanupReservationsRequest = body?.json_or_default()?;
    if req.limit.is_some_and(|limit| limit < 0) {
        return Err(ApiError::InvalidRequest("limit must be non-negative".into()));
    }

    let request = CleanupRequest {
        limit: req.limit,
        actor_id: Some(req.actor_id),
        reason: Some(req.reason),
    };
    let metrics = state.cleanup_metrics();
    match sweeper.cleanup(request, &state.request_token()).await {
        Ok(result) => {
            metrics.record_result(&result);
            tracing::info!(
                checked = result.checked_count,
                released = result.released_count,
                already_released = result.already_released_count,
                not_found = result.not_found_count,
                skipped = result.skipped_count,
                "maintenance cleanup completed"
            );
            Ok(Json(result.into()))
        }
        Err(e) => {
            metrics.record_failure(failure_code(&e));
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use store::StoreError;

    use super::*;

    #[test]
    fn failure_codes_follow_the_cause() {
        assert_eq!(
            failure_code(&CheckoutError::InvalidInput("bad".into())),
            "invalid_request"
        );
        assert_eq!(
            failure_code(&CheckoutError::Inventory(InventoryError::NotFound(
                ReservationId::new("res_1")
            ))),
            "reservation_not_found"
        );
        assert_eq!(
            failure_code(&CheckoutError::Inventory(InventoryError::Store(
                StoreError::Corrupt("bad lines column".into())
            ))),
            "inventory_release_failed"
        );
    }

    #[test]
    fn empty_result_serializes_empty_arrays() {
        let body = serde_json::to_value(CleanupReservationsResponse::from(
            ReleaseExpiredResult::new(0),
        ))
        .unwrap();
        assert_eq!(body["reservationIds"], serde_json::json!([]));
        assert_eq!(body["skippedIds"], serde_json::json!([]));
        assert_eq!(body["skus"], serde_json::json!([]));
        assert_eq!(body["checkedCount"], 0);
    }
}
