//! Internal checkout endpoints: reserve, commit, release and reservation reads.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, SecondsFormat, Utc};
use checkout::{CommitCheckout, CommitResponse, ReleaseCheckout, ReleaseResponse};
use common::ReservationId;
use domain::{InventoryError, InventoryService, ReserveStocks};
use serde::{Deserialize, Serialize};
use store::{Reservation, ReservationLine};

use crate::error::ApiError;
use crate::extract::LimitedBody;
use crate::state::AppState;

const USER_PREFIX: &str = "/users/";
const PRODUCT_PREFIX: &str = "/products/";
const ORDER_PREFIX: &str = "/orders/";

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReserveStockRequest {
    pub order_id: String,
    pub user_ref: String,
    pub user_id: String,
    pub lines: Vec<ReserveLineRequest>,
    pub ttl_sec: i64,
    pub idempotency_key: String,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReserveLineRequest {
    pub product_ref: String,
    pub product_id: String,
    pub sku: String,
    pub qty: i64,
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitRequest {
    pub order_id: String,
    pub reservation_id: String,
    pub actor_id: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseRequest {
    pub reservation_id: String,
    pub order_id: String,
    pub actor_id: String,
    pub reason: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub reservation_id: String,
    pub status: String,
    pub order_ref: String,
    pub user_ref: String,
    pub expires_at: String,
    pub created_at: String,
    pub ttl_sec: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<String>,
    pub lines: Vec<LineView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineView {
    pub product_ref: String,
    pub sku: String,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitView {
    pub order_id: String,
    pub order_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseView {
    pub reservation_id: String,
    pub status: String,
    pub order_ref: String,
    pub user_ref: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub lines: Vec<LineView>,
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn line_views(lines: &[ReservationLine]) -> Vec<LineView> {
    lines
        .iter()
        .map(|line| LineView {
            product_ref: line.product_ref.trim().to_string(),
            sku: line.sku.trim().to_string(),
            quantity: line.quantity,
        })
        .collect()
}

impl From<&Reservation> for ReservationView {
    fn from(r: &Reservation) -> Self {
        Self {
            reservation_id: r.id.to_string(),
            status: r.status.to_string(),
            order_ref: r.order_ref.to_string(),
            user_ref: r.user_ref.clone(),
            expires_at: format_time(r.expires_at),
            created_at: format_time(r.created_at),
            ttl_sec: r.ttl().num_seconds().max(0),
            committed_at: r.committed_at.map(format_time),
            released_at: r.released_at.map(format_time),
            lines: line_views(&r.lines),
        }
    }
}

impl From<CommitResponse> for CommitView {
    fn from(r: CommitResponse) -> Self {
        Self {
            order_id: r.order_ref.to_string(),
            order_status: r.order_status.to_string(),
            reservation_id: r.reservation_id.map(|id| id.to_string()),
            reservation_status: r.reservation_status.map(|s| s.to_string()),
            paid_at: r.paid_at.map(format_time),
            promotion_code: r.promotion_code,
            message: r.message,
        }
    }
}

impl From<ReleaseResponse> for ReleaseView {
    fn from(r: ReleaseResponse) -> Self {
        let reservation = r.reservation;
        Self {
            reservation_id: reservation.id.to_string(),
            status: reservation.status.to_string(),
            order_ref: reservation.order_ref.to_string(),
            user_ref: reservation.user_ref.clone(),
            reason: reservation
                .release_reason
                .clone()
                .unwrap_or_else(|| reservation.reason.clone()),
            released_at: reservation.released_at.map(format_time),
            promotion_code: r.promotion_code,
            message: r.message,
            lines: line_views(&reservation.lines),
        }
    }
}

/// Trims `value` and drops a leading `prefix`.
fn strip_ref(value: &str, prefix: &str) -> String {
    let trimmed = value.trim();
    trimmed
        .strip_prefix(prefix)
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Turns the wire request into a command.
///
/// `userId` wins over `userRef` and `productId` over `productRef`. `qty`
/// wins over `quantity` only when it is positive.
fn build_reserve_command(req: ReserveStockRequest) -> Result<ReserveStocks, ApiError> {
    let order_id = strip_ref(&req.order_id, ORDER_PREFIX);
    if order_id.is_empty() {
        return Err(ApiError::InvalidRequest("orderId is required".into()));
    }

    let user_ref = match req.user_id.trim() {
        "" => strip_ref(&req.user_ref, USER_PREFIX),
        user_id => user_id.to_string(),
    };
    if user_ref.is_empty() {
        return Err(ApiError::InvalidRequest("userRef is required".into()));
    }

    if req.lines.is_empty() {
        return Err(ApiError::InvalidRequest(
            "lines must contain at least one entry".into(),
        ));
    }
    if req.ttl_sec <= 0 {
        return Err(ApiError::InvalidRequest("ttlSec must be positive".into()));
    }
    let ttl = chrono::Duration::try_seconds(req.ttl_sec)
        .ok_or_else(|| ApiError::InvalidRequest(format!("ttlSec {} is invalid", req.ttl_sec)))?;

    let mut lines = Vec::with_capacity(req.lines.len());
    for (idx, line) in req.lines.iter().enumerate() {
        let sku = line.sku.trim();
        if sku.is_empty() {
            return Err(ApiError::InvalidRequest(format!("lines[{idx}].sku is required")));
        }
        let product_ref = match line.product_id.trim() {
            "" => strip_ref(&line.product_ref, PRODUCT_PREFIX),
            product_id => product_id.to_string(),
        };
        if product_ref.is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "lines[{idx}].productRef is required"
            )));
        }
        let quantity = if line.qty > 0 { line.qty } else { line.quantity };
        if quantity <= 0 {
            return Err(ApiError::InvalidRequest(format!(
                "lines[{idx}].quantity must be positive"
            )));
        }
        let quantity = u32::try_from(quantity).map_err(|_| {
            ApiError::InvalidRequest(format!("lines[{idx}].quantity is too large"))
        })?;
        lines.push(ReservationLine::new(product_ref, sku, quantity));
    }

    let mut cmd = ReserveStocks::new(order_id, user_ref, lines, ttl)
        .idempotency_key(req.idempotency_key.trim());
    if !req.reason.trim().is_empty() {
        cmd = cmd.reason(req.reason.trim());
    }
    Ok(cmd)
}

// -- Handlers --

/// POST /internal/checkout/reserve-stock: hold stock for an order.
#[tracing::instrument(skip(state, body))]
pub async fn reserve_stock(
    State(state): State<Arc<AppState>>,
    body: Result<LimitedBody, ApiError>,
) -> Result<Json<ReservationView>, ApiError> {
    let metrics = state.reservation_metrics();
    let result = async {
        let inventory = state.inventory()?;
        let req: ReserveStockRequest = body?.json()?;
        let cmd = build_reserve_command(req)?;
        let ttl = cmd.ttl;
        let reservation = inventory
            .reserve_stocks(cmd, &state.request_token())
            .await?;
        Ok::<_, ApiError>((reservation, ttl))
    }
    .await;

    match result {
        Ok((reservation, ttl)) => {
            metrics.record_created(
                ttl.to_std().unwrap_or_default(),
                reservation.lines.len(),
            );
            tracing::info!(
                reservation_id = %reservation.id,
                order_id = %reservation.order_ref,
                user_ref = %reservation.user_ref,
                line_count = reservation.lines.len(),
                ttl_sec = ttl.num_seconds(),
                "checkout reserve stock created"
            );
            Ok(Json(ReservationView::from(&reservation)))
        }
        Err(e) => {
            metrics.record_failure(reserve_failure_reason(&e));
            Err(e)
        }
    }
}

fn reserve_failure_reason(err: &ApiError) -> &'static str {
    match err {
        ApiError::Inventory(InventoryError::Store(_)) => "reservation_error",
        other => other.code(),
    }
}

/// POST /internal/checkout/commit: commit the reservation and mark the order paid.
#[tracing::instrument(skip(state, body))]
pub async fn commit(
    State(state): State<Arc<AppState>>,
    body: Result<LimitedBody, ApiError>,
) -> Result<Json<CommitView>, ApiError> {
    let checkout = state.checkout()?;
    let req: CommitRequest = body?.json()?;

    let order_id = strip_ref(&req.order_id, ORDER_PREFIX);
    if order_id.is_empty() {
        return Err(ApiError::InvalidRequest("orderId is required".into()));
    }
    let cmd = CommitCheckout::new(order_id)
        .reservation(req.reservation_id.trim())
        .actor(req.actor_id)
        .payment_intent(req.payment_intent_id);

    let response = checkout
        .commit_checkout(cmd, &state.request_token())
        .await?;
    Ok(Json(CommitView::from(response)))
}

/// POST /internal/checkout/release: release the hold for an abandoned checkout.
#[tracing::instrument(skip(state, body))]
pub async fn release(
    State(state): State<Arc<AppState>>,
    body: Result<LimitedBody, ApiError>,
) -> Result<Json<ReleaseView>, ApiError> {
    let checkout = state.checkout()?;
    let req: ReleaseRequest = body?.json()?;

    let cmd = ReleaseCheckout {
        reservation_id: Some(ReservationId::new(req.reservation_id.trim()))
            .filter(|id| !id.is_blank()),
        order_ref: Some(strip_ref(&req.order_id, ORDER_PREFIX))
            .filter(|id| !id.is_empty())
            .map(Into::into),
        ..ReleaseCheckout::default()
    }
    .actor(req.actor_id)
    .reason(req.reason);

    let response = checkout
        .release_checkout(cmd, &state.request_token())
        .await?;
    Ok(Json(ReleaseView::from(response)))
}

/// GET /internal/checkout/reservations/{id}: read one reservation.
#[tracing::instrument(skip(state))]
pub async fn get_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ReservationView>, ApiError> {
    let inventory = state.inventory()?;
    let id = ReservationId::new(id.trim());
    if id.is_blank() {
        return Err(ApiError::InvalidRequest("reservation id is required".into()));
    }

    match inventory.get_reservation(&id, &state.request_token()).await {
        Ok(reservation) => Ok(Json(ReservationView::from(&reservation))),
        Err(InventoryError::NotFound(id)) => Err(ApiError::NotFound {
            code: "reservation_not_found",
            message: format!("reservation {id} not found"),
        }),
        Err(e) => Err(e.into()),
    }
}
