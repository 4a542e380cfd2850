//! Integration tests for the API server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use api::AppState;
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{CleanupRun, RecordingMetrics};
use chrono::Utc;
use common::ReservationId;
use domain::{
    CommitReservation, InventoryError, InventoryService, ReleaseExpiredReservations,
    ReleaseExpiredResult, ReleaseReservation, ReservationEngine, ReserveStocks,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryStore, Order, OrderStatus, OrderStore, Reservation, ReservationStore, StockLevel};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn app(state: AppState) -> Router {
    api::create_app(Arc::new(state), get_metrics_handle())
}

/// Router over in-memory stores, with `SKU-1` and `SKU-2` stocked at 10.
async fn setup() -> (Router, InMemoryStore, RecordingMetrics) {
    let store = InMemoryStore::new();
    for sku in ["SKU-1", "SKU-2"] {
        store
            .put_stock(StockLevel::new(sku, 10, Utc::now()))
            .await
            .unwrap();
    }
    let metrics = RecordingMetrics::new();
    let state = AppState::builder()
        .inventory(ReservationEngine::new(store.clone()))
        .orders(store.clone())
        .metrics(metrics.clone())
        .build();
    (app(state), store, metrics)
}

async fn send(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Body::from(body.to_string())).await
}

fn reserve_body(order: &str, qty: i64) -> Value {
    json!({
        "orderId": order,
        "userRef": "/users/u_1",
        "lines": [
            { "productRef": "/products/p_1", "sku": "SKU-1", "qty": qty },
            { "productId": "p_2", "sku": "SKU-2", "quantity": 1 }
        ],
        "ttlSec": 900
    })
}

async fn reserve(app: &Router, order: &str, qty: i64) -> String {
    let (status, body) = post(app, "/internal/checkout/reserve-stock", reserve_body(order, qty)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["reservationId"].as_str().unwrap().to_string()
}

/// Inventory double for the maintenance endpoint.
#[derive(Clone, Default)]
struct SweepStub {
    sweeps: Arc<AtomicUsize>,
}

impl SweepStub {
    fn sweeps(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryService for SweepStub {
    async fn reserve_stocks(
        &self,
        _cmd: ReserveStocks,
        _cancel: &CancellationToken,
    ) -> domain::Result<Reservation> {
        Err(InventoryError::InvalidInput("not supported".into()))
    }

    async fn commit_reservation(
        &self,
        _cmd: CommitReservation,
        _cancel: &CancellationToken,
    ) -> domain::Result<Reservation> {
        Err(InventoryError::InvalidInput("not supported".into()))
    }

    async fn release_reservation(
        &self,
        _cmd: ReleaseReservation,
        _cancel: &CancellationToken,
    ) -> domain::Result<Reservation> {
        Err(InventoryError::InvalidInput("not supported".into()))
    }

    async fn get_reservation(
        &self,
        id: &ReservationId,
        _cancel: &CancellationToken,
    ) -> domain::Result<Reservation> {
        Err(InventoryError::NotFound(id.clone()))
    }

    async fn release_expired_reservations(
        &self,
        cmd: ReleaseExpiredReservations,
        _cancel: &CancellationToken,
    ) -> domain::Result<ReleaseExpiredResult> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        assert_eq!(cmd.limit, 0);
        assert_eq!(cmd.actor_id, "system:maintenance");
        assert_eq!(cmd.reason, "expired_maintenance_cleanup");

        let ids = |prefix: &str, n: usize| -> Vec<ReservationId> {
            (0..n)
                .map(|i| ReservationId::new(format!("{prefix}_{i}")))
                .collect()
        };
        Ok(ReleaseExpiredResult {
            checked_count: 5,
            released_count: 3,
            already_released_count: 1,
            not_found_count: 1,
            skipped_count: 2,
            reservation_ids: ids("res_released", 3),
            already_released_ids: ids("res_settled", 1),
            not_found_ids: ids("res_gone", 1),
            skipped_ids: ids("res_skipped", 2),
            skus: vec!["SKU-1".into(), "SKU-2".into()],
        })
    }
}

fn maintenance_app() -> (Router, SweepStub, RecordingMetrics) {
    let stub = SweepStub::default();
    let metrics = RecordingMetrics::new();
    let state = AppState::builder()
        .inventory(stub.clone())
        .metrics(metrics.clone())
        .build();
    (app(state), stub, metrics)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, _) = setup().await;

    let (status, body) = send(&app, "GET", "/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["services"]["checkout"], true);
}

#[tokio::test]
async fn test_missing_services_answer_503() {
    let app = app(AppState::builder().build());

    let (status, body) = post(&app, "/internal/checkout/commit", json!({ "orderId": "ord_1" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "service_unavailable");

    let (status, _) = send(&app, "GET", "/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_reserve_stock() {
    let (app, store, metrics) = setup().await;

    let (status, body) = post(
        &app,
        "/internal/checkout/reserve-stock",
        reserve_body(" ord_1 ", 3),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "held");
    assert_eq!(body["orderRef"], "ord_1");
    assert_eq!(body["userRef"], "u_1");
    assert_eq!(body["ttlSec"], 900);
    assert_eq!(
        body["lines"],
        json!([
            { "productRef": "p_1", "sku": "SKU-1", "quantity": 3 },
            { "productRef": "p_2", "sku": "SKU-2", "quantity": 1 }
        ])
    );
    assert!(body["expiresAt"].as_str().unwrap().ends_with('Z'));

    assert_eq!(store.stock("SKU-1").await.unwrap().reserved, 3);
    assert_eq!(metrics.created().len(), 1);
    assert_eq!(metrics.created()[0].1, 2);
}

#[tokio::test]
async fn test_reserve_with_empty_lines_mutates_nothing() {
    let (app, store, metrics) = setup().await;

    let (status, body) = post(
        &app,
        "/internal/checkout/reserve-stock",
        json!({ "orderId": "ord_1", "userRef": "u_1", "lines": [], "ttlSec": 900 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert_eq!(store.reservation_count().await, 0);
    assert_eq!(store.stock("SKU-1").await.unwrap().reserved, 0);
    assert_eq!(metrics.reserve_failures(), vec!["invalid_request".to_string()]);
    assert!(metrics.created().is_empty());
}

#[tokio::test]
async fn test_reserve_with_huge_ttl_is_400() {
    let (app, store, metrics) = setup().await;
    let mut body = reserve_body("ord_1", 2);
    body["ttlSec"] = json!(1_000_000_000_000_000i64);

    let (status, body) = post(&app, "/internal/checkout/reserve-stock", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert_eq!(store.reservation_count().await, 0);
    assert_eq!(store.stock("SKU-1").await.unwrap().reserved, 0);
    assert_eq!(metrics.reserve_failures(), vec!["invalid_request".to_string()]);
}

#[tokio::test]
async fn test_reserve_insufficient_stock_is_409() {
    let (app, store, metrics) = setup().await;

    let (status, body) = post(
        &app,
        "/internal/checkout/reserve-stock",
        reserve_body("ord_1", 11),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "insufficient_stock");
    assert_eq!(store.stock("SKU-2").await.unwrap().reserved, 0);
    assert_eq!(metrics.reserve_failures(), vec!["insufficient_stock".to_string()]);
}

#[tokio::test]
async fn test_reserve_rejects_malformed_json() {
    let (app, _, metrics) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/internal/checkout/reserve-stock",
        Body::from("{\"orderId\":"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_json");
    assert_eq!(metrics.reserve_failures(), vec!["invalid_json".to_string()]);
}

#[tokio::test]
async fn test_oversize_bodies_are_413() {
    let (app, store, _) = setup().await;

    let mut body = reserve_body("ord_1", 1);
    body["reason"] = json!("x".repeat(17 * 1024));
    let (status, json) = post(&app, "/internal/checkout/reserve-stock", body).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["error"]["code"], "payload_too_large");
    assert_eq!(store.reservation_count().await, 0);

    // 8 KiB fits the reserve cap but not the commit cap.
    let mut body = reserve_body("ord_1", 1);
    body["reason"] = json!("x".repeat(8 * 1024));
    let (status, _) = post(&app, "/internal/checkout/reserve-stock", body).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "/internal/checkout/commit",
        json!({ "orderId": "ord_1", "actorId": "x".repeat(8 * 1024) }),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_commit_marks_order_paid() {
    let (app, store, _) = setup().await;
    store
        .insert_order(
            Order::new("ord_1", OrderStatus::PendingPayment, Utc::now()).with_promotion("SPRING"),
        )
        .await
        .unwrap();
    let reservation_id = reserve(&app, "ord_1", 2).await;

    let (status, body) = post(
        &app,
        "/internal/checkout/commit",
        json!({
            "orderId": "/orders/ord_1",
            "reservationId": reservation_id,
            "paymentIntentId": "pi_1"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["orderId"], "ord_1");
    assert_eq!(body["orderStatus"], "paid");
    assert_eq!(body["reservationStatus"], "committed");
    assert_eq!(body["promotionCode"], "SPRING");
    assert!(body["paidAt"].is_string());

    let stock = store.stock("SKU-1").await.unwrap();
    assert_eq!((stock.on_hand, stock.reserved), (8, 0));

    // A webhook replay is an idempotent success.
    let (status, body) = post(
        &app,
        "/internal/checkout/commit",
        json!({ "orderId": "ord_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderStatus"], "paid");
    assert_eq!(body["reservationStatus"], "committed");
    assert!(body["message"].is_string());
    assert_eq!(store.stock("SKU-1").await.unwrap().on_hand, 8);
}

#[tokio::test]
async fn test_commit_errors_map_to_status_codes() {
    let (app, store, _) = setup().await;

    let (status, body) = post(&app, "/internal/checkout/commit", json!({ "orderId": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "orderId is required");

    let (status, body) = post(&app, "/internal/checkout/commit", json!({ "orderId": "ord_x" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "order_not_found");

    store
        .insert_order(Order::new("ord_1", OrderStatus::PendingPayment, Utc::now()))
        .await
        .unwrap();
    let (status, body) = post(&app, "/internal/checkout/commit", json!({ "orderId": "ord_1" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "reservation_missing");

    store
        .insert_order(Order::new("ord_2", OrderStatus::Canceled, Utc::now()))
        .await
        .unwrap();
    let (status, body) = post(
        &app,
        "/internal/checkout/commit",
        json!({ "orderId": "ord_2", "reservationId": "res_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_order_status");
}

#[tokio::test]
async fn test_release_returns_stock() {
    let (app, store, _) = setup().await;
    let reservation_id = reserve(&app, "ord_1", 4).await;
    assert_eq!(store.stock("SKU-1").await.unwrap().reserved, 4);

    let (status, body) = post(
        &app,
        "/internal/checkout/release",
        json!({ "reservationId": reservation_id }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "released");
    assert_eq!(body["reason"], "checkout_release");
    assert!(body["releasedAt"].is_string());
    assert_eq!(store.stock("SKU-1").await.unwrap().reserved, 0);

    // Releasing again leaves the reservation as it was.
    let (status, body) = post(
        &app,
        "/internal/checkout/release",
        json!({ "reservationId": reservation_id, "reason": "retry" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reason"], "checkout_release");

    let (status, _) = post(&app, "/internal/checkout/release", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_reservation() {
    let (app, _, _) = setup().await;
    let reservation_id = reserve(&app, "ord_1", 1).await;

    let uri = format!("/internal/checkout/reservations/{reservation_id}");
    let (status, body) = send(&app, "GET", &uri, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservationId"], reservation_id);
    assert_eq!(body["status"], "held");

    let (status, body) = send(
        &app,
        "GET",
        "/internal/checkout/reservations/res_missing",
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "reservation_not_found");
}

#[tokio::test]
async fn test_cleanup_rejects_negative_limit() {
    let (app, stub, metrics) = maintenance_app();

    let (status, body) = post(
        &app,
        "/internal/maintenance/cleanup-reservations",
        json!({ "limit": -1 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert_eq!(stub.sweeps(), 0);
    assert!(metrics.cleanup_runs().is_empty());
    assert!(metrics.cleanup_failures().is_empty());
}

#[tokio::test]
async fn test_cleanup_with_defaults() {
    let (app, stub, metrics) = maintenance_app();

    let (status, body) = send(
        &app,
        "POST",
        "/internal/maintenance/cleanup-reservations",
        Body::empty(),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(stub.sweeps(), 1);
    assert_eq!(body["checkedCount"], 5);
    assert_eq!(body["releasedCount"], 3);
    assert_eq!(body["alreadyReleasedCount"], 1);
    assert_eq!(body["notFoundCount"], 1);
    assert_eq!(body["skippedCount"], 2);
    assert_eq!(body["reservationIds"].as_array().unwrap().len(), 3);
    assert_eq!(body["alreadyReleasedIds"].as_array().unwrap().len(), 1);
    assert_eq!(body["skippedIds"].as_array().unwrap().len(), 2);
    assert_eq!(body["skus"], json!(["SKU-1", "SKU-2"]));

    assert_eq!(
        metrics.cleanup_runs(),
        vec![CleanupRun {
            checked: 5,
            released: 3,
            already_released: 1,
            skipped: 2,
        }]
    );
    assert!(metrics.cleanup_failures().is_empty());
}

#[tokio::test]
async fn test_cleanup_leaves_live_holds() {
    let (app, store, metrics) = setup().await;
    let reservation_id = reserve(&app, "ord_1", 2).await;

    // Nothing is overdue yet.
    let (status, body) = post(
        &app,
        "/internal/maintenance/cleanup-reservations",
        json!({ "limit": 10 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkedCount"], 0);
    assert_eq!(body["reservationIds"], json!([]));
    assert_eq!(store.stock("SKU-1").await.unwrap().reserved, 2);
    assert_eq!(metrics.cleanup_runs().len(), 1);

    let uri = format!("/internal/checkout/reservations/{reservation_id}");
    let (_, body) = send(&app, "GET", &uri, Body::empty()).await;
    assert_eq!(body["status"], "held");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _, _) = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}
