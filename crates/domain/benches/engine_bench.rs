use chrono::{Duration, Utc};
use common::ManualClock;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    CommitReservation, InventoryService, ReleaseExpiredReservations, ReleaseReservation,
    ReservationEngine, ReserveStocks,
};
use store::{InMemoryStore, ReservationLine, ReservationStore, StockLevel};
use tokio_util::sync::CancellationToken;

fn lines() -> Vec<ReservationLine> {
    vec![
        ReservationLine::new("prod_1", "SKU-1", 1),
        ReservationLine::new("prod_2", "SKU-2", 2),
        ReservationLine::new("prod_3", "SKU-3", 1),
    ]
}

async fn seeded_engine(on_hand: i64) -> ReservationEngine<InMemoryStore, ManualClock> {
    let clock = ManualClock::new(Utc::now());
    let store = InMemoryStore::new();
    for sku in ["SKU-1", "SKU-2", "SKU-3"] {
        store
            .put_stock(StockLevel::new(sku, on_hand, clock.now()))
            .await
            .unwrap();
    }
    ReservationEngine::with_clock(store, clock)
}

fn bench_reserve_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = rt.block_on(seeded_engine(1_000));
    let token = CancellationToken::new();
    let mut n = 0u64;

    c.bench_function("engine/reserve_release", |b| {
        b.iter(|| {
            n += 1;
            rt.block_on(async {
                let reservation = engine
                    .reserve_stocks(
                        ReserveStocks::new(
                            format!("ord_{n}"),
                            "user_1",
                            lines(),
                            Duration::minutes(15),
                        ),
                        &token,
                    )
                    .await
                    .unwrap();
                engine
                    .release_reservation(ReleaseReservation::new(reservation.id), &token)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let token = CancellationToken::new();

    c.bench_function("engine/reserve_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let engine = seeded_engine(10).await;
                let reservation = engine
                    .reserve_stocks(
                        ReserveStocks::new("ord_1", "user_1", lines(), Duration::minutes(15)),
                        &token,
                    )
                    .await
                    .unwrap();
                engine
                    .commit_reservation(CommitReservation::new(reservation.id, "ord_1"), &token)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_sweep_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let token = CancellationToken::new();

    c.bench_function("engine/sweep_100_expired", |b| {
        b.iter(|| {
            rt.block_on(async {
                let clock = ManualClock::new(Utc::now());
                let store = InMemoryStore::new();
                for sku in ["SKU-1", "SKU-2", "SKU-3"] {
                    store
                        .put_stock(StockLevel::new(sku, 1_000, clock.now()))
                        .await
                        .unwrap();
                }
                let engine = ReservationEngine::with_clock(store, clock.clone());
                for i in 0..100 {
                    engine
                        .reserve_stocks(
                            ReserveStocks::new(
                                format!("ord_{i}"),
                                "user_1",
                                lines(),
                                Duration::minutes(15),
                            ),
                            &token,
                        )
                        .await
                        .unwrap();
                }
                clock.advance(Duration::minutes(16));
                engine
                    .release_expired_reservations(
                        ReleaseExpiredReservations::new(
                            0,
                            "system:maintenance",
                            "expired_maintenance_cleanup",
                        ),
                        &token,
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_release,
    bench_reserve_commit,
    bench_sweep_100,
);
criterion_main!(benches);
