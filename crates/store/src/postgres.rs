use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};

use crate::{
    ExpiredQuery, Metadata, NewReservation, Order, OrderId, OrderStatus, Promotion, Reservation,
    ReservationId, ReservationLine, ReservationStatus, Result, Stock, StockLevel, StoreError,
    reservation::{line_signature, quantities_by_sku},
    store::{
        CreateOutcome, OrderStore, OrderTransition, ReservationStore, ReservationTransition,
        TransitionOutcome, validate_new_reservation,
    },
};

const RESERVATION_COLUMNS: &str = "id, order_ref, user_ref, status, lines, reason, \
    idempotency_key, created_at, expires_at, updated_at, committed_at, released_at, \
    last_actor_id, release_reason";

const STOCK_COLUMNS: &str = "sku, product_ref, on_hand, reserved, safety_stock, updated_at";

const ORDER_COLUMNS: &str =
    "id, user_ref, status, metadata, promotion_code, paid_at, created_at, updated_at";

/// PostgreSQL-backed reservation and order store.
///
/// Reservation rows are locked with `SELECT ... FOR UPDATE` and stock rows
/// are always locked in sku order, so concurrent transitions never
/// deadlock. Creates for the same order are serialized with a
/// transaction-scoped advisory lock.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store over the new pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_reservation(row: &PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;
        let lines: serde_json::Value = row.try_get("lines")?;
        let lines: Vec<ReservationLine> = serde_json::from_value(lines)?;

        Ok(Reservation {
            id: ReservationId::new(row.try_get::<String, _>("id")?),
            order_ref: OrderId::new(row.try_get::<String, _>("order_ref")?),
            user_ref: row.try_get("user_ref")?,
            status: status
                .parse()
                .map_err(|e: crate::ParseStatusError| StoreError::Corrupt(e.to_string()))?,
            lines,
            reason: row.try_get("reason")?,
            idempotency_key: row.try_get("idempotency_key")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            updated_at: row.try_get("updated_at")?,
            committed_at: row.try_get("committed_at")?,
            released_at: row.try_get("released_at")?,
            last_actor_id: row.try_get("last_actor_id")?,
            release_reason: row.try_get("release_reason")?,
        })
    }

    fn row_to_stock(row: &PgRow) -> Result<Stock> {
        Ok(Stock {
            sku: row.try_get("sku")?,
            product_ref: row.try_get("product_ref")?,
            on_hand: row.try_get("on_hand")?,
            reserved: row.try_get("reserved")?,
            safety_stock: row.try_get("safety_stock")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let metadata: serde_json::Value = row.try_get("metadata")?;
        let metadata: Metadata = serde_json::from_value(metadata)?;
        let promotion_code: Option<String> = row.try_get("promotion_code")?;

        Ok(Order {
            id: OrderId::new(row.try_get::<String, _>("id")?),
            user_ref: row.try_get("user_ref")?,
            status: status
                .parse()
                .map_err(|e: crate::ParseStatusError| StoreError::Corrupt(e.to_string()))?,
            metadata,
            promotion: promotion_code.map(|code| Promotion { code }),
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Locks the stock rows for `skus` in sorted order.
    async fn lock_stocks(conn: &mut PgConnection, skus: &[String]) -> Result<HashMap<String, Stock>> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM inventory_stocks WHERE sku = ANY($1) ORDER BY sku FOR UPDATE"
        );
        let rows = sqlx::query(&sql).bind(skus).fetch_all(&mut *conn).await?;

        rows.iter()
            .map(|row| Self::row_to_stock(row).map(|stock| (stock.sku.clone(), stock)))
            .collect()
    }

    async fn write_stock(conn: &mut PgConnection, stock: &Stock) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE inventory_stocks
            SET on_hand = $2, reserved = $3, updated_at = $4
            WHERE sku = $1
            "#,
        )
        .bind(&stock.sku)
        .bind(stock.on_hand)
        .bind(stock.reserved)
        .bind(stock.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Applies `target` to a locked held reservation and its stock rows.
    async fn settle_reservation(
        conn: &mut PgConnection,
        current: Reservation,
        target: ReservationStatus,
        actor_id: Option<&str>,
        reason: Option<&str>,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Reservation> {
        if !current.status.can_transition_to(target) {
            return Err(StoreError::InvalidReservationTransition {
                reservation_id: current.id,
                from: current.status,
                to: target,
            });
        }

        let demand = current.quantities_by_sku();
        let skus: Vec<String> = demand.keys().cloned().collect();
        let stocks = Self::lock_stocks(conn, &skus).await?;
        for (sku, quantity) in demand {
            let stock = stocks.get(&sku).ok_or_else(|| StoreError::StockInvariant {
                sku: sku.clone(),
                on_hand: 0,
                reserved: 0,
            })?;
            let settled = stock.settle(target, quantity, at)?;
            Self::write_stock(conn, &settled).await?;
        }

        let mut updated = current;
        updated.apply_transition(target, actor_id, reason, at);
        Self::write_reservation_status(conn, &updated).await?;
        Ok(updated)
    }

    async fn write_reservation_status(conn: &mut PgConnection, reservation: &Reservation) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE inventory_reservations
            SET status = $2, updated_at = $3, committed_at = $4, released_at = $5,
                last_actor_id = $6, release_reason = $7
            WHERE id = $1
            "#,
        )
        .bind(reservation.id.as_str())
        .bind(reservation.status.as_str())
        .bind(reservation.updated_at)
        .bind(reservation.committed_at)
        .bind(reservation.released_at)
        .bind(&reservation.last_actor_id)
        .bind(&reservation.release_reason)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn insert_reservation(conn: &mut PgConnection, reservation: &Reservation) -> Result<()> {
        let lines = serde_json::to_value(&reservation.lines)?;
        sqlx::query(
            r#"
            INSERT INTO inventory_reservations (
                id, order_ref, user_ref, status, lines, reason, idempotency_key,
                created_at, expires_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(reservation.id.as_str())
        .bind(reservation.order_ref.as_str())
        .bind(&reservation.user_ref)
        .bind(reservation.status.as_str())
        .bind(lines)
        .bind(&reservation.reason)
        .bind(&reservation.idempotency_key)
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .bind(reservation.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for PostgresStore {
    async fn create_reservation(&self, reservation: NewReservation) -> Result<CreateOutcome> {
        validate_new_reservation(&reservation)?;
        let at = reservation.created_at;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(reservation.order_ref.as_str())
            .execute(&mut *tx)
            .await?;

        if let Some(key) = &reservation.idempotency_key {
            let sql = format!(
                "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations \
                 WHERE order_ref = $1 AND idempotency_key = $2 \
                 ORDER BY created_at DESC LIMIT 1"
            );
            let row = sqlx::query(&sql)
                .bind(reservation.order_ref.as_str())
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some(row) = row {
                let existing = Self::row_to_reservation(&row)?;
                if existing.line_signature() == line_signature(&reservation.lines) {
                    tx.rollback().await?;
                    return Ok(CreateOutcome::Replayed(existing));
                }
            }
        }

        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations \
             WHERE order_ref = $1 AND status IN ('held', 'committed') FOR UPDATE"
        );
        let active = sqlx::query(&sql)
            .bind(reservation.order_ref.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| Self::row_to_reservation(&row))
            .transpose()?;

        let stale = match active {
            Some(active)
                if active.status == ReservationStatus::Held && active.is_expired_at(at) =>
            {
                Some(active)
            }
            Some(active) => {
                return Err(StoreError::ActiveReservationExists {
                    order_id: reservation.order_ref.clone(),
                    reservation_id: active.id,
                });
            }
            None => None,
        };

        // Lock the union of both reservations' skus in one sorted pass.
        let demand = quantities_by_sku(&reservation.lines);
        let mut skus: BTreeSet<String> = demand.keys().cloned().collect();
        if let Some(stale) = &stale {
            skus.extend(stale.skus());
        }
        let skus: Vec<String> = skus.into_iter().collect();
        let mut stocks = Self::lock_stocks(&mut tx, &skus).await?;

        if let Some(stale) = stale {
            tracing::debug!(
                reservation_id = %stale.id,
                order_id = %stale.order_ref,
                "expiring stale reservation before re-reserve"
            );
            for (sku, quantity) in stale.quantities_by_sku() {
                let stock = stocks.get(&sku).ok_or_else(|| StoreError::StockInvariant {
                    sku: sku.clone(),
                    on_hand: 0,
                    reserved: 0,
                })?;
                let settled = stock.settle(ReservationStatus::Expired, quantity, at)?;
                stocks.insert(sku, settled);
            }
            let mut expired = stale;
            expired.apply_transition(ReservationStatus::Expired, None, Some("superseded"), at);
            Self::write_reservation_status(&mut tx, &expired).await?;
        }

        for (sku, quantity) in &demand {
            let stock = stocks
                .get(sku)
                .ok_or_else(|| StoreError::InsufficientStock {
                    sku: sku.clone(),
                    requested: *quantity,
                    available: 0,
                })?;
            let held = stock.hold(*quantity, at)?;
            stocks.insert(sku.clone(), held);
        }

        for stock in stocks.values() {
            Self::write_stock(&mut tx, stock).await?;
        }

        let created = reservation.into_reservation();
        Self::insert_reservation(&mut tx, &created).await?;

        tx.commit().await?;
        Ok(CreateOutcome::Created(created))
    }

    async fn get_reservation(&self, id: &ReservationId) -> Result<Option<Reservation>> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM inventory_reservations WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_reservation(&row)).transpose()
    }

    async fn transition_reservation(
        &self,
        transition: ReservationTransition,
    ) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations WHERE id = $1 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(transition.id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::ReservationNotFound(transition.id.clone()))?;
        let current = Self::row_to_reservation(&row)?;

        if current.status != transition.expected {
            tx.rollback().await?;
            return Ok(TransitionOutcome::Unchanged(current));
        }

        let updated = Self::settle_reservation(
            &mut tx,
            current,
            transition.target,
            transition.actor_id.as_deref(),
            transition.reason.as_deref(),
            transition.at,
        )
        .await?;

        tx.commit().await?;
        Ok(TransitionOutcome::Applied(updated))
    }

    async fn scan_expired(&self, query: ExpiredQuery) -> Result<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations \
             WHERE status = 'held' AND expires_at <= $1 \
             ORDER BY expires_at ASC, id ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(query.now)
            .bind(query.sql_limit())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_reservation).collect()
    }

    async fn get_stock(&self, sku: &str) -> Result<Option<Stock>> {
        let sql = format!("SELECT {STOCK_COLUMNS} FROM inventory_stocks WHERE sku = $1");
        let row = sqlx::query(&sql)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_stock(&row)).transpose()
    }

    async fn put_stock(&self, level: StockLevel) -> Result<Stock> {
        let mut tx = self.pool.begin().await?;

        let existing = Self::lock_stocks(&mut tx, std::slice::from_ref(&level.sku))
            .await?
            .remove(&level.sku);
        let reserved = existing.as_ref().map_or(0, |s| s.reserved);
        if level.on_hand < reserved || level.on_hand < 0 {
            return Err(StoreError::StockInvariant {
                sku: level.sku,
                on_hand: level.on_hand,
                reserved,
            });
        }

        let sql = format!(
            "INSERT INTO inventory_stocks (sku, product_ref, on_hand, reserved, safety_stock, updated_at) \
             VALUES ($1, $2, $3, 0, $4, $5) \
             ON CONFLICT (sku) DO UPDATE SET \
                 product_ref = COALESCE(EXCLUDED.product_ref, inventory_stocks.product_ref), \
                 on_hand = EXCLUDED.on_hand, \
                 safety_stock = EXCLUDED.safety_stock, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {STOCK_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&level.sku)
            .bind(&level.product_ref)
            .bind(level.on_hand)
            .bind(level.safety_stock)
            .bind(level.at)
            .fetch_one(&mut *tx)
            .await?;
        let stock = Self::row_to_stock(&row)?;

        tx.commit().await?;
        Ok(stock)
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_order(&row)).transpose()
    }

    async fn insert_order(&self, order: Order) -> Result<Order> {
        let metadata = serde_json::to_value(&order.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_ref, status, metadata, promotion_code, paid_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_str())
        .bind(&order.user_ref)
        .bind(order.status.as_str())
        .bind(metadata)
        .bind(order.promotion_code())
        .bind(order.paid_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::DuplicateOrder(order.id.clone());
            }
            StoreError::Database(e)
        })?;

        Ok(order)
    }

    async fn transition_status(&self, transition: OrderTransition) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(transition.order_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::OrderNotFound(transition.order_id.clone()))?;
        let mut order = Self::row_to_order(&row)?;

        if let Some(expected) = transition.expected
            && order.status != expected
        {
            return Err(StoreError::OrderStatusConflict {
                order_id: transition.order_id,
                expected,
                actual: order.status,
            });
        }
        if !order.status.can_transition_to(transition.target) {
            return Err(StoreError::InvalidOrderTransition {
                order_id: transition.order_id,
                from: order.status,
                to: transition.target,
            });
        }

        order.status = transition.target;
        order.merge_metadata(&transition.metadata_patch);
        if transition.target == OrderStatus::Paid {
            order.paid_at = Some(transition.at);
        }
        order.updated_at = transition.at;

        let metadata = serde_json::to_value(&order.metadata)?;
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, metadata = $3, paid_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.status.as_str())
        .bind(metadata)
        .bind(order.paid_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }
}
