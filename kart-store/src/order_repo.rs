use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kart_core::models::{
    LineItem, NewOrder, Order, OrderStatus, PaymentStatus, Shipment, ShippingAddress,
};
use kart_core::repository::{OrderRepository, RepositoryError, RepositoryResult};
use kart_core::AuthContext;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Postgres-backed order store. Every statement runs in a transaction that
/// carries the caller's JWT claims, so row-level security policies see the
/// same identity the API authenticated.
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self, auth: &AuthContext) -> RepositoryResult<Transaction<'_, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("SELECT set_config('request.jwt.claims', $1, true)")
            .bind(auth.claims.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        Ok(tx)
    }
}

fn db_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

const ORDER_COLUMNS: &str = "id, idempotency_key, customer_id, amount, total_amount, currency, \
     status, payment_status, payment_method, shipping_address, gateway_order_id, payment_id, \
     created_at, updated_at";

const LINE_ITEM_COLUMNS: &str =
    "id, order_id, product_id, variant_id, size, name, sku, quantity, unit_price, position";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    idempotency_key: String,
    customer_id: String,
    amount: i64,
    total_amount: Decimal,
    currency: String,
    status: String,
    payment_status: String,
    payment_method: String,
    shipping_address: Json<ShippingAddress>,
    gateway_order_id: Option<String>,
    payment_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, shipments: Vec<Shipment>) -> RepositoryResult<Order> {
        let parse_err = |e: kart_core::CoreError| RepositoryError::Database(e.to_string());
        Ok(Order {
            id: self.id,
            idempotency_key: self.idempotency_key,
            customer_id: self.customer_id,
            amount: self.amount,
            total_amount: self.total_amount,
            currency: self.currency,
            status: self.status.parse().map_err(parse_err)?,
            payment_status: self.payment_status.parse().map_err(parse_err)?,
            payment_method: self.payment_method.parse().map_err(parse_err)?,
            shipping_address: self.shipping_address.0,
            gateway_order_id: self.gateway_order_id,
            payment_id: self.payment_id,
            shipments,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: i64,
    variant_id: Option<i64>,
    size: Option<String>,
    name: String,
    sku: String,
    quantity: i32,
    unit_price: Decimal,
    position: i32,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            size: row.size,
            name: row.name,
            sku: row.sku,
            quantity: row.quantity,
            unit_price: row.unit_price,
            position: row.position,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ShipmentRow {
    id: Uuid,
    order_id: Uuid,
    shipment_id: i64,
    external_order_id: i64,
    awb_code: Option<String>,
    courier_name: Option<String>,
    label_url: Option<String>,
    pickup_scheduled: bool,
    created_at: DateTime<Utc>,
}

impl From<ShipmentRow> for Shipment {
    fn from(row: ShipmentRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            shipment_id: row.shipment_id,
            external_order_id: row.external_order_id,
            awb_code: row.awb_code,
            courier_name: row.courier_name,
            label_url: row.label_url,
            pickup_scheduled: row.pickup_scheduled,
            created_at: row.created_at,
        }
    }
}

async fn load_shipments(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> RepositoryResult<Vec<Shipment>> {
    let rows: Vec<ShipmentRow> = sqlx::query_as(
        "SELECT id, order_id, shipment_id, external_order_id, awb_code, courier_name, label_url, \
         pickup_scheduled, created_at FROM shipments WHERE order_id = $1 \
         ORDER BY created_at, id",
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_error)?;
    Ok(rows.into_iter().map(Shipment::from).collect())
}

fn ensure_found(rows_affected: u64, order_id: Uuid) -> RepositoryResult<()> {
    if rows_affected == 0 {
        return Err(RepositoryError::NotFound(order_id));
    }
    Ok(())
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_by_idempotency_key(
        &self,
        auth: &AuthContext,
        customer_id: &str,
        key: &str,
    ) -> RepositoryResult<Option<Order>> {
        let mut tx = self.begin(auth).await?;
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE customer_id = $1 AND idempotency_key = $2",
            ORDER_COLUMNS
        ))
        .bind(customer_id)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let order = match row {
            Some(row) => {
                let shipments = load_shipments(&mut tx, row.id).await?;
                Some(row.into_order(shipments)?)
            }
            None => None,
        };
        tx.commit().await.map_err(db_error)?;
        Ok(order)
    }

    async fn insert_order(&self, auth: &AuthContext, order: &NewOrder) -> RepositoryResult<Order> {
        let mut tx = self.begin(auth).await?;
        let row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO orders (id, idempotency_key, customer_id, amount, total_amount, currency, \
             status, payment_status, payment_method, shipping_address) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(&order.idempotency_key)
        .bind(&order.customer_id)
        .bind(order.amount)
        .bind(order.total_amount())
        .bind(&order.currency)
        .bind(OrderStatus::Pending.as_str())
        .bind(PaymentStatus::Unpaid.as_str())
        .bind(order.payment_method.as_str())
        .bind(Json(&order.shipping_address))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                RepositoryError::DuplicateKey(order.idempotency_key.clone())
            } else {
                db_error(e)
            }
        })?;
        tx.commit().await.map_err(db_error)?;
        row.into_order(Vec::new())
    }

    async fn insert_line_items(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        items: &[LineItem],
    ) -> RepositoryResult<()> {
        let mut tx = self.begin(auth).await?;
        let statement = format!(
            "INSERT INTO line_items ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            LINE_ITEM_COLUMNS
        );
        for item in items {
            sqlx::query(&statement)
                .bind(item.id)
                .bind(order_id)
                .bind(item.product_id)
                .bind(item.variant_id)
                .bind(&item.size)
                .bind(&item.name)
                .bind(&item.sku)
                .bind(item.quantity)
                .bind(item.unit_price)
                .bind(item.position)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)
    }

    async fn get_order(&self, auth: &AuthContext, id: Uuid) -> RepositoryResult<Option<Order>> {
        let mut tx = self.begin(auth).await?;
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;

        let order = match row {
            Some(row) => {
                let shipments = load_shipments(&mut tx, id).await?;
                Some(row.into_order(shipments)?)
            }
            None => None,
        };
        tx.commit().await.map_err(db_error)?;
        Ok(order)
    }

    async fn list_line_items(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
    ) -> RepositoryResult<Vec<LineItem>> {
        let mut tx = self.begin(auth).await?;
        let rows: Vec<LineItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM line_items WHERE order_id = $1 ORDER BY position, id",
            LINE_ITEM_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(rows.into_iter().map(LineItem::from).collect())
    }

    async fn set_gateway_order_id(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        gateway_order_id: &str,
    ) -> RepositoryResult<()> {
        let mut tx = self.begin(auth).await?;
        let result = sqlx::query(
            "UPDATE orders SET gateway_order_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(order_id)
        .bind(gateway_order_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        ensure_found(result.rows_affected(), order_id)?;
        tx.commit().await.map_err(db_error)
    }

    async fn mark_paid(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        payment_id: &str,
    ) -> RepositoryResult<()> {
        let mut tx = self.begin(auth).await?;
        let result = sqlx::query(
            "UPDATE orders SET payment_status = 'paid', payment_id = $2, updated_at = now() \
             WHERE id = $1",
        )
        .bind(order_id)
        .bind(payment_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        ensure_found(result.rows_affected(), order_id)?;
        tx.commit().await.map_err(db_error)
    }

    async fn claim_shipment(&self, auth: &AuthContext, order_id: Uuid) -> RepositoryResult<bool> {
        let mut tx = self.begin(auth).await?;
        let result = sqlx::query(
            "UPDATE orders SET shipping_claimed_at = now(), updated_at = now() \
             WHERE id = $1 AND shipping_claimed_at IS NULL \
             AND NOT EXISTS (SELECT 1 FROM shipments WHERE order_id = $1)",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        let claimed = result.rows_affected() == 1;

        if !claimed {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;
            if exists.is_none() {
                return Err(RepositoryError::NotFound(order_id));
            }
        }
        tx.commit().await.map_err(db_error)?;
        Ok(claimed)
    }

    async fn release_shipment_claim(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
    ) -> RepositoryResult<()> {
        let mut tx = self.begin(auth).await?;
        let result = sqlx::query(
            "UPDATE orders SET shipping_claimed_at = NULL, updated_at = now() WHERE id = $1",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        ensure_found(result.rows_affected(), order_id)?;
        tx.commit().await.map_err(db_error)
    }

    async fn record_shipment(
        &self,
        auth: &AuthContext,
        shipment: &Shipment,
    ) -> RepositoryResult<()> {
        let mut tx = self.begin(auth).await?;
        sqlx::query(
            "INSERT INTO shipments (id, order_id, shipment_id, external_order_id, awb_code, \
             courier_name, label_url, pickup_scheduled, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(shipment.id)
        .bind(shipment.order_id)
        .bind(shipment.shipment_id)
        .bind(shipment.external_order_id)
        .bind(&shipment.awb_code)
        .bind(&shipment.courier_name)
        .bind(&shipment.label_url)
        .bind(shipment.pickup_scheduled)
        .bind(shipment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db| db.is_foreign_key_violation()) {
                RepositoryError::NotFound(shipment.order_id)
            } else {
                db_error(e)
            }
        })?;
        tx.commit().await.map_err(db_error)
    }

    async fn update_status(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        status: OrderStatus,
    ) -> RepositoryResult<()> {
        let mut tx = self.begin(auth).await?;
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = now() WHERE id = $1")
            .bind(order_id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        ensure_found(result.rows_affected(), order_id)?;
        tx.commit().await.map_err(db_error)
    }
}
