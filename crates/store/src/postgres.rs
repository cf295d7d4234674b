use std::time::Duration;

use async_trait::async_trait;
use common::{
    InventoryId, OrderId, OrderItemId, OrderStatus, PaymentStatus, PayoutId, ProductId, UserId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Inventory, Order, OrderItem, Payout, Result, StoreError,
    memory::DEFAULT_LOCK_TIMEOUT,
    store::{Store, UnitOfWork},
};

const INVENTORY_COLUMNS: &str =
    "id, code, owner_id, product_id, quantity, updated_by, created_at, updated_at";
const ORDER_COLUMNS: &str =
    "id, code, buyer_id, status, payment_status, updated_by, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str =
    "id, order_id, inventory_id, seller_id, quantity, unit_price, created_at, updated_at";
const PAYOUT_COLUMNS: &str =
    "id, order_id, seller_id, amount, status, processed_at, created_at, updated_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long a statement inside a unit of work waits for a row lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

/// Maps driver errors onto store errors, recognising the SQLSTATEs the
/// domain reacts to.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.code().as_deref() {
            // unique_violation
            Some("23505") => {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
            // lock_not_available
            Some("55P03") => return StoreError::LockTimeout,
            // numeric_value_out_of_range
            Some("22003") => return StoreError::OutOfRange(db_err.message().to_string()),
            _ => {}
        }
    }
    StoreError::Database(e)
}

fn decode_status<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = common::ParseStatusError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: common::ParseStatusError| StoreError::Decode(e.to_string()))
}

fn row_to_inventory(row: PgRow) -> Result<Inventory> {
    Ok(Inventory {
        id: InventoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
        code: row.try_get("code")?,
        owner_id: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: row.try_get("quantity")?,
        updated_by: UserId::from_uuid(row.try_get::<Uuid, _>("updated_by")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        code: row.try_get("code")?,
        buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
        status: decode_status::<OrderStatus>(&row, "status")?,
        payment_status: decode_status::<PaymentStatus>(&row, "payment_status")?,
        updated_by: UserId::from_uuid(row.try_get::<Uuid, _>("updated_by")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        inventory_id: InventoryId::from_uuid(row.try_get::<Uuid, _>("inventory_id")?),
        seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_payout(row: PgRow) -> Result<Payout> {
    Ok(Payout {
        id: PayoutId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        amount: row.try_get("amount")?,
        status: decode_status::<PaymentStatus>(&row, "status")?,
        processed_at: row.try_get("processed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // SET does not accept bind parameters; the value is an integer we format ourselves.
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        Ok(PostgresUnitOfWork { tx })
    }

    async fn get_inventory(&self, id: InventoryId) -> Result<Option<Inventory>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventories WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_inventory).transpose()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_order).transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        rows.into_iter().map(row_to_order_item).collect()
    }

    async fn get_payout(&self, id: PayoutId) -> Result<Option<Payout>> {
        let sql = format!("SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_payout).transpose()
    }

    async fn list_payouts(&self, order_id: OrderId) -> Result<Vec<Payout>> {
        let sql = format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE order_id = $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        rows.into_iter().map(row_to_payout).collect()
    }
}

/// Unit of work backed by a PostgreSQL transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_inventory(&mut self, id: InventoryId) -> Result<Option<Inventory>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventories WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_inventory).transpose()
    }

    async fn lock_inventory_for(
        &mut self,
        owner_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Inventory>> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventories WHERE owner_id = $1 AND product_id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(owner_id.as_uuid())
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_inventory).transpose()
    }

    async fn insert_inventory(&mut self, lot: &Inventory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventories (id, code, owner_id, product_id, quantity, updated_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(lot.id.as_uuid())
        .bind(&lot.code)
        .bind(lot.owner_id.as_uuid())
        .bind(lot.product_id.as_uuid())
        .bind(lot.quantity)
        .bind(lot.updated_by.as_uuid())
        .bind(lot.created_at)
        .bind(lot.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn decrement_inventory(
        &mut self,
        id: InventoryId,
        amount: i64,
        actor: UserId,
    ) -> Result<Option<Inventory>> {
        let sql = format!(
            r#"
            UPDATE inventories
            SET quantity = quantity - $2, updated_by = $3, updated_at = NOW()
            WHERE id = $1 AND quantity >= $2
            RETURNING {INVENTORY_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(amount)
            .bind(actor.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_inventory).transpose()
    }

    async fn increment_inventory(
        &mut self,
        id: InventoryId,
        amount: i64,
        actor: UserId,
    ) -> Result<Option<Inventory>> {
        let sql = format!(
            r#"
            UPDATE inventories
            SET quantity = quantity + $2, updated_by = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {INVENTORY_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(amount)
            .bind(actor.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_inventory).transpose()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, code, buyer_id, status, payment_status, updated_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.code)
        .bind(order.buyer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.updated_by.as_uuid())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, inventory_id, seller_id, quantity, unit_price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.order_id.as_uuid())
        .bind(item.inventory_id.as_uuid())
        .bind(item.seller_id.as_uuid())
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_order).transpose()
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        rows.into_iter().map(row_to_order_item).collect()
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        actor: UserId,
    ) -> Result<Option<Order>> {
        let sql = format!(
            r#"
            UPDATE orders
            SET status = $3, updated_by = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(actor.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_order).transpose()
    }

    async fn update_payment_status(
        &mut self,
        id: OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        actor: UserId,
    ) -> Result<Option<Order>> {
        let sql = format!(
            r#"
            UPDATE orders
            SET payment_status = $3, updated_by = $4, updated_at = NOW()
            WHERE id = $1 AND payment_status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(actor.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_order).transpose()
    }

    async fn find_payout(
        &mut self,
        order_id: OrderId,
        seller_id: UserId,
    ) -> Result<Option<Payout>> {
        let sql = format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE order_id = $1 AND seller_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .bind(seller_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_payout).transpose()
    }

    async fn lock_payout(&mut self, id: PayoutId) -> Result<Option<Payout>> {
        let sql = format!("SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_payout).transpose()
    }

    async fn insert_payout(&mut self, payout: &Payout) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payouts (id, order_id, seller_id, amount, status, processed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payout.id.as_uuid())
        .bind(payout.order_id.as_uuid())
        .bind(payout.seller_id.as_uuid())
        .bind(payout.amount)
        .bind(payout.status.as_str())
        .bind(payout.processed_at)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn complete_payout(
        &mut self,
        id: PayoutId,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<Option<Payout>> {
        let sql = format!(
            r#"
            UPDATE payouts
            SET status = $3, processed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {PAYOUT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(expected.as_str())
            .bind(next.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_payout).transpose()
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::CommitFailed(e.to_string()))
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(map_db_error)
    }
}
