//! Order repository for database operations.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use threadline_core::{LineItem, OrderId, OrderStatus, Price, ProductId, UserId};

use super::{OrderRepository, RepositoryError, bind_quantity, stored_count};
use crate::models::{DeliveryData, NewOrder, Order, OrderLine};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    amount: Decimal,
    delivery_fee: Decimal,
    total_amount: Decimal,
    delivery_data: Json<DeliveryData>,
    payment_method: String,
    payment: bool,
    status: String,
    stock_reserved: bool,
    checkout_session_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    order_id: i32,
    product_id: i32,
    size: String,
    quantity: i32,
}

const ORDER_COLUMNS: &str = "id, user_id, amount, delivery_fee, total_amount, delivery_data, \
                             payment_method, payment, status, stock_reserved, \
                             checkout_session_id, created_at, updated_at";

/// `sqlx` implementation of [`OrderRepository`].
pub struct PgOrders {
    pool: PgPool,
}

impl PgOrders {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(
        &self,
        condition: &str,
        bind: Option<i32>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.order {condition} \
             ORDER BY created_at DESC, id DESC"
        );
        let mut query = sqlx::query_as::<_, OrderRow>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut conn = self.pool.acquire().await?;
        attach_lines(&mut conn, rows).await
    }

    /// Run a conditional `UPDATE ... RETURNING` and load the resulting order.
    async fn update_returning(
        &self,
        sql: &str,
        id: OrderId,
        extra: Option<&str>,
        guard: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut query = sqlx::query_as::<_, OrderRow>(sql).bind(id.as_i32());
        if let Some(value) = extra {
            query = query.bind(value);
        }
        if let Some(value) = guard {
            query = query.bind(value);
        }
        let Some(row) = query.fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let mut conn = self.pool.acquire().await?;
        Ok(attach_lines(&mut conn, vec![row]).await?.pop())
    }
}

#[async_trait]
impl OrderRepository for PgOrders {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r"
            INSERT INTO storefront.order
                (user_id, amount, delivery_fee, total_amount, delivery_data,
                 payment_method, payment, status, stock_reserved)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ORDER_COLUMNS}
            "
        );
        let row: OrderRow = sqlx::query_as(&sql)
            .bind(order.user_id.as_i32())
            .bind(order.amount.amount())
            .bind(order.delivery_fee.amount())
            .bind(order.total_amount.amount())
            .bind(Json(&order.delivery_data))
            .bind(order.payment_method.as_str())
            .bind(order.payment)
            .bind(order.status.as_str())
            .bind(order.stock_reserved)
            .fetch_one(&mut *tx)
            .await?;

        for (position, line) in order.items.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO storefront.order_line (order_id, position, product_id, size, quantity)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(row.id)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(line.product_id.as_i32())
            .bind(&line.size)
            .bind(bind_quantity(line.quantity))
            .execute(&mut *tx)
            .await?;
        }

        let created = attach_lines(&mut tx, vec![row])
            .await?
            .pop()
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .fetch_where("WHERE id = $1", Some(id.as_i32()))
            .await?
            .pop())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_where("WHERE user_id = $1", Some(user_id.as_i32()))
            .await
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_where("", None).await
    }

    async fn set_checkout_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.order
            SET checkout_session_id = $2, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn mark_paid(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            r"
            UPDATE storefront.order
            SET status = 'Placed', payment = TRUE, updated_at = now()
            WHERE id = $1 AND status = 'Unpaid' AND payment = FALSE
            RETURNING {ORDER_COLUMNS}
            "
        );
        self.update_returning(&sql, id, None, None).await
    }

    async fn transition(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            r"
            UPDATE storefront.order
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = $3
            RETURNING {ORDER_COLUMNS}
            "
        );
        self.update_returning(&sql, id, Some(to.as_str()), Some(from.as_str()))
            .await
    }

    async fn take_stock_reservation(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let taken: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE storefront.order
            SET stock_reserved = FALSE, updated_at = now()
            WHERE id = $1 AND stock_reserved
            RETURNING id
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;
        Ok(taken.is_some())
    }

    async fn set_stock_reserved(
        &self,
        id: OrderId,
        reserved: bool,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE storefront.order
            SET stock_reserved = $2, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .bind(reserved)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn attach_lines(
    conn: &mut PgConnection,
    rows: Vec<OrderRow>,
) -> Result<Vec<Order>, RepositoryError> {
    let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
    let line_rows: Vec<OrderLineRow> = sqlx::query_as(
        r"
        SELECT order_id, product_id, size, quantity
        FROM storefront.order_line
        WHERE order_id = ANY($1)
        ORDER BY order_id, position
        ",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut lines: HashMap<i32, Vec<OrderLine>> = HashMap::new();
    for row in line_rows {
        lines
            .entry(row.order_id)
            .or_default()
            .push(OrderLine::from(LineItem {
                product_id: ProductId::new(row.product_id),
                size: row.size,
                quantity: stored_count(row.quantity, "order line quantity")?,
            }));
    }

    rows.into_iter()
        .map(|row| {
            let items = lines.remove(&row.id).unwrap_or_default();
            into_order(row, items)
        })
        .collect()
}

fn stored_price(value: Decimal, column: &str) -> Result<Price, RepositoryError> {
    Price::new(value).map_err(|e| RepositoryError::DataCorruption(format!("invalid {column}: {e}")))
}

fn into_order(row: OrderRow, items: Vec<OrderLine>) -> Result<Order, RepositoryError> {
    let payment_method = row
        .payment_method
        .parse()
        .map_err(|e| RepositoryError::DataCorruption(format!("{e}")))?;
    let status = row
        .status
        .parse()
        .map_err(|e| RepositoryError::DataCorruption(format!("{e}")))?;

    Ok(Order {
        id: OrderId::new(row.id),
        user_id: UserId::new(row.user_id),
        items,
        amount: stored_price(row.amount, "amount")?,
        delivery_fee: stored_price(row.delivery_fee, "delivery fee")?,
        total_amount: stored_price(row.total_amount, "total amount")?,
        delivery_data: row.delivery_data.0,
        payment_method,
        payment: row.payment,
        status,
        stock_reserved: row.stock_reserved,
        checkout_session_id: row.checkout_session_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
