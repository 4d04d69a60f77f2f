//! Cart repository for database operations.
//!
//! Every mutation is a single statement, so concurrent requests for the same
//! user never lose an update.

use async_trait::async_trait;
use sqlx::PgPool;

use threadline_core::{LineItem, ProductId, UserId};

use super::{CartRepository, RepositoryError, bind_quantity, stored_count};

#[derive(sqlx::FromRow)]
struct CartLineRow {
    product_id: i32,
    size: String,
    quantity: i32,
}

/// `sqlx` implementation of [`CartRepository`].
pub struct PgCarts {
    pool: PgPool,
}

impl PgCarts {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartRepository for PgCarts {
    async fn lines(&self, user_id: UserId) -> Result<Vec<LineItem>, RepositoryError> {
        let rows: Vec<CartLineRow> = sqlx::query_as(
            r"
            SELECT product_id, size, quantity
            FROM storefront.cart_line
            WHERE user_id = $1
            ORDER BY added_at, product_id, size
            ",
        )
        .bind(user_id.as_i32())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(LineItem {
                    product_id: ProductId::new(row.product_id),
                    size: row.size,
                    quantity: stored_count(row.quantity, "cart quantity")?,
                })
            })
            .collect()
    }

    async fn add_line(&self, user_id: UserId, line: &LineItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.cart_line (user_id, product_id, size, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, product_id, size)
            DO UPDATE SET quantity = storefront.cart_line.quantity + EXCLUDED.quantity
            ",
        )
        .bind(user_id.as_i32())
        .bind(line.product_id.as_i32())
        .bind(&line.size)
        .bind(bind_quantity(line.quantity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        line: &LineItem,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.cart_line
            SET quantity = $4
            WHERE user_id = $1 AND product_id = $2 AND size = $3
            ",
        )
        .bind(user_id.as_i32())
        .bind(line.product_id.as_i32())
        .bind(&line.size)
        .bind(bind_quantity(line.quantity))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM storefront.cart_line
            WHERE user_id = $1 AND product_id = $2 AND size = $3
            ",
        )
        .bind(user_id.as_i32())
        .bind(product_id.as_i32())
        .bind(size)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM storefront.cart_line WHERE user_id = $1")
            .bind(user_id.as_i32())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
