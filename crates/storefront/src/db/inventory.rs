//! `PostgreSQL` inventory ledger.
//!
//! Reservations run in one transaction per batch. Each line is a conditional
//! `UPDATE ... WHERE quantity >= $n`, so two concurrent batches can never
//! both take the last units; the loser sees zero rows affected and the whole
//! batch rolls back. Lines are applied in `(product, size)` order so that
//! overlapping batches take row locks in the same order and cannot deadlock.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use threadline_core::{LineItem, ProductId};

use super::products::load_products;
use super::{InventoryLedger, RepositoryError, bind_quantity};
use crate::models::inventory::{evaluate, rejection};
use crate::models::{Availability, Product, Reservation};

/// `sqlx` implementation of [`InventoryLedger`].
pub struct PgInventory {
    pool: PgPool,
}

impl PgInventory {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn index_by_id(products: Vec<Product>) -> HashMap<ProductId, Product> {
    products.into_iter().map(|p| (p.id, p)).collect()
}

fn distinct_ids(items: &[LineItem]) -> Vec<ProductId> {
    let mut ids: Vec<ProductId> = items.iter().map(|line| line.product_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Sort lines by `(product, size)` and fold duplicate keys into one line.
fn lock_order(items: &[LineItem]) -> Vec<LineItem> {
    let mut ordered = items.to_vec();
    ordered.sort_by(|a, b| a.key().cmp(&b.key()));
    ordered.dedup_by(|next, kept| {
        if next.key() == kept.key() {
            kept.quantity = kept.quantity.saturating_add(next.quantity);
            true
        } else {
            false
        }
    });
    ordered
}

#[async_trait]
impl InventoryLedger for PgInventory {
    async fn check_availability(
        &self,
        items: &[LineItem],
    ) -> Result<Vec<Availability>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let products = index_by_id(load_products(&mut conn, &distinct_ids(items)).await?);

        Ok(items
            .iter()
            .map(|line| evaluate(products.get(&line.product_id), line))
            .collect())
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn reserve(&self, items: &[LineItem]) -> Result<Reservation, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut failed = Vec::new();

        for line in lock_order(items) {
            let quantity = bind_quantity(line.quantity);
            let decremented = sqlx::query(
                r"
                UPDATE storefront.product_size
                SET quantity = quantity - $3
                WHERE product_id = $1 AND size = $2 AND quantity >= $3
                ",
            )
            .bind(line.product_id.as_i32())
            .bind(&line.size)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

            if decremented.rows_affected() == 0 {
                failed.push(line);
                continue;
            }

            sqlx::query(
                r"
                UPDATE storefront.product
                SET sold = sold + $2, updated_at = now()
                WHERE id = $1
                ",
            )
            .bind(line.product_id.as_i32())
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }

        if failed.is_empty() {
            tx.commit().await?;
            return Ok(Reservation::Reserved);
        }

        // Explain the failures from inside the transaction, where earlier
        // lines of the same batch are still decremented.
        let products = index_by_id(load_products(&mut tx, &distinct_ids(&failed)).await?);
        let unavailable = failed
            .iter()
            .map(|line| rejection(products.get(&line.product_id), line))
            .collect();

        tx.rollback().await?;
        tracing::info!("reservation rejected, batch rolled back");
        Ok(Reservation::Rejected(unavailable))
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn release(&self, items: &[LineItem]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for line in lock_order(items) {
            let quantity = bind_quantity(line.quantity);
            let restored = sqlx::query(
                r"
                UPDATE storefront.product_size
                SET quantity = quantity + $3
                WHERE product_id = $1 AND size = $2
                ",
            )
            .bind(line.product_id.as_i32())
            .bind(&line.size)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

            if restored.rows_affected() == 0 {
                tracing::warn!(
                    product_id = %line.product_id,
                    size = %line.size,
                    quantity = line.quantity,
                    "release skipped: product or size no longer exists"
                );
                continue;
            }

            sqlx::query(
                r"
                UPDATE storefront.product
                SET sold = GREATEST(sold - $2, 0), updated_at = now()
                WHERE id = $1
                ",
            )
            .bind(line.product_id.as_i32())
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
