//! Product repository for database operations.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use threadline_core::{Price, ProductId};

use super::{ProductRepository, RepositoryError, bind_quantity, stored_count};
use crate::models::{NewProduct, Product, ProductQuery, SizeStock};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    description: String,
    price: Decimal,
    category: String,
    sub_category: String,
    images: Vec<String>,
    sold: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SizeRow {
    product_id: i32,
    size: String,
    quantity: i32,
}

const PRODUCT_COLUMNS: &str = "id, name, description, price, category, sub_category, images, \
                               sold, created_at, updated_at";

/// `sqlx` implementation of [`ProductRepository`].
pub struct PgProducts {
    pool: PgPool,
}

impl PgProducts {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductRepository for PgProducts {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let mut products = load_products(&mut conn, &[id]).await?;
        Ok(products.pop())
    }

    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.acquire().await?;
        load_products(&mut conn, ids).await
    }

    async fn list(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64), RepositoryError> {
        let mut count: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM storefront.product WHERE TRUE");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT ");
        select.push(PRODUCT_COLUMNS);
        select.push(" FROM storefront.product WHERE TRUE");
        push_filters(&mut select, query);
        // Column and direction come from closed enums, never from the request.
        select.push(format!(
            " ORDER BY {} {}, id {}",
            query.sort_by.column(),
            query.sort_order.keyword(),
            query.sort_order.keyword()
        ));
        select.push(" LIMIT ").push_bind(i64::from(query.limit));
        select
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows: Vec<ProductRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let mut conn = self.pool.acquire().await?;
        let products = attach_sizes(&mut conn, rows).await?;
        let total = u64::try_from(total).unwrap_or_default();
        Ok((products, total))
    }

    async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO storefront.product
                (name, description, price, category, sub_category, images)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(&product.category)
        .bind(&product.sub_category)
        .bind(&product.images)
        .fetch_one(&mut *tx)
        .await?;

        insert_sizes(&mut tx, id, &product.sizes).await?;
        let created = load_products(&mut tx, &[ProductId::new(id)])
            .await?
            .pop()
            .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;
        Ok(created)
    }

    async fn update(
        &self,
        id: ProductId,
        product: &NewProduct,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE storefront.product
            SET name = $2, description = $3, price = $4, category = $5,
                sub_category = $6, images = $7, updated_at = now()
            WHERE id = $1
            RETURNING id
            ",
        )
        .bind(id.as_i32())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(&product.category)
        .bind(&product.sub_category)
        .bind(&product.images)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Ok(None);
        }

        sqlx::query("DELETE FROM storefront.product_size WHERE product_id = $1")
            .bind(id.as_i32())
            .execute(&mut *tx)
            .await?;
        insert_sizes(&mut tx, id.as_i32(), &product.sizes).await?;

        let product = load_products(&mut tx, &[id]).await?.pop();
        tx.commit().await?;
        Ok(product)
    }

    async fn delete(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(product) = load_products(&mut tx, &[id]).await?.pop() else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM storefront.product WHERE id = $1")
            .bind(id.as_i32())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(product))
    }
}

// =============================================================================
// Helpers shared with the inventory ledger
// =============================================================================

/// Load products (with sizes) by id on an existing connection or transaction.
pub(crate) async fn load_products(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<Vec<Product>, RepositoryError> {
    let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = ANY($1)");
    let rows: Vec<ProductRow> = sqlx::query_as(&sql)
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;
    attach_sizes(conn, rows).await
}

async fn attach_sizes(
    conn: &mut PgConnection,
    rows: Vec<ProductRow>,
) -> Result<Vec<Product>, RepositoryError> {
    let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
    let size_rows: Vec<SizeRow> = sqlx::query_as(
        r"
        SELECT product_id, size, quantity
        FROM storefront.product_size
        WHERE product_id = ANY($1)
        ORDER BY product_id, position
        ",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut sizes: HashMap<i32, Vec<SizeStock>> = HashMap::new();
    for row in size_rows {
        sizes.entry(row.product_id).or_default().push(SizeStock {
            size: row.size,
            quantity: stored_count(row.quantity, "stock quantity")?,
        });
    }

    rows.into_iter()
        .map(|row| {
            let product_sizes = sizes.remove(&row.id).unwrap_or_default();
            into_product(row, product_sizes)
        })
        .collect()
}

fn into_product(row: ProductRow, sizes: Vec<SizeStock>) -> Result<Product, RepositoryError> {
    let price = Price::new(row.price)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid price in database: {e}")))?;

    Ok(Product {
        id: ProductId::new(row.id),
        name: row.name,
        description: row.description,
        price,
        category: row.category,
        sub_category: row.sub_category,
        images: row.images,
        sizes,
        sold: stored_count(row.sold, "sold count")?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

async fn insert_sizes(
    conn: &mut PgConnection,
    product_id: i32,
    sizes: &[SizeStock],
) -> Result<(), RepositoryError> {
    for (position, stock) in sizes.iter().enumerate() {
        sqlx::query(
            r"
            INSERT INTO storefront.product_size (product_id, size, quantity, position)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(product_id)
        .bind(&stock.size)
        .bind(bind_quantity(stock.quantity))
        .bind(i32::try_from(position).unwrap_or(i32::MAX))
        .execute(&mut *conn)
        .await
        .map_err(|e| super::conflict_on_unique(e, "size"))?;
    }
    Ok(())
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if !query.categories.is_empty() {
        builder
            .push(" AND category = ANY(")
            .push_bind(query.categories.clone())
            .push(")");
    }
    if !query.sub_categories.is_empty() {
        builder
            .push(" AND sub_category = ANY(")
            .push_bind(query.sub_categories.clone())
            .push(")");
    }
}

/// Escape `LIKE` metacharacters so search terms match literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
