//! Product catalog: listing, detail and admin maintenance.

use std::collections::HashSet;

use thiserror::Error;
use tracing::instrument;

use threadline_core::ProductId;

use crate::db::{ProductRepository, RepositoryError};
use crate::models::{NewProduct, Pagination, Product, ProductPage, ProductPatch, ProductQuery};

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),

    #[error("Product not found")]
    NotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Catalog service.
pub struct CatalogService<'a> {
    products: &'a dyn ProductRepository,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(products: &'a dyn ProductRepository) -> Self {
        Self { products }
    }

    /// One page of products matching the query.
    ///
    /// # Errors
    ///
    /// Repository failures.
    #[instrument(skip(self))]
    pub async fn list(&self, query: &ProductQuery) -> Result<ProductPage, CatalogError> {
        let (products, total) = self.products.list(query).await?;
        Ok(ProductPage {
            products,
            pagination: Pagination::new(query, total),
        })
    }

    /// # Errors
    ///
    /// `NotFound` if the product does not exist.
    pub async fn get(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.products.get(id).await?.ok_or(CatalogError::NotFound)
    }

    /// # Errors
    ///
    /// `Validation` if a field is blank, the price has sub-cent precision or
    /// is too large, the size list is empty, has duplicate labels or an
    /// unstorable quantity, or an image is not a URL.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewProduct) -> Result<Product, CatalogError> {
        let input = normalize(input)?;
        let product = self.products.create(&input).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `Validation` as for [`Self::create`].
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: ProductId, patch: ProductPatch) -> Result<Product, CatalogError> {
        let current = self.get(id).await?;
        let input = normalize(patch.apply_to(&current))?;
        self.products
            .update(id, &input)
            .await?
            .ok_or(CatalogError::NotFound)
    }

    /// Delete a product. Cart lines that reference it become stale.
    ///
    /// # Errors
    ///
    /// `NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ProductId) -> Result<Product, CatalogError> {
        let product = self
            .products
            .delete(id)
            .await?
            .ok_or(CatalogError::NotFound)?;
        tracing::info!(product_id = %id, "product deleted");
        Ok(product)
    }
}

/// Trim text fields and check the product is sellable.
fn normalize(mut input: NewProduct) -> Result<NewProduct, CatalogError> {
    for (field, value) in [
        ("name", &mut input.name),
        ("description", &mut input.description),
        ("category", &mut input.category),
        ("subCategory", &mut input.sub_category),
    ] {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::Validation(format!("{field} is required")));
        }
        *value = trimmed.to_owned();
    }

    if !input.price.is_storable() {
        return Err(CatalogError::Validation(
            "price must have at most two decimal places and be below 10000000000".to_owned(),
        ));
    }

    if input.sizes.is_empty() {
        return Err(CatalogError::Validation(
            "At least one size is required".to_owned(),
        ));
    }
    let mut seen = HashSet::new();
    for stock in &mut input.sizes {
        stock.size = stock.size.trim().to_owned();
        if stock.size.is_empty() {
            return Err(CatalogError::Validation("Size label cannot be empty".to_owned()));
        }
        if i32::try_from(stock.quantity).is_err() {
            return Err(CatalogError::Validation(format!(
                "Quantity for size {} cannot exceed {}",
                stock.size,
                i32::MAX
            )));
        }
        if !seen.insert(stock.size.clone()) {
            return Err(CatalogError::Validation(format!(
                "Duplicate size: {}",
                stock.size
            )));
        }
    }

    for image in &input.images {
        url::Url::parse(image)
            .map_err(|_| CatalogError::Validation(format!("Invalid image URL: {image}")))?;
    }

    Ok(input)
}
