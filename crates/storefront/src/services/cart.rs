//! Cart operations.
//!
//! Stock is checked when lines are added or changed, but nothing is reserved
//! until an order is placed.

use std::slice;

use thiserror::Error;

use threadline_core::{LineItem, ProductId, UserId};

use crate::db::{CartRepository, InventoryLedger, ProductRepository, RepositoryError};
use crate::models::{
    Availability, BulkAddOutcome, CartView, LineInput, SkippedLine, UnavailableItem,
    UnavailableReason,
};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Malformed request (bad quantity, blank size, empty list).
    #[error("{0}")]
    Validation(String),

    /// The product does not exist.
    #[error("Product not found")]
    ProductNotFound(ProductId),

    /// The user's cart has no such line.
    #[error("Item not found in cart")]
    LineNotFound,

    /// Size missing or not enough stock.
    #[error("{}", .0.message)]
    Unavailable(UnavailableItem),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<UnavailableItem> for CartError {
    fn from(item: UnavailableItem) -> Self {
        match item.reason {
            UnavailableReason::NotFound => Self::ProductNotFound(item.product_id),
            UnavailableReason::SizeUnavailable | UnavailableReason::InsufficientStock => {
                Self::Unavailable(item)
            }
        }
    }
}

/// Cart service.
pub struct CartService<'a> {
    carts: &'a dyn CartRepository,
    inventory: &'a dyn InventoryLedger,
    products: &'a dyn ProductRepository,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(
        carts: &'a dyn CartRepository,
        inventory: &'a dyn InventoryLedger,
        products: &'a dyn ProductRepository,
    ) -> Self {
        Self {
            carts,
            inventory,
            products,
        }
    }

    /// Add a line, merging into an existing (product, size) line.
    ///
    /// The requested quantity (not the merged total) is checked against stock.
    ///
    /// # Errors
    ///
    /// `Validation` for a bad quantity or size, `ProductNotFound`, or
    /// `Unavailable` for a missing size or insufficient stock.
    #[tracing::instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn add_line(&self, user_id: UserId, input: &LineInput) -> Result<CartView, CartError> {
        let line = input.validate().map_err(CartError::Validation)?;
        self.ensure_available(&line).await?;
        self.carts.add_line(user_id, &line).await?;
        self.get_cart(user_id).await
    }

    /// Add many lines, skipping any that fail validation or stock checks.
    ///
    /// # Errors
    ///
    /// `Validation` if `inputs` is empty; repository failures.
    #[tracing::instrument(skip(self, inputs), fields(lines = inputs.len()))]
    pub async fn bulk_add_lines(
        &self,
        user_id: UserId,
        inputs: &[LineInput],
    ) -> Result<BulkAddOutcome, CartError> {
        if inputs.is_empty() {
            return Err(CartError::Validation(
                "Products array is required and cannot be empty".to_owned(),
            ));
        }

        let mut skipped = Vec::new();
        let mut candidates = Vec::with_capacity(inputs.len());
        for input in inputs {
            match input.validate() {
                Ok(line) => candidates.push((input, line)),
                Err(message) => skipped.push(SkippedLine {
                    input: input.clone(),
                    message,
                }),
            }
        }

        let lines: Vec<LineItem> = candidates.iter().map(|(_, line)| line.clone()).collect();
        let availability = self.inventory.check_availability(&lines).await?;

        for ((input, line), result) in candidates.into_iter().zip(availability) {
            match result {
                Availability::Available(_) => self.carts.add_line(user_id, &line).await?,
                Availability::Unavailable(item) => skipped.push(SkippedLine {
                    input: input.clone(),
                    message: item.message,
                }),
            }
        }

        if !skipped.is_empty() {
            tracing::info!(skipped = skipped.len(), "bulk add skipped lines");
        }

        Ok(BulkAddOutcome {
            cart: self.get_cart(user_id).await?,
            skipped,
        })
    }

    /// Replace a line's quantity; zero or less removes it.
    ///
    /// # Errors
    ///
    /// `LineNotFound` if the cart has no such line, plus the `add_line` errors
    /// when the new quantity exceeds stock.
    #[tracing::instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn update_line(
        &self,
        user_id: UserId,
        input: &LineInput,
    ) -> Result<CartView, CartError> {
        let size = input.size.trim();
        let exists = self
            .carts
            .lines(user_id)
            .await?
            .iter()
            .any(|line| line.key() == (input.product_id, size));
        if !exists {
            return Err(CartError::LineNotFound);
        }

        if input.quantity <= 0 {
            return self.remove_line(user_id, input.product_id, size).await;
        }

        let line = input.validate().map_err(CartError::Validation)?;
        self.ensure_available(&line).await?;
        if !self.carts.set_quantity(user_id, &line).await? {
            return Err(CartError::LineNotFound);
        }
        self.get_cart(user_id).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// `LineNotFound` if the cart has no such line.
    #[tracing::instrument(skip(self))]
    pub async fn remove_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: &str,
    ) -> Result<CartView, CartError> {
        if !self.carts.remove_line(user_id, product_id, size).await? {
            return Err(CartError::LineNotFound);
        }
        self.get_cart(user_id).await
    }

    /// The user's cart with product summaries, item count and subtotal.
    ///
    /// # Errors
    ///
    /// Repository failures only; a user without a cart gets an empty one.
    pub async fn get_cart(&self, user_id: UserId) -> Result<CartView, CartError> {
        let lines = self.carts.lines(user_id).await?;
        if lines.is_empty() {
            return Ok(CartView::default());
        }

        let mut ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let products = self.products.get_many(&ids).await?;

        let resolved = lines
            .into_iter()
            .map(|line| {
                let summary = products
                    .iter()
                    .find(|p| p.id == line.product_id)
                    .map(crate::models::Product::summary);
                (line, summary)
            })
            .collect();
        Ok(CartView::assemble(resolved))
    }

    /// Empty the cart. Idempotent.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn clear(&self, user_id: UserId) -> Result<(), CartError> {
        self.carts.clear(user_id).await?;
        Ok(())
    }

    async fn ensure_available(&self, line: &LineItem) -> Result<(), CartError> {
        let result = self
            .inventory
            .check_availability(slice::from_ref(line))
            .await?
            .into_iter()
            .next();
        match result {
            Some(Availability::Available(_)) => Ok(()),
            Some(Availability::Unavailable(item)) => Err(item.into()),
            None => Err(CartError::ProductNotFound(line.product_id)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use threadline_core::Price;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewProduct, SizeStock};

    async fn seed(store: &MemoryStore, stock: u32) -> ProductId {
        ProductRepository::create(
            store,
            &NewProduct {
                name: "Cargo Pants".to_owned(),
                description: "Relaxed fit".to_owned(),
                price: Price::from_units(45),
                category: "Men".to_owned(),
                sub_category: "Bottomwear".to_owned(),
                images: vec!["https://cdn.example.com/cargo.jpg".to_owned()],
                sizes: vec![SizeStock {
                    size: "M".to_owned(),
                    quantity: stock,
                }],
            },
        )
        .await
        .unwrap()
        .id
    }

    fn input(product_id: ProductId, size: &str, quantity: i64) -> LineInput {
        LineInput {
            product_id,
            size: size.to_owned(),
            quantity,
        }
    }

    fn service(store: &MemoryStore) -> CartService<'_> {
        CartService::new(store, store, store)
    }

    #[tokio::test]
    async fn test_add_twice_merges_into_one_line() {
        let store = MemoryStore::new();
        let product = seed(&store, 10).await;
        let cart = service(&store);
        let user = UserId::new(1);

        cart.add_line(user, &input(product, "M", 2)).await.unwrap();
        let view = cart.add_line(user, &input(product, "M", 3)).await.unwrap();

        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].quantity, 5);
        assert_eq!(view.item_count, 5);
        assert_eq!(view.subtotal, Price::from_units(225));
    }

    #[tokio::test]
    async fn test_add_checks_product_size_and_stock() {
        let store = MemoryStore::new();
        let product = seed(&store, 1).await;
        let cart = service(&store);
        let user = UserId::new(1);

        assert!(matches!(
            cart.add_line(user, &input(product, "M", 0)).await,
            Err(CartError::Validation(_))
        ));
        assert!(matches!(
            cart.add_line(user, &input(ProductId::new(99), "M", 1)).await,
            Err(CartError::ProductNotFound(_))
        ));
        assert!(matches!(
            cart.add_line(user, &input(product, "XL", 1)).await,
            Err(CartError::Unavailable(UnavailableItem {
                reason: UnavailableReason::SizeUnavailable,
                ..
            }))
        ));
        assert!(matches!(
            cart.add_line(user, &input(product, "M", 2)).await,
            Err(CartError::Unavailable(UnavailableItem {
                reason: UnavailableReason::InsufficientStock,
                ..
            }))
        ));
        assert!(cart.get_cart(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let store = MemoryStore::new();
        let product = seed(&store, 10).await;
        let cart = service(&store);
        let user = UserId::new(1);

        cart.add_line(user, &input(product, "M", 2)).await.unwrap();
        let view = cart.update_line(user, &input(product, "M", 0)).await.unwrap();
        assert!(view.is_empty());

        assert!(matches!(
            cart.update_line(user, &input(product, "M", 1)).await,
            Err(CartError::LineNotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_revalidates_stock() {
        let store = MemoryStore::new();
        let product = seed(&store, 3).await;
        let cart = service(&store);
        let user = UserId::new(1);

        cart.add_line(user, &input(product, "M", 1)).await.unwrap();
        assert!(matches!(
            cart.update_line(user, &input(product, "M", 4)).await,
            Err(CartError::Unavailable(_))
        ));
        let view = cart.update_line(user, &input(product, "M", 3)).await.unwrap();
        assert_eq!(view.items[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_bulk_add_skips_invalid_lines() {
        let store = MemoryStore::new();
        let product = seed(&store, 2).await;
        let cart = service(&store);
        let user = UserId::new(1);

        let outcome = cart
            .bulk_add_lines(
                user,
                &[
                    input(product, "M", 1),
                    input(product, "M", 5),
                    input(ProductId::new(42), "M", 1),
                    input(product, "M", -1),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome.cart.item_count, 1);
        assert_eq!(outcome.skipped.len(), 3);

        assert!(matches!(
            cart.bulk_add_lines(user, &[]).await,
            Err(CartError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_product_shows_as_stale_line() {
        let store = MemoryStore::new();
        let product = seed(&store, 5).await;
        let cart = service(&store);
        let user = UserId::new(1);

        cart.add_line(user, &input(product, "M", 2)).await.unwrap();
        ProductRepository::delete(&store, product).await.unwrap();

        let view = cart.get_cart(user).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert!(view.items[0].product.is_none());
        assert_eq!(view.item_count, 0);
        assert_eq!(view.subtotal, Price::ZERO);
    }

    #[tokio::test]
    async fn test_remove_missing_line() {
        let store = MemoryStore::new();
        let cart = service(&store);
        assert!(matches!(
            cart.remove_line(UserId::new(1), ProductId::new(1), "M").await,
            Err(CartError::LineNotFound)
        ));
    }
}
