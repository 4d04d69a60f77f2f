//! Product/size/quantity triples shared by carts, orders and the inventory ledger.

use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Errors that can occur when building a [`LineItem`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LineItemError {
    /// The size label is empty after trimming.
    #[error("size cannot be empty")]
    EmptySize,
    /// Quantity must be at least one.
    #[error("quantity must be at least 1")]
    ZeroQuantity,
}

/// A requested quantity of one size of one product.
///
/// Sizes are free-form labels (`"M"`, `"42"`, `"One Size"`) matched exactly
/// against the product's size list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: u32,
}

impl LineItem {
    /// Build a validated line item.
    ///
    /// # Errors
    ///
    /// Returns [`LineItemError`] for an empty size or zero quantity.
    pub fn new(
        product_id: ProductId,
        size: impl Into<String>,
        quantity: u32,
    ) -> Result<Self, LineItemError> {
        let size = size.into().trim().to_owned();
        if size.is_empty() {
            return Err(LineItemError::EmptySize);
        }
        if quantity == 0 {
            return Err(LineItemError::ZeroQuantity);
        }
        Ok(Self {
            product_id,
            size,
            quantity,
        })
    }

    /// The `(product, size)` key this line is tracked under.
    #[must_use]
    pub fn key(&self) -> (ProductId, &str) {
        (self.product_id, self.size.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_size() {
        let line = LineItem::new(ProductId::new(1), " M ", 2).unwrap();
        assert_eq!(line.key(), (ProductId::new(1), "M"));
    }

    #[test]
    fn test_new_rejects_empty_size_and_zero_quantity() {
        assert_eq!(
            LineItem::new(ProductId::new(1), "  ", 1),
            Err(LineItemError::EmptySize)
        );
        assert_eq!(
            LineItem::new(ProductId::new(1), "L", 0),
            Err(LineItemError::ZeroQuantity)
        );
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let json = r#"{"productId":3,"size":"XL","quantity":4}"#;
        let line: LineItem = serde_json::from_str(json).unwrap();
        assert_eq!(line.product_id, ProductId::new(3));
        assert_eq!(line.quantity, 4);
    }
}
