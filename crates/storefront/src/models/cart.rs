//! Cart read models.

use serde::{Deserialize, Serialize};

use threadline_core::{LineItem, Price, ProductId};

use super::product::ProductSummary;

/// A requested line before validation.
///
/// Quantities arrive as signed integers so that zero or negative values are
/// reported as validation errors (or, for cart updates, mean "remove") rather
/// than JSON rejections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInput {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: i64,
}

impl LineInput {
    /// Validate into a [`LineItem`], describing the problem on failure.
    ///
    /// # Errors
    ///
    /// Returns a client-facing message for a blank size or a quantity outside `1..=u32::MAX`.
    pub fn validate(&self) -> Result<LineItem, String> {
        let quantity = u32::try_from(self.quantity)
            .map_err(|_| format!("invalid quantity {} for product {}", self.quantity, self.product_id))?;
        LineItem::new(self.product_id, self.size.as_str(), quantity)
            .map_err(|e| format!("{e} (product {})", self.product_id))
    }
}

/// A cart line joined with its product, if the product still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    pub product_id: ProductId,
    pub size: String,
    pub quantity: u32,
    /// `None` when the product was deleted after the line was added.
    pub product: Option<ProductSummary>,
}

/// A user's cart as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartLineView>,
    /// Total units across lines whose product still exists.
    pub item_count: u32,
    /// Sum of `price * quantity` across lines whose product still exists.
    pub subtotal: Price,
}

impl CartView {
    /// Assemble a view from stored lines and their resolved products.
    #[must_use]
    pub fn assemble(lines: Vec<(LineItem, Option<ProductSummary>)>) -> Self {
        let mut view = Self::default();
        for (line, product) in lines {
            if let Some(summary) = &product {
                view.item_count = view.item_count.saturating_add(line.quantity);
                view.subtotal = view.subtotal + summary.price.times(line.quantity);
            }
            view.items.push(CartLineView {
                product_id: line.product_id,
                size: line.size,
                quantity: line.quantity,
                product,
            });
        }
        view
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A bulk-add line that was not added, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedLine {
    #[serde(flatten)]
    pub input: LineInput,
    pub message: String,
}

/// Outcome of a bulk add: the resulting cart plus lines that were skipped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAddOutcome {
    pub cart: CartView,
    pub skipped: Vec<SkippedLine>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn summary(id: i32, price: u32) -> ProductSummary {
        ProductSummary {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            price: Price::from_units(price),
            image: None,
            category: "Women".to_owned(),
            sub_category: "Bottomwear".to_owned(),
        }
    }

    #[test]
    fn test_line_input_validation() {
        let input = LineInput {
            product_id: ProductId::new(4),
            size: "S".to_owned(),
            quantity: 0,
        };
        assert!(input.validate().is_err());

        let negative = LineInput {
            quantity: -2,
            ..input.clone()
        };
        assert!(negative.validate().unwrap_err().contains("invalid quantity -2"));

        let ok = LineInput { quantity: 3, ..input };
        assert_eq!(ok.validate().unwrap().quantity, 3);
    }

    #[test]
    fn test_assemble_skips_stale_lines_in_totals() {
        let view = CartView::assemble(vec![
            (
                LineItem::new(ProductId::new(1), "M", 2).unwrap(),
                Some(summary(1, 30)),
            ),
            (LineItem::new(ProductId::new(2), "L", 5).unwrap(), None),
        ]);

        assert_eq!(view.items.len(), 2);
        assert_eq!(view.item_count, 2);
        assert_eq!(view.subtotal, Price::from_units(60));
        assert!(view.items.iter().any(|line| line.product.is_none()));
    }
}
