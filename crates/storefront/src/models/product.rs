//! Catalog domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use threadline_core::{Price, ProductId};

/// Stock on hand for one size of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStock {
    pub size: String,
    pub quantity: u32,
}

/// A catalog product (domain type).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub category: String,
    pub sub_category: String,
    /// Image URLs in display order.
    pub images: Vec<String>,
    /// Size records in display order. Labels are unique.
    pub sizes: Vec<SizeStock>,
    /// Units sold through confirmed reservations.
    pub sold: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Look up the stock record for a size label.
    #[must_use]
    pub fn size(&self, label: &str) -> Option<&SizeStock> {
        self.sizes.iter().find(|s| s.size == label)
    }

    /// The reduced shape embedded in cart and order reads.
    #[must_use]
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            name: self.name.clone(),
            price: self.price,
            image: self.images.first().cloned(),
            category: self.category.clone(),
            sub_category: self.sub_category.clone(),
        }
    }
}

/// Product fields joined onto cart and order lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    /// First image URL, if any.
    pub image: Option<String>,
    pub category: String,
    pub sub_category: String,
}

/// Input for creating a product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub category: String,
    pub sub_category: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub sizes: Vec<SizeStock>,
}

/// Partial update for a product. Provided `sizes` replace the whole list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub images: Option<Vec<String>>,
    pub sizes: Option<Vec<SizeStock>>,
}

impl ProductPatch {
    /// Apply the patch on top of an existing product's fields.
    #[must_use]
    pub fn apply_to(self, product: &Product) -> NewProduct {
        NewProduct {
            name: self.name.unwrap_or_else(|| product.name.clone()),
            description: self
                .description
                .unwrap_or_else(|| product.description.clone()),
            price: self.price.unwrap_or(product.price),
            category: self.category.unwrap_or_else(|| product.category.clone()),
            sub_category: self
                .sub_category
                .unwrap_or_else(|| product.sub_category.clone()),
            images: self.images.unwrap_or_else(|| product.images.clone()),
            sizes: self.sizes.unwrap_or_else(|| product.sizes.clone()),
        }
    }
}

// =============================================================================
// Listing
// =============================================================================

/// Sort key for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    Price,
    Sold,
    #[default]
    CreatedAt,
}

impl SortKey {
    /// Parse a `sortBy` value; unknown keys fall back to creation time.
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "price" => Self::Price,
            "sold" => Self::Sold,
            _ => Self::CreatedAt,
        }
    }

    /// Column used in `ORDER BY`.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Sold => "sold",
            Self::CreatedAt => "created_at",
        }
    }
}

/// Sort direction for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        if value.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Validated listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    /// Case-insensitive substring matched against name and description.
    pub search: Option<String>,
    /// Any-of match on category; empty means no filter.
    pub categories: Vec<String>,
    /// Any-of match on sub-category; empty means no filter.
    pub sub_categories: Vec<String>,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl ProductQuery {
    pub const DEFAULT_LIMIT: u32 = 40;
    pub const MAX_LIMIT: u32 = 100;

    /// Rows to skip for the requested page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.limit as u64
    }
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            search: None,
            categories: Vec::new(),
            sub_categories: Vec::new(),
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Pagination metadata returned with listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_products: u64,
    pub limit: u32,
}

impl Pagination {
    #[must_use]
    pub fn new(query: &ProductQuery, total_products: u64) -> Self {
        let limit = u64::from(query.limit.max(1));
        let total_pages = u32::try_from(total_products.div_ceil(limit)).unwrap_or(u32::MAX);
        Self {
            current_page: query.page,
            total_pages,
            total_products,
            limit: query.limit,
        }
    }
}

/// One page of products.
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_falls_back_to_created_at() {
        assert_eq!(SortKey::parse_lenient("price"), SortKey::Price);
        assert_eq!(SortKey::parse_lenient("name; DROP TABLE"), SortKey::CreatedAt);
        assert_eq!(SortOrder::parse_lenient("ASC"), SortOrder::Asc);
        assert_eq!(SortOrder::parse_lenient("sideways"), SortOrder::Desc);
    }

    #[test]
    fn test_pagination_rounds_up() {
        let query = ProductQuery {
            page: 2,
            limit: 40,
            ..ProductQuery::default()
        };
        let pagination = Pagination::new(&query, 81);
        assert_eq!(pagination.total_pages, 3);
        assert_eq!(query.offset(), 40);

        let empty = Pagination::new(&ProductQuery::default(), 0);
        assert_eq!(empty.total_pages, 0);
    }
}
