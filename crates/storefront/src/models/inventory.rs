//! Availability evaluation shared by the inventory ledger implementations.
//!
//! Everything here is pure: callers load the product (or find it missing) and
//! [`evaluate`] decides whether a requested line can be satisfied.

use serde::Serialize;

use threadline_core::{LineItem, Price, ProductId};

use super::product::Product;

/// Why a requested line cannot be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnavailableReason {
    NotFound,
    SizeUnavailable,
    InsufficientStock,
}

/// A line that failed the availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableItem {
    pub product_id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub size: String,
    pub reason: UnavailableReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
    pub requested: u32,
    pub message: String,
}

impl UnavailableItem {
    /// The product no longer exists.
    #[must_use]
    pub fn not_found(line: &LineItem) -> Self {
        Self {
            product_id: line.product_id,
            name: None,
            size: line.size.clone(),
            reason: UnavailableReason::NotFound,
            available: None,
            requested: line.quantity,
            message: "Product not found".to_owned(),
        }
    }

    /// The product exists but does not carry the requested size.
    #[must_use]
    pub fn size_unavailable(line: &LineItem, name: &str) -> Self {
        Self {
            product_id: line.product_id,
            name: Some(name.to_owned()),
            size: line.size.clone(),
            reason: UnavailableReason::SizeUnavailable,
            available: None,
            requested: line.quantity,
            message: format!("Size {} not available for {name}", line.size),
        }
    }

    /// Fewer units are on hand than requested.
    #[must_use]
    pub fn insufficient(line: &LineItem, name: &str, available: u32) -> Self {
        Self {
            product_id: line.product_id,
            name: Some(name.to_owned()),
            size: line.size.clone(),
            reason: UnavailableReason::InsufficientStock,
            available: Some(available),
            requested: line.quantity,
            message: format!(
                "Only {available} items available for {name} in size {}, requested {}",
                line.size, line.quantity
            ),
        }
    }
}

/// A line that can be satisfied, with the product data checkout needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableItem {
    pub line: LineItem,
    pub name: String,
    pub unit_price: Price,
}

/// Result of checking one requested line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available(AvailableItem),
    Unavailable(UnavailableItem),
}

/// Result of an all-or-nothing reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// Every line was decremented.
    Reserved,
    /// Nothing was decremented; these lines could not be satisfied.
    Rejected(Vec<UnavailableItem>),
}

/// Check one line against a loaded product (or its absence).
#[must_use]
pub fn evaluate(product: Option<&Product>, line: &LineItem) -> Availability {
    let Some(product) = product else {
        return Availability::Unavailable(UnavailableItem::not_found(line));
    };
    let Some(stock) = product.size(&line.size) else {
        return Availability::Unavailable(UnavailableItem::size_unavailable(line, &product.name));
    };
    if line.quantity > stock.quantity {
        return Availability::Unavailable(UnavailableItem::insufficient(
            line,
            &product.name,
            stock.quantity,
        ));
    }
    Availability::Available(AvailableItem {
        line: line.clone(),
        name: product.name.clone(),
        unit_price: product.price,
    })
}

/// Explain why a conditional decrement for `line` did not apply.
///
/// Used after a reservation fails. If a concurrent writer restored stock in
/// the meantime the line is still reported as insufficient, with the current
/// quantity.
#[must_use]
pub fn rejection(product: Option<&Product>, line: &LineItem) -> UnavailableItem {
    match evaluate(product, line) {
        Availability::Unavailable(item) => item,
        Availability::Available(item) => {
            let on_hand = product
                .and_then(|p| p.size(&line.size))
                .map_or(0, |s| s.quantity);
            UnavailableItem::insufficient(line, &item.name, on_hand)
        }
    }
}

/// Split availability results into satisfiable lines and failures.
///
/// Returns `Err` with every failure when at least one line is unavailable.
///
/// # Errors
///
/// Returns the full list of [`UnavailableItem`]s if any line failed.
pub fn partition(
    results: Vec<Availability>,
) -> Result<Vec<AvailableItem>, Vec<UnavailableItem>> {
    let mut available = Vec::with_capacity(results.len());
    let mut unavailable = Vec::new();
    for result in results {
        match result {
            Availability::Available(item) => available.push(item),
            Availability::Unavailable(item) => unavailable.push(item),
        }
    }
    if unavailable.is_empty() {
        Ok(available)
    } else {
        Err(unavailable)
    }
}
