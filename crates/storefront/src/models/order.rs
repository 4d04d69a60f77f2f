//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use threadline_core::{LineItem, OrderId, OrderStatus, PaymentMethod, Price, UserId};

use super::cart::LineInput;
use super::product::ProductSummary;

/// Shipping contact captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryData {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    pub city: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl DeliveryData {
    /// Names of required fields that are blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("fullName", &self.full_name),
            ("phone", &self.phone),
            ("email", &self.email),
            ("city", &self.city),
            ("state", &self.state),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Snapshot of the requested lines, in request order.
    #[serde(rename = "products")]
    pub items: Vec<OrderLine>,
    pub amount: Price,
    pub delivery_fee: Price,
    pub total_amount: Price,
    pub delivery_data: DeliveryData,
    pub payment_method: PaymentMethod,
    pub payment: bool,
    pub status: OrderStatus,
    /// Whether inventory is currently decremented for this order.
    pub stock_reserved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The bare line items, for inventory operations.
    #[must_use]
    pub fn line_items(&self) -> Vec<LineItem> {
        self.items.iter().map(|line| line.item.clone()).collect()
    }
}

/// One order line. `product` is filled in on reads that join the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(flatten)]
    pub item: LineItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSummary>,
}

impl From<LineItem> for OrderLine {
    fn from(item: LineItem) -> Self {
        Self {
            item,
            product: None,
        }
    }
}

/// Fields needed to insert an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub amount: Price,
    pub delivery_fee: Price,
    pub total_amount: Price,
    pub delivery_data: DeliveryData,
    pub payment_method: PaymentMethod,
    pub payment: bool,
    pub status: OrderStatus,
    pub stock_reserved: bool,
}

/// Checkout request body shared by both payment paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    #[serde(default)]
    pub products: Vec<LineInput>,
    pub amount: Price,
    pub delivery_fee: Price,
    pub total_amount: Price,
    pub delivery_data: DeliveryData,
    pub payment_method: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_reports_blank_required_values() {
        let data = DeliveryData {
            full_name: "Ana Putri".to_owned(),
            phone: " ".to_owned(),
            email: "ana@example.com".to_owned(),
            street: None,
            city: "Bandung".to_owned(),
            state: String::new(),
            zip_code: None,
            country: None,
        };
        assert_eq!(data.missing_fields(), vec!["phone", "state"]);
    }
}
